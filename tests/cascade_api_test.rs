// ==========================================
// 级联变更 API 集成测试
// ==========================================
// 职责: 分析 → 执行一致性、不可行变更拒绝、邻近分配重校验
// ==========================================


#[cfg(test)]
mod cascade_api_test {
    use chrono::Weekday;
    use driver_dispatch::api::ApiError;
    use driver_dispatch::domain::{
        CascadeAction, CascadeRequest, Driver, DriverStatus, SoloType, ValidationStatus,
    };

    use crate::test_helpers::*;

    fn request(origin: &str, action: CascadeAction) -> CascadeRequest {
        CascadeRequest {
            tenant_id: TENANT.to_string(),
            origin_assignment_id: origin.to_string(),
            action,
        }
    }

    #[tokio::test]
    async fn test_reassign_executes_what_analysis_reported() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[]), build_driver("D2", &[])]);
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);
        let created = state.assignment_api.create_assignment("D1", "B1").await.unwrap();
        let id = created.assignment.assignment_id().to_string();

        let req = request(
            &id,
            CascadeAction::Reassign {
                target_driver_id: "D2".to_string(),
            },
        );
        let analysis = state.cascade_api.analyze(&req).await.unwrap();
        assert!(!analysis.is_blocked());
        assert_eq!(analysis.previous_driver_id, "D1");
        assert_eq!(analysis.new_driver_id.as_deref(), Some("D2"));

        let result = state.cascade_api.execute(&req).await.unwrap();
        let mut updated = result.updated_assignment_ids.clone();
        updated.sort();
        assert_eq!(updated, analysis.affected_ids());

        let stored = state.assignment_api.validate_assignment("D2", "B1", Some(id.as_str())).await.unwrap();
        assert!(stored.can_assign);
        let moved = state.assignment_api.revalidate_assignment(&id, 2).await.unwrap();
        assert_eq!(moved.assignment.driver_id(), "D2");
    }

    #[tokio::test]
    async fn test_blocked_reassign_changes_nothing() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[]), build_driver("D3", &[])]);
        // 2025-03-03 是星期一
        state
            .driver_repo
            .upsert_rule(TENANT, &blocked_days_rule("R1", "D3", &[Weekday::Mon]))
            .unwrap();
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);
        let created = state.assignment_api.create_assignment("D1", "B1").await.unwrap();
        let id = created.assignment.assignment_id().to_string();

        let req = request(
            &id,
            CascadeAction::Reassign {
                target_driver_id: "D3".to_string(),
            },
        );
        match state.cascade_api.execute(&req).await {
            Err(ApiError::InfeasibleCascade { analysis }) => {
                assert!(analysis.is_blocked());
                assert!(analysis
                    .affected
                    .iter()
                    .any(|a| a.after_status == Some(ValidationStatus::Violation)));
            }
            other => panic!("expected InfeasibleCascade, got {:?}", other.map(|r| r.updated_assignment_ids)),
        }

        // revision 与司机均未变化
        let unchanged = state.assignment_api.revalidate_assignment(&id, 1).await.unwrap();
        assert_eq!(unchanged.assignment.driver_id(), "D1");
        assert_eq!(unchanged.assignment.assignment.revision, 2);
    }

    #[tokio::test]
    async fn test_unassign_relieves_neighbour_warning() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[SoloType::Solo1])]);
        seed_subjects(
            &state,
            &[
                build_subject("A", "2025-03-03 00:00", 12.0, SoloType::Solo1),
                build_subject("B", "2025-03-03 22:00", 1.0, SoloType::Solo1),
            ],
        );
        let a = state.assignment_api.create_assignment("D1", "A").await.unwrap();
        let b = state.assignment_api.create_assignment("D1", "B").await.unwrap();
        // 12h + 1h = 13h >= 12.6h
        assert_eq!(b.assignment.assignment.validation_status, ValidationStatus::Warning);

        let a_id = a.assignment.assignment_id().to_string();
        let b_id = b.assignment.assignment_id().to_string();
        let req = request(&a_id, CascadeAction::Unassign);

        let analysis = state.cascade_api.analyze(&req).await.unwrap();
        let neighbour = analysis
            .affected
            .iter()
            .find(|x| x.assignment_id == b_id)
            .expect("邻近分配应出现在影响列表中");
        assert!(!neighbour.is_direct);
        assert_eq!(neighbour.before_status, ValidationStatus::Warning);
        assert_eq!(neighbour.after_status, Some(ValidationStatus::Valid));

        let result = state.cascade_api.execute(&req).await.unwrap();
        let mut updated = result.updated_assignment_ids.clone();
        updated.sort();
        assert_eq!(updated, analysis.affected_ids());

        // A 已取消: 旧版本号不可再操作
        assert!(matches!(
            state.assignment_api.delete_assignment(&a_id, 1),
            Err(ApiError::OptimisticLockFailure(_))
        ));

        // B 已重校验为 valid, revision = 2
        let refreshed = state.assignment_api.revalidate_assignment(&b_id, 2).await.unwrap();
        assert_eq!(refreshed.outcome.status(), ValidationStatus::Valid);
        assert_eq!(refreshed.assignment.assignment.revision, 3);
    }

    #[tokio::test]
    async fn test_cross_tenant_origin_is_not_found() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[])]);
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);
        let created = state.assignment_api.create_assignment("D1", "B1").await.unwrap();

        let req = CascadeRequest {
            tenant_id: "OTHER".to_string(),
            origin_assignment_id: created.assignment.assignment_id().to_string(),
            action: CascadeAction::Unassign,
        };
        assert!(matches!(
            state.cascade_api.analyze(&req).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reassign_target_must_be_same_tenant_and_qualified() {
        let (_tmp, state) = create_test_state();
        seed_drivers(
            &state,
            &[
                build_driver("D1", &[]),
                Driver {
                    tenant_id: "T2".to_string(),
                    ..build_driver("X9", &[])
                },
                Driver {
                    status: DriverStatus::Inactive,
                    ..build_driver("OFF", &[])
                },
                build_driver("SOLO2", &[SoloType::Solo2]),
            ],
        );
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);
        let created = state.assignment_api.create_assignment("D1", "B1").await.unwrap();
        let id = created.assignment.assignment_id().to_string();
        let reassign_to = |target: &str| {
            request(
                &id,
                CascadeAction::Reassign {
                    target_driver_id: target.to_string(),
                },
            )
        };

        assert!(matches!(
            state.cascade_api.execute(&reassign_to("X9")).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            state.cascade_api.analyze(&reassign_to("OFF")).await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            state.cascade_api.execute(&reassign_to("SOLO2")).await,
            Err(ApiError::InvalidInput(_))
        ));

        let unchanged = state.assignment_api.revalidate_assignment(&id, 1).await.unwrap();
        assert_eq!(unchanged.assignment.driver_id(), "D1");
    }
}

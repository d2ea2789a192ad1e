// ==========================================
// 分配 API 集成测试
// ==========================================
// 职责: 新建/改派/取消/重校验、换班候选、周负荷、并发占用
// ==========================================


#[cfg(test)]
mod assignment_api_test {
    use chrono::Weekday;
    use driver_dispatch::api::ApiError;
    use driver_dispatch::db::open_sqlite_connection;
    use driver_dispatch::domain::{
        Assignment, Driver, DriverStatus, SoloType, ValidationStatus, ValidationSummary,
        WorkloadLevel,
    };
    use driver_dispatch::repository::{AssignmentRepository, RepositoryError};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use crate::test_helpers::*;

    // ==========================================
    // 新建
    // ==========================================

    #[tokio::test]
    async fn test_create_then_second_create_conflicts() {
        let (_tmp, state) = create_test_state();
        seed_drivers(
            &state,
            &[build_driver("D1", &[SoloType::Solo1]), build_driver("D2", &[SoloType::Solo1])],
        );
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);

        let created = state.assignment_api.create_assignment("D1", "B1").await.unwrap();
        assert_eq!(created.outcome.status(), ValidationStatus::Valid);
        assert_eq!(created.assignment.assignment.revision, 1);
        assert!(created.assignment.is_active());

        match state.assignment_api.create_assignment("D2", "B1").await {
            Err(ApiError::SubjectConflict { assignment_id, .. }) => {
                assert_eq!(assignment_id, created.assignment.assignment_id())
            }
            other => panic!("expected SubjectConflict, got {:?}", other.map(|r| r.outcome)),
        }
    }

    #[tokio::test]
    async fn test_hos_violation_is_rejected_without_write() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[SoloType::Solo1])]);
        seed_subjects(
            &state,
            &[
                build_subject("LONG", "2025-03-03 00:00", 12.0, SoloType::Solo1),
                build_subject("SHORT", "2025-03-03 22:00", 3.0, SoloType::Solo1),
            ],
        );
        state.assignment_api.create_assignment("D1", "LONG").await.unwrap();

        // 12h + 3h = 15h > 14h
        match state.assignment_api.create_assignment("D1", "SHORT").await {
            Err(ApiError::AssignmentRejected { outcome }) => {
                assert!(!outcome.can_assign);
                assert_eq!(outcome.status(), ValidationStatus::Violation);
                assert!((outcome.validation_result.metrics.hours_used - 15.0).abs() < 1e-9);
            }
            other => panic!("expected AssignmentRejected, got {:?}", other.map(|r| r.outcome)),
        }

        let repo_view = state
            .assignment_api
            .validate_assignment("D1", "SHORT", None)
            .await
            .unwrap();
        assert!(!repo_view.has_conflict());
        assert_eq!(repo_view.status(), ValidationStatus::Violation);
    }

    #[tokio::test]
    async fn test_solo2_warning_is_stored_with_summary() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[SoloType::Solo2])]);
        seed_subjects(
            &state,
            &[
                build_subject("S-30", "2025-03-03 00:00", 30.0, SoloType::Solo2),
                build_subject("S-5", "2025-03-04 16:00", 5.0, SoloType::Solo2),
            ],
        );
        state.assignment_api.create_assignment("D1", "S-30").await.unwrap();

        // 30h + 5h = 35h >= 34.2h 且 < 38h
        let created = state.assignment_api.create_assignment("D1", "S-5").await.unwrap();
        assert!(created.outcome.can_assign);
        assert_eq!(created.assignment.assignment.validation_status, ValidationStatus::Warning);
        assert!(created
            .assignment
            .assignment
            .validation_summary
            .messages
            .iter()
            .any(|m| m.contains("HOS_LIMIT_APPROACHING")));
    }

    #[tokio::test]
    async fn test_blocked_day_rule_rejects_friday() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[])]);
        state
            .driver_repo
            .upsert_rule(TENANT, &blocked_days_rule("R1", "D1", &[Weekday::Fri]))
            .unwrap();
        // 2025-03-07 是星期五
        seed_subjects(&state, &[build_subject("FRI", "2025-03-07 06:00", 8.0, SoloType::Solo1)]);

        match state.assignment_api.create_assignment("D1", "FRI").await {
            Err(ApiError::AssignmentRejected { outcome }) => {
                assert!(outcome
                    .protected_rule_violations
                    .iter()
                    .any(|m| m.contains("friday")));
            }
            other => panic!("expected AssignmentRejected, got {:?}", other.map(|r| r.outcome)),
        }
    }

    #[tokio::test]
    async fn test_unknown_references_are_not_found() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[])]);

        assert!(matches!(
            state.assignment_api.create_assignment("D1", "NOPE").await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            state.assignment_api.create_assignment("GHOST", "NOPE").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_other_tenant_driver_is_not_found() {
        let (_tmp, state) = create_test_state();
        seed_drivers(
            &state,
            &[
                build_driver("D1", &[]),
                Driver {
                    tenant_id: "T2".to_string(),
                    ..build_driver("X9", &[])
                },
            ],
        );
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);

        assert!(matches!(
            state.assignment_api.create_assignment("X9", "B1").await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            state.assignment_api.validate_assignment("X9", "B1", None).await,
            Err(ApiError::NotFound(_))
        ));

        let created = state.assignment_api.create_assignment("D1", "B1").await.unwrap();
        let id = created.assignment.assignment_id().to_string();
        assert!(matches!(
            state.assignment_api.update_assignment(&id, 1, "X9").await,
            Err(ApiError::NotFound(_))
        ));
        // 未写入: revision 仍为 1
        let unchanged = state.assignment_api.revalidate_assignment(&id, 1).await.unwrap();
        assert_eq!(unchanged.assignment.driver_id(), "D1");
    }

    #[tokio::test]
    async fn test_inactive_or_wrong_type_driver_is_refused() {
        let (_tmp, state) = create_test_state();
        seed_drivers(
            &state,
            &[
                build_driver("D1", &[]),
                Driver {
                    status: DriverStatus::Inactive,
                    ..build_driver("OFF", &[])
                },
                build_driver("SOLO1", &[SoloType::Solo1]),
            ],
        );
        seed_subjects(&state, &[build_subject("S2", "2025-03-03 08:00", 20.0, SoloType::Solo2)]);

        assert!(matches!(
            state.assignment_api.create_assignment("OFF", "S2").await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            state.assignment_api.create_assignment("SOLO1", "S2").await,
            Err(ApiError::InvalidInput(_))
        ));

        let created = state.assignment_api.create_assignment("D1", "S2").await.unwrap();
        let id = created.assignment.assignment_id().to_string();
        assert!(matches!(
            state.assignment_api.update_assignment(&id, 1, "OFF").await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            state.assignment_api.update_assignment(&id, 1, "SOLO1").await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    // ==========================================
    // 改派 / 取消 / 重校验
    // ==========================================

    #[tokio::test]
    async fn test_update_delete_and_revalidate_lifecycle() {
        let (_tmp, state) = create_test_state();
        seed_drivers(
            &state,
            &[build_driver("D1", &[SoloType::Solo1]), build_driver("D2", &[SoloType::Solo1])],
        );
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);

        let created = state.assignment_api.create_assignment("D1", "B1").await.unwrap();
        let id = created.assignment.assignment_id().to_string();

        // 改派: 排除自身后重校验,不会与自己冲突
        let moved = state.assignment_api.update_assignment(&id, 1, "D2").await.unwrap();
        assert_eq!(moved.assignment.driver_id(), "D2");
        assert_eq!(moved.assignment.assignment.revision, 2);

        // 旧版本号 → 乐观锁冲突
        assert!(matches!(
            state.assignment_api.update_assignment(&id, 1, "D1").await,
            Err(ApiError::OptimisticLockFailure(_))
        ));

        let refreshed = state.assignment_api.revalidate_assignment(&id, 2).await.unwrap();
        assert_eq!(refreshed.assignment.assignment.revision, 3);
        assert_eq!(refreshed.outcome.status(), ValidationStatus::Valid);

        // 取消后班次被释放
        let removed = state.assignment_api.delete_assignment(&id, 3).unwrap();
        assert!(!removed.is_active);
        let again = state.assignment_api.create_assignment("D1", "B1").await.unwrap();
        assert_ne!(again.assignment.assignment_id(), id);
    }

    // ==========================================
    // 并发: 同一班次只能有一条有效分配
    // ==========================================

    #[test]
    fn test_concurrent_creates_for_same_subject() {
        let (_tmp, state) = create_test_state();
        let drivers: Vec<String> = (0..6).map(|i| format!("D{}", i)).collect();
        for id in &drivers {
            seed_drivers(&state, &[build_driver(id, &[])]);
        }
        seed_subjects(&state, &[build_subject("B1", "2025-03-03 08:00", 10.0, SoloType::Solo1)]);

        let barrier = Arc::new(Barrier::new(drivers.len()));
        let mut handles = vec![];
        for driver_id in drivers.clone() {
            let db_path = state.db_path.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || -> Result<(), RepositoryError> {
                // 每个线程独立连接,验证数据库层面的原子性
                let conn = open_sqlite_connection(&db_path).expect("open db");
                let repo = AssignmentRepository::new(Arc::new(Mutex::new(conn)));
                let assignment = Assignment::new_active(
                    TENANT,
                    &driver_id,
                    "B1",
                    ts("2025-03-01 09:00"),
                    ValidationStatus::Valid,
                    ValidationSummary::default(),
                );
                barrier.wait();
                repo.insert_active(&assignment)
            }));
        }

        let mut success = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(()) => success += 1,
                Err(RepositoryError::SubjectAlreadyAssigned { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(success, 1, "只能有一个线程写入成功");
        assert_eq!(conflicts, drivers.len() - 1);
    }

    // ==========================================
    // 换班候选 / 周负荷
    // ==========================================

    #[tokio::test]
    async fn test_swap_candidates_and_workloads() {
        let (_tmp, state) = create_test_state();
        seed_drivers(
            &state,
            &[
                build_driver("CUR", &[]),
                build_driver("BUSY", &[]),
                build_driver("FREE", &[]),
                build_driver("BLOCKED", &[]),
                build_driver("SOLO2", &[SoloType::Solo2]),
            ],
        );
        state
            .driver_repo
            .upsert_rule(TENANT, &blocked_days_rule("R1", "BLOCKED", &[Weekday::Wed]))
            .unwrap();

        // 周起始 2025-03-02(周日);目标班次在 03-05(周三)
        seed_subjects(
            &state,
            &[
                build_subject("TARGET", "2025-03-05 08:00", 10.0, SoloType::Solo1),
                build_subject("B-MON", "2025-03-03 08:00", 8.0, SoloType::Solo1),
                build_subject("B-TUE", "2025-03-04 10:00", 8.0, SoloType::Solo1),
            ],
        );
        state.assignment_api.create_assignment("CUR", "TARGET").await.unwrap();
        state.assignment_api.create_assignment("BUSY", "B-MON").await.unwrap();

        let candidates = state.assignment_api.find_swap_candidates("TARGET").await.unwrap();
        let ids: Vec<&str> = candidates.iter().map(|c| c.driver.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["FREE", "BUSY"]);
        assert!(candidates
            .iter()
            .all(|c| c.compliance_status != ValidationStatus::Violation));

        state.assignment_api.create_assignment("BUSY", "B-TUE").await.unwrap();
        let workloads = state
            .assignment_api
            .get_all_driver_workloads(TENANT, date("2025-03-02"))
            .await
            .unwrap();
        assert_eq!(workloads.len(), 5);
        let busy = workloads.iter().find(|w| w.driver_id == "BUSY").unwrap();
        assert_eq!(busy.days_worked, 2);
        assert_eq!(busy.total_hours, 16.0);
        assert_eq!(busy.workload_level, WorkloadLevel::Underutilized);
        assert_eq!(workloads.last().unwrap().driver_id, "BUSY");
    }
}

// ==========================================
// 仓储层集成测试
// ==========================================
// 职责: 原始记录规范化入库、司机/保护规则读写、配置读写
// ==========================================


#[cfg(test)]
mod repository_test {
    use chrono::{NaiveTime, Weekday};
    use driver_dispatch::api::ApiError;
    use driver_dispatch::config::config_keys;
    use driver_dispatch::domain::{RawSubjectRecord, SoloType};
    use driver_dispatch::repository::RepositoryError;

    use crate::test_helpers::*;

    fn raw(id: &str, start: &str, end: Option<&str>, solo_type: &str) -> RawSubjectRecord {
        RawSubjectRecord {
            subject_id: id.to_string(),
            tenant_id: TENANT.to_string(),
            start_timestamp: start.to_string(),
            end_timestamp: end.map(str::to_string),
            solo_type: solo_type.to_string(),
            resource_id: Some("TR-7".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_raw_subjects_are_normalized_on_write() {
        let (_tmp, state) = create_test_state();

        let stored = state
            .subject_repo
            .upsert_raw(&raw("R1", "2025-03-04T06:30", Some("2025-03-04 16:30:00"), "SOLO 1"))
            .unwrap();
        assert_eq!(stored.solo_type, SoloType::Solo1);
        assert_eq!(stored.duration_hours, 10.0);

        state
            .subject_repo
            .upsert_raw(&RawSubjectRecord {
                duration_hours: Some(20.0),
                ..raw("R2", "2025-03-05 18:00:00", None, "solo_2")
            })
            .unwrap();

        let week = state
            .subject_repo
            .find_by_tenant_and_date_range(TENANT, date("2025-03-02"), date("2025-03-08"))
            .unwrap();
        let ids: Vec<&str> = week.iter().map(|s| s.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2"]);
        assert_eq!(week[1].end_at, ts("2025-03-06 14:00"));
        assert_eq!(week[1].solo_type, SoloType::Solo2);
    }

    #[test]
    fn test_invalid_raw_subject_is_rejected() {
        let (_tmp, state) = create_test_state();

        let bad_type = state
            .subject_repo
            .upsert_raw(&raw("X1", "2025-03-04 06:00", Some("2025-03-04 08:00"), "solo3"));
        assert!(matches!(bad_type, Err(RepositoryError::FieldValueError { .. })));

        let reversed = state
            .subject_repo
            .upsert_raw(&raw("X2", "2025-03-04 06:00", Some("2025-03-04 05:00"), "solo1"));
        assert!(matches!(reversed, Err(RepositoryError::FieldValueError { .. })));

        assert!(state.subject_repo.find_by_id("X1").unwrap().is_none());
        assert!(state.subject_repo.find_by_id("X2").unwrap().is_none());
    }

    #[test]
    fn test_driver_and_rules_round_trip() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[SoloType::Solo1, SoloType::Team])]);
        state
            .driver_repo
            .upsert_rule(TENANT, &blocked_days_rule("R1", "D1", &[Weekday::Sat, Weekday::Sun]))
            .unwrap();

        let driver = state.driver_repo.find_by_id("D1").unwrap().unwrap();
        assert_eq!(driver.solo_types, vec![SoloType::Solo1, SoloType::Team]);
        assert!(driver.is_eligible_for(SoloType::Team));
        assert!(!driver.is_eligible_for(SoloType::Solo2));

        let rules = state.driver_repo.find_rules_by_driver("D1").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].blocked_days, vec![Weekday::Sat, Weekday::Sun]);
        assert!(state.driver_repo.find_rules_by_driver("D2").unwrap().is_empty());
    }

    #[test]
    fn test_rule_for_unknown_driver_violates_foreign_key() {
        let (_tmp, state) = create_test_state();

        let result = state
            .driver_repo
            .upsert_rule(TENANT, &blocked_days_rule("R1", "GHOST", &[Weekday::Mon]));
        assert!(matches!(result, Err(RepositoryError::ForeignKeyViolation(_))));
        assert!(matches!(
            result.map_err(ApiError::from),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_max_start_time_rule_blocks_late_shift() {
        let (_tmp, state) = create_test_state();
        seed_drivers(&state, &[build_driver("D1", &[])]);
        state
            .driver_repo
            .upsert_rule(
                TENANT,
                &max_start_rule("R1", "D1", NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
            )
            .unwrap();
        seed_subjects(
            &state,
            &[
                build_subject("EARLY", "2025-03-03 06:00", 8.0, SoloType::Solo1),
                build_subject("LATE", "2025-03-05 21:30", 8.0, SoloType::Solo1),
            ],
        );

        state.assignment_api.create_assignment("D1", "EARLY").await.unwrap();
        assert!(matches!(
            state.assignment_api.create_assignment("D1", "LATE").await,
            Err(ApiError::AssignmentRejected { .. })
        ));
    }

    #[test]
    fn test_global_config_value_upsert() {
        let (_tmp, state) = create_test_state();
        let cm = &state.config_manager;

        assert!(cm.get_global_config_value(config_keys::WORKLOAD_IDEAL_DAYS).unwrap().is_none());
        cm.set_global_config_value(config_keys::WORKLOAD_IDEAL_DAYS, "3").unwrap();
        cm.set_global_config_value(config_keys::WORKLOAD_IDEAL_DAYS, "4").unwrap();
        assert_eq!(
            cm.get_global_config_value(config_keys::WORKLOAD_IDEAL_DAYS).unwrap().as_deref(),
            Some("4")
        );
    }
}

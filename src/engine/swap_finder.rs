// ==========================================
// 司机排班调度系统 - 换班候选查找
// ==========================================
// 职责: 为待换人的班次筛选并排序可替换司机
// 排序: 周出勤天数升序(公平) → valid 优先于 warning → 工时升序 → driver_id
// 红线: 返回的候选永远不含 violation 结论
// ==========================================

use crate::domain::assignment::AssignmentWithSubject;
use crate::domain::driver::{Driver, ProtectedRule};
use crate::domain::subject::AssignmentSubject;
use crate::domain::types::ValidationStatus;
use crate::domain::workload::WorkloadSummary;
use crate::engine::assignment_validator::AssignmentValidator;
use crate::engine::workload::{week_start_for, WorkloadCalculator};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// 排序后的候选司机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub driver: Driver,
    pub workload: WorkloadSummary,
    pub compliance_status: ValidationStatus,
    pub compliance_messages: Vec<String>,
}

// ==========================================
// SwapCandidateFinder - 换班候选查找器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SwapCandidateFinder {
    validator: AssignmentValidator,
    workload: WorkloadCalculator,
}

impl SwapCandidateFinder {
    pub fn new(validator: AssignmentValidator, workload: WorkloadCalculator) -> Self {
        Self { validator, workload }
    }

    /// 查找换班候选
    ///
    /// # 参数
    /// - subject: 需要换人的班次
    /// - drivers: 租户内全部司机
    /// - assignments: 租户内分配(含班次)
    /// - protected_rules: 租户内保护规则
    ///
    /// # 返回
    /// - 候选列表(最优在前);空列表为正常结果
    #[instrument(skip_all, fields(subject_id = %subject.subject_id))]
    pub fn find_swap_candidates(
        &self,
        subject: &AssignmentSubject,
        drivers: &[Driver],
        assignments: &[AssignmentWithSubject],
        protected_rules: &[ProtectedRule],
    ) -> Vec<RankedCandidate> {
        let current = assignments
            .iter()
            .find(|aws| aws.is_active() && aws.subject_id() == subject.subject_id);
        let current_driver_id = current.map(|aws| aws.driver_id());
        let exclude_id = current.map(|aws| aws.assignment_id());
        let week_start = week_start_for(subject.service_date);

        let mut candidates: Vec<RankedCandidate> = drivers
            .iter()
            .filter(|d| Some(d.driver_id.as_str()) != current_driver_id)
            .filter(|d| d.is_active() && d.is_eligible_for(subject.solo_type))
            .filter_map(|d| {
                let outcome = self.validator.validate_assignment(
                    d,
                    subject,
                    assignments,
                    protected_rules,
                    assignments,
                    exclude_id,
                );
                if !outcome.can_assign {
                    debug!(driver_id = %d.driver_id, status = %outcome.status(), "候选司机被排除");
                    return None;
                }

                Some(RankedCandidate {
                    driver: d.clone(),
                    workload: self.workload.compute_workload(&d.driver_id, week_start, assignments),
                    compliance_status: outcome.status(),
                    compliance_messages: outcome.validation_result.messages,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.workload
                .days_worked
                .cmp(&b.workload.days_worked)
                .then_with(|| a.compliance_status.cmp(&b.compliance_status))
                .then_with(|| a.workload.total_hours.total_cmp(&b.workload.total_hours))
                .then_with(|| a.driver.driver_id.cmp(&b.driver.driver_id))
        });

        debug!(count = candidates.len(), "换班候选计算完成");
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assignment::{Assignment, ValidationSummary};
    use crate::domain::types::{DriverStatus, SoloType};
    use crate::engine::hos::hours_to_duration;
    use chrono::{NaiveDate, NaiveTime};

    fn driver(id: &str) -> Driver {
        Driver {
            driver_id: id.to_string(),
            tenant_id: "T1".to_string(),
            name: id.to_string(),
            solo_types: vec![],
            status: DriverStatus::Active,
            is_protected: false,
        }
    }

    fn subject(id: &str, day: u32, hour: u32, hours: f64) -> AssignmentSubject {
        let start_at = NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        AssignmentSubject {
            subject_id: id.to_string(),
            tenant_id: "T1".to_string(),
            service_date: start_at.date(),
            start_at,
            end_at: start_at + hours_to_duration(hours),
            duration_hours: hours,
            solo_type: SoloType::Solo1,
            resource_id: None,
            contract_id: None,
        }
    }

    fn assigned(driver_id: &str, subject: AssignmentSubject) -> AssignmentWithSubject {
        let assignment = Assignment::new_active(
            "T1",
            driver_id,
            &subject.subject_id,
            subject.start_at,
            ValidationStatus::Valid,
            ValidationSummary::default(),
        );
        AssignmentWithSubject { assignment, subject }
    }

    #[test]
    fn test_excludes_current_driver_and_violations() {
        let finder = SwapCandidateFinder::default();
        let target = subject("B9", 7, 8, 6.0);
        let assignments = vec![
            assigned("D1", target.clone()),
            // D2 在 B9 开始前 4 小时才下班 → 休息不足
            assigned("D2", subject("B1", 6, 18, 10.0)),
        ];
        let drivers = vec![driver("D1"), driver("D2"), driver("D3")];

        let candidates = finder.find_swap_candidates(&target, &drivers, &assignments, &[]);

        let ids: Vec<&str> = candidates.iter().map(|c| c.driver.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["D3"]);
        assert!(candidates
            .iter()
            .all(|c| c.compliance_status != ValidationStatus::Violation));
    }

    #[test]
    fn test_ranks_by_workload_then_status() {
        let finder = SwapCandidateFinder::default();
        let target = subject("B9", 7, 8, 6.0);
        let rule = ProtectedRule {
            rule_id: "R1".to_string(),
            driver_id: "D2".to_string(),
            allowed_start_times: vec![NaiveTime::from_hms_opt(16, 0, 0).unwrap()],
            ..Default::default()
        };
        let assignments = vec![
            assigned("D1", subject("B1", 3, 8, 6.0)),
            assigned("D1", subject("B2", 4, 8, 6.0)),
        ];
        let drivers = vec![driver("D1"), driver("D2"), driver("D3")];

        let candidates = finder.find_swap_candidates(&target, &drivers, &assignments, &[rule]);

        let ids: Vec<&str> = candidates.iter().map(|c| c.driver.driver_id.as_str()).collect();
        // D2/D3 都是 0 天,D3 为 valid 排在 warning 的 D2 之前;D1 已出勤 2 天
        assert_eq!(ids, vec!["D3", "D2", "D1"]);
        assert_eq!(candidates[1].compliance_status, ValidationStatus::Warning);
        assert_eq!(candidates[2].workload.days_worked, 2);
    }

    #[test]
    fn test_no_candidates_is_empty_list() {
        let finder = SwapCandidateFinder::default();
        let target = subject("B9", 7, 8, 6.0);
        let inactive = Driver {
            status: DriverStatus::Inactive,
            ..driver("D2")
        };
        let candidates = finder.find_swap_candidates(&target, &[inactive], &[], &[]);
        assert!(candidates.is_empty());
    }
}

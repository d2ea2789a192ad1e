// ==========================================
// 司机排班调度系统 - 工作负荷计算器
// ==========================================
// 职责: 统计司机周出勤天数/工时,划分负荷等级
// 说明: 与分配校验器相互独立,结果为派生数据
// 红线: 无状态、无副作用、无 I/O 操作
// ==========================================

use crate::domain::assignment::AssignmentWithSubject;
use crate::domain::driver::Driver;
use crate::domain::types::WorkloadLevel;
use crate::domain::workload::WorkloadSummary;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 负荷等级阈值(按周出勤天数)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadThresholds {
    pub ideal_days: u32,
    pub warning_days: u32,
    pub critical_days: u32,
}

impl Default for WorkloadThresholds {
    fn default() -> Self {
        Self {
            ideal_days: 4,
            warning_days: 5,
            critical_days: 6,
        }
    }
}

/// 日期所在周的周起始日(周日)
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

// ==========================================
// WorkloadCalculator - 工作负荷计算器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct WorkloadCalculator {
    thresholds: WorkloadThresholds,
}

impl WorkloadCalculator {
    pub fn new(thresholds: WorkloadThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> WorkloadThresholds {
        self.thresholds
    }

    /// 按出勤天数划分等级
    pub fn classify(&self, days_worked: u32) -> WorkloadLevel {
        if days_worked >= self.thresholds.critical_days {
            WorkloadLevel::Critical
        } else if days_worked >= self.thresholds.warning_days {
            WorkloadLevel::Warning
        } else if days_worked >= self.thresholds.ideal_days {
            WorkloadLevel::Ideal
        } else {
            WorkloadLevel::Underutilized
        }
    }

    /// 计算单个司机的周负荷
    ///
    /// # 规则
    /// - 周范围 = [week_start, week_start + 7 天),按班次服务日期判定
    /// - days_worked = 不同服务日期数
    /// - 只统计该司机的有效分配
    pub fn compute_workload(
        &self,
        driver_id: &str,
        week_start: NaiveDate,
        assignments: &[AssignmentWithSubject],
    ) -> WorkloadSummary {
        let week_end = week_start + Duration::days(7);

        let mut in_week: Vec<&AssignmentWithSubject> = assignments
            .iter()
            .filter(|aws| aws.is_active() && aws.driver_id() == driver_id)
            .filter(|aws| {
                aws.subject.service_date >= week_start && aws.subject.service_date < week_end
            })
            .collect();
        in_week.sort_by(|a, b| {
            a.subject
                .start_at
                .cmp(&b.subject.start_at)
                .then_with(|| a.subject_id().cmp(b.subject_id()))
        });

        let days: BTreeSet<NaiveDate> = in_week.iter().map(|aws| aws.subject.service_date).collect();
        let days_worked = days.len() as u32;
        let total_hours: f64 = in_week.iter().map(|aws| aws.subject.duration_hours).sum();

        WorkloadSummary {
            driver_id: driver_id.to_string(),
            week_start,
            days_worked,
            total_hours,
            workload_level: self.classify(days_worked),
            block_ids: in_week.iter().map(|aws| aws.subject_id().to_string()).collect(),
        }
    }

    /// 批量计算租户内全部司机的周负荷
    ///
    /// 返回按负荷升序排列(出勤天数 → 工时 → driver_id)
    pub fn get_all_driver_workloads(
        &self,
        drivers: &[Driver],
        week_start: NaiveDate,
        assignments: &[AssignmentWithSubject],
    ) -> Vec<WorkloadSummary> {
        let mut summaries: Vec<WorkloadSummary> = drivers
            .iter()
            .map(|d| self.compute_workload(&d.driver_id, week_start, assignments))
            .collect();

        summaries.sort_by(|a, b| {
            a.days_worked
                .cmp(&b.days_worked)
                .then_with(|| a.total_hours.total_cmp(&b.total_hours))
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assignment::{Assignment, ValidationSummary};
    use crate::domain::subject::AssignmentSubject;
    use crate::domain::types::{DriverStatus, SoloType, ValidationStatus};
    use crate::engine::hos::hours_to_duration;

    fn aws(driver_id: &str, subject_id: &str, day: u32, hours: f64) -> AssignmentWithSubject {
        let start_at = NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let subject = AssignmentSubject {
            subject_id: subject_id.to_string(),
            tenant_id: "T1".to_string(),
            service_date: start_at.date(),
            start_at,
            end_at: start_at + hours_to_duration(hours),
            duration_hours: hours,
            solo_type: SoloType::Solo1,
            resource_id: None,
            contract_id: None,
        };
        let assignment = Assignment::new_active(
            "T1",
            driver_id,
            subject_id,
            start_at,
            ValidationStatus::Valid,
            ValidationSummary::default(),
        );
        AssignmentWithSubject { assignment, subject }
    }

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

    // 2025-03-02 是星期日
    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
    }

    #[test]
    fn test_level_boundaries() {
        let calc = WorkloadCalculator::default();
        assert_eq!(calc.classify(0), WorkloadLevel::Underutilized);
        assert_eq!(calc.classify(3), WorkloadLevel::Underutilized);
        assert_eq!(calc.classify(4), WorkloadLevel::Ideal);
        assert_eq!(calc.classify(5), WorkloadLevel::Warning);
        assert_eq!(calc.classify(6), WorkloadLevel::Critical);
        assert_eq!(calc.classify(7), WorkloadLevel::Critical);
    }

    #[test]
    fn test_counts_distinct_days_within_week() {
        let calc = WorkloadCalculator::default();
        let data = vec![
            aws("D1", "B1", 3, 5.0),
            aws("D1", "B2", 3, 4.0),
            aws("D1", "B3", 4, 8.0),
            aws("D1", "B4", 9, 8.0), // 下一周
            aws("D2", "B5", 5, 8.0),
        ];

        let summary = calc.compute_workload("D1", week(), &data);

        assert_eq!(summary.days_worked, 2);
        assert_eq!(summary.total_hours, 17.0);
        assert_eq!(summary.block_ids, vec!["B1", "B2", "B3"]);
        assert_eq!(summary.workload_level, WorkloadLevel::Underutilized);
    }

    #[test]
    fn test_all_workloads_sorted_ascending() {
        let calc = WorkloadCalculator::default();
        let data = vec![
            aws("D1", "B1", 3, 5.0),
            aws("D1", "B2", 4, 5.0),
            aws("D2", "B3", 3, 5.0),
        ];
        let drivers = vec![driver("D1"), driver("D2"), driver("D3")];

        let all = calc.get_all_driver_workloads(&drivers, week(), &data);

        let order: Vec<&str> = all.iter().map(|w| w.driver_id.as_str()).collect();
        assert_eq!(order, vec!["D3", "D2", "D1"]);
    }

    #[test]
    fn test_week_start_is_sunday() {
        let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(week_start_for(friday), week());
        assert_eq!(week_start_for(week()), week());
    }
}

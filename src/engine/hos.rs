// ==========================================
// 司机排班调度系统 - HOS 合规计算器
// ==========================================
// 职责: 滚动窗口工时累计 + 10 小时休息间隔判定
// 输入: 拟分配班次 + 司机其他有效班次
// 输出: HosResult (状态 + 工时 + 原因)
// 红线: 无状态、无副作用、无 I/O 操作
// ==========================================

use crate::domain::assignment::ValidationMetrics;
use crate::domain::subject::AssignmentSubject;
use crate::domain::types::{SoloType, ValidationStatus};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 浮点比较容差(小时)
const HOURS_EPSILON: f64 = 1e-9;

// ==========================================
// ComplianceLimits - 单个班次类型的限额
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplianceLimits {
    pub max_hours: f64,
    pub window_hours: f64,
    pub warning_ratio: f64,
}

impl ComplianceLimits {
    pub const SOLO1: ComplianceLimits = ComplianceLimits {
        max_hours: 14.0,
        window_hours: 24.0,
        warning_ratio: 0.9,
    };

    pub const SOLO2: ComplianceLimits = ComplianceLimits {
        max_hours: 38.0,
        window_hours: 48.0,
        warning_ratio: 0.9,
    };

    /// 预警阈值(含边界: hours_used >= threshold 即预警)
    pub fn warning_threshold(&self) -> f64 {
        self.max_hours * self.warning_ratio
    }

    /// 回溯天数(按服务日期限定查询范围)
    pub fn lookback_days(&self) -> i64 {
        (self.window_hours / 24.0).ceil().max(1.0) as i64
    }
}

// ==========================================
// ComplianceRules - 全部合规规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRules {
    pub solo1: ComplianceLimits,
    pub solo2: ComplianceLimits,
    /// team 默认沿用 solo2 限额
    pub team: ComplianceLimits,
    /// 相邻班次之间最少休息时长
    pub min_rest_hours: f64,
}

impl Default for ComplianceRules {
    fn default() -> Self {
        Self {
            solo1: ComplianceLimits::SOLO1,
            solo2: ComplianceLimits::SOLO2,
            team: ComplianceLimits::SOLO2,
            min_rest_hours: 10.0,
        }
    }
}

impl ComplianceRules {
    pub fn limits_for(&self, solo_type: SoloType) -> ComplianceLimits {
        match solo_type {
            SoloType::Solo1 => self.solo1,
            SoloType::Solo2 => self.solo2,
            SoloType::Team => self.team,
        }
    }

    /// 回溯查询的起始服务日期
    pub fn lookback_start_date(&self, subject: &AssignmentSubject) -> NaiveDate {
        subject.service_date - Duration::days(self.limits_for(subject.solo_type).lookback_days())
    }

    /// 合规影响范围: 一个班次的判定依赖于 [start - window, end + min_rest] 内的其他班次
    pub fn compliance_horizon(&self, subject: &AssignmentSubject) -> (NaiveDateTime, NaiveDateTime) {
        let limits = self.limits_for(subject.solo_type);
        (
            subject.start_at - hours_to_duration(limits.window_hours),
            subject.end_at + hours_to_duration(self.min_rest_hours),
        )
    }

    /// 最长窗口(小时),用于限定批量查询范围
    pub fn max_window_hours(&self) -> f64 {
        self.solo1
            .window_hours
            .max(self.solo2.window_hours)
            .max(self.team.window_hours)
    }
}

pub(crate) fn hours_to_duration(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0).round() as i64)
}

fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

// ==========================================
// HosResult - 计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HosResult {
    pub status: ValidationStatus,
    pub hours_used: f64,
    pub max_hours: f64,
    pub window_hours: f64,
    pub messages: Vec<String>,
    pub metrics: ValidationMetrics,
}

impl HosResult {
    /// 合并后的单行消息
    pub fn message(&self) -> String {
        self.messages.join("; ")
    }
}

// ==========================================
// HosComplianceCalculator - HOS 合规计算器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct HosComplianceCalculator {
    rules: ComplianceRules,
}

impl HosComplianceCalculator {
    pub fn new(rules: ComplianceRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ComplianceRules {
        &self.rules
    }

    /// 计算拟分配班次的 HOS 合规状态
    ///
    /// # 规则
    /// 1. hours_used = 窗口内已有班次时长之和 + 本班次时长
    ///    (窗口 = [start - window_hours, start),按已有班次开始时间判定)
    /// 2. hours_used > max_hours → violation
    /// 3. hours_used >= max_hours * warning_ratio → warning
    /// 4. 与上一班次结束间隔 < min_rest_hours → violation(独立于工时)
    /// 5. 与下一班次开始间隔 < min_rest_hours → violation
    /// 6. 与已有班次时间重叠 → violation
    ///
    /// # 参数
    /// - proposed: 拟分配班次
    /// - existing: 司机其他有效班次(同一班次会被忽略)
    pub fn calculate(
        &self,
        proposed: &AssignmentSubject,
        existing: &[&AssignmentSubject],
    ) -> HosResult {
        let limits = self.rules.limits_for(proposed.solo_type);
        let window_start = proposed.start_at - hours_to_duration(limits.window_hours);
        let threshold = limits.warning_threshold();

        let others: Vec<&AssignmentSubject> = existing
            .iter()
            .copied()
            .filter(|s| s.subject_id != proposed.subject_id)
            .collect();

        // 1. 窗口工时
        let window_hours_logged: f64 = others
            .iter()
            .filter(|s| s.start_at >= window_start && s.start_at < proposed.start_at)
            .map(|s| s.duration_hours)
            .sum();
        let hours_used = window_hours_logged + proposed.duration_hours;

        let mut status = ValidationStatus::Valid;
        let mut messages = Vec::new();

        if hours_used > limits.max_hours + HOURS_EPSILON {
            status = ValidationStatus::Violation;
            messages.push(format!(
                "HOS_LIMIT_EXCEEDED: {:.1}h in trailing {:.0}h window exceeds {:.1}h limit for {}",
                hours_used, limits.window_hours, limits.max_hours, proposed.solo_type
            ));
        } else if hours_used + HOURS_EPSILON >= threshold {
            status = ValidationStatus::Warning;
            messages.push(format!(
                "HOS_LIMIT_APPROACHING: {:.1}h of {:.1}h used in trailing {:.0}h window (warning at {:.1}h)",
                hours_used, limits.max_hours, limits.window_hours, threshold
            ));
        }

        // 2. 重叠检测
        for other in others.iter().filter(|s| s.overlaps(proposed)) {
            status = ValidationStatus::Violation;
            messages.push(format!(
                "SHIFT_OVERLAP: overlaps existing shift {} ({} - {})",
                other.subject_id, other.start_at, other.end_at
            ));
        }

        // 3. 与上一班次的休息间隔
        let rest_gap_hours = others
            .iter()
            .filter(|s| s.end_at <= proposed.start_at)
            .map(|s| s.end_at)
            .max()
            .map(|prev_end| hours_between(prev_end, proposed.start_at));

        if let Some(gap) = rest_gap_hours {
            if gap + HOURS_EPSILON < self.rules.min_rest_hours {
                status = ValidationStatus::Violation;
                messages.push(format!(
                    "REST_GAP_VIOLATION: only {:.1}h rest since previous shift ended (minimum {:.0}h)",
                    gap, self.rules.min_rest_hours
                ));
            }
        }

        // 4. 与下一班次的休息间隔
        let next_rest_gap_hours = others
            .iter()
            .filter(|s| s.start_at >= proposed.end_at)
            .map(|s| s.start_at)
            .min()
            .map(|next_start| hours_between(proposed.end_at, next_start));

        if let Some(gap) = next_rest_gap_hours {
            if gap + HOURS_EPSILON < self.rules.min_rest_hours {
                status = ValidationStatus::Violation;
                messages.push(format!(
                    "REST_GAP_VIOLATION: only {:.1}h rest before next shift starts (minimum {:.0}h)",
                    gap, self.rules.min_rest_hours
                ));
            }
        }

        HosResult {
            status,
            hours_used,
            max_hours: limits.max_hours,
            window_hours: limits.window_hours,
            messages,
            metrics: ValidationMetrics {
                hours_used,
                max_hours: limits.max_hours,
                window_hours: limits.window_hours,
                warning_threshold: threshold,
                rest_gap_hours,
                next_rest_gap_hours,
            },
        }
    }
}

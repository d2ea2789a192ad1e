// ==========================================
// 司机排班调度系统 - 保护规则校验器
// ==========================================
// 职责: 按司机保护规则校验拟分配班次
// 规则: 禁止日/允许日/允许班次类型/最晚开始时刻 → 硬约束
//       允许开始时刻 → 软偏好(仅预警)
// 红线: 无状态、无副作用、无 I/O 操作
// ==========================================

use crate::domain::driver::ProtectedRule;
use crate::domain::types::{weekday_name, SoloType};
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// 保护规则校验结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedRuleCheck {
    pub passed: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

// ==========================================
// ProtectedRuleValidator - 保护规则校验器
// ==========================================
pub struct ProtectedRuleValidator;

impl ProtectedRuleValidator {
    /// 校验单条规则
    ///
    /// # 参数
    /// - rule: 司机保护规则(None → 直接通过)
    /// - day: 拟分配星期
    /// - solo_type: 拟分配班次类型
    /// - start_time: 拟分配开始时刻
    pub fn check(
        rule: Option<&ProtectedRule>,
        day: Weekday,
        solo_type: SoloType,
        start_time: NaiveTime,
    ) -> ProtectedRuleCheck {
        let Some(rule) = rule else {
            return ProtectedRuleCheck {
                passed: true,
                ..Default::default()
            };
        };

        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let day_name = weekday_name(day);

        // 规则 1: 禁止日
        if rule.blocked_days.contains(&day) {
            violations.push(format!(
                "PROTECTED_BLOCKED_DAY: driver {} is blocked on {}",
                rule.driver_id, day_name
            ));
        }

        // 规则 2: 允许日
        if !rule.allowed_days.is_empty() && !rule.allowed_days.contains(&day) {
            let allowed: Vec<&str> = rule.allowed_days.iter().map(|d| weekday_name(*d)).collect();
            violations.push(format!(
                "PROTECTED_DAY_NOT_ALLOWED: {} is not in allowed days [{}]",
                day_name,
                allowed.join(", ")
            ));
        }

        // 规则 3: 允许班次类型
        if !rule.allowed_solo_types.is_empty() && !rule.allowed_solo_types.contains(&solo_type) {
            let allowed: Vec<&str> = rule.allowed_solo_types.iter().map(|s| s.to_db_str()).collect();
            violations.push(format!(
                "PROTECTED_SOLO_TYPE_NOT_ALLOWED: {} is not in allowed solo types [{}]",
                solo_type,
                allowed.join(", ")
            ));
        }

        // 规则 4: 最晚开始时刻
        if let Some(max_start) = rule.max_start_time {
            if start_time > max_start {
                violations.push(format!(
                    "PROTECTED_START_TOO_LATE: start {} is later than max start {}",
                    start_time.format("%H:%M"),
                    max_start.format("%H:%M")
                ));
            }
        }

        // 规则 5: 允许开始时刻(软偏好)
        if !rule.allowed_start_times.is_empty() && !rule.allowed_start_times.contains(&start_time) {
            let allowed: Vec<String> = rule
                .allowed_start_times
                .iter()
                .map(|t| t.format("%H:%M").to_string())
                .collect();
            warnings.push(format!(
                "PROTECTED_START_TIME_PREFERENCE: start {} is not in preferred start times [{}]",
                start_time.format("%H:%M"),
                allowed.join(", ")
            ));
        }

        ProtectedRuleCheck {
            passed: violations.is_empty(),
            violations,
            warnings,
        }
    }

    /// 校验司机的全部规则(多条规则的结果合并)
    pub fn check_all(
        rules: &[&ProtectedRule],
        day: Weekday,
        solo_type: SoloType,
        start_time: NaiveTime,
    ) -> ProtectedRuleCheck {
        let mut merged = ProtectedRuleCheck {
            passed: true,
            ..Default::default()
        };

        for rule in rules {
            let check = Self::check(Some(rule), day, solo_type, start_time);
            merged.violations.extend(check.violations);
            merged.warnings.extend(check.warnings);
        }

        merged.passed = merged.violations.is_empty();
        merged
    }
}

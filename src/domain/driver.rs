// ==========================================
// 司机排班调度系统 - 司机与保护规则
// ==========================================
// 职责: 司机实体、司机级保护规则(允许/禁止清单)
// 说明: 两者均由外部司机管理模块维护,本核心只读
// ==========================================

use crate::domain::types::{parse_weekday, DriverStatus, SoloType, TypeParseError};
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

// ==========================================
// Driver - 司机
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub driver_id: String,
    pub tenant_id: String,
    pub name: String,
    /// 可承接的班次类型(空 = 不限)
    pub solo_types: Vec<SoloType>,
    pub status: DriverStatus,
    /// 是否受保护(存在保护规则)
    pub is_protected: bool,
}

impl Driver {
    /// 是否可承接指定班次类型
    pub fn is_eligible_for(&self, solo_type: SoloType) -> bool {
        self.solo_types.is_empty() || self.solo_types.contains(&solo_type)
    }

    pub fn is_active(&self) -> bool {
        self.status == DriverStatus::Active
    }
}

// ==========================================
// ProtectedRule - 司机保护规则
// ==========================================
// 空列表表示"不限制"; blocked_days 为硬约束
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedRule {
    pub rule_id: String,
    pub driver_id: String,
    pub blocked_days: Vec<Weekday>,
    pub allowed_days: Vec<Weekday>,
    pub allowed_solo_types: Vec<SoloType>,
    pub allowed_start_times: Vec<NaiveTime>,
    pub max_start_time: Option<NaiveTime>,
}

impl ProtectedRule {
    /// 从原始字符串清单构造规则(边界规范化)
    ///
    /// # 参数
    /// - blocked_days / allowed_days: 星期名称("friday" / "Fri")
    /// - allowed_solo_types: 班次类型("solo1" / "Solo2")
    /// - allowed_start_times / max_start_time: "HH:MM"
    pub fn from_raw(
        rule_id: &str,
        driver_id: &str,
        blocked_days: &[String],
        allowed_days: &[String],
        allowed_solo_types: &[String],
        allowed_start_times: &[String],
        max_start_time: Option<&str>,
    ) -> Result<Self, TypeParseError> {
        Ok(Self {
            rule_id: rule_id.to_string(),
            driver_id: driver_id.to_string(),
            blocked_days: blocked_days
                .iter()
                .map(|d| parse_weekday(d))
                .collect::<Result<_, _>>()?,
            allowed_days: allowed_days
                .iter()
                .map(|d| parse_weekday(d))
                .collect::<Result<_, _>>()?,
            allowed_solo_types: allowed_solo_types
                .iter()
                .map(|s| SoloType::parse(s))
                .collect::<Result<_, _>>()?,
            allowed_start_times: allowed_start_times
                .iter()
                .map(|t| parse_time_of_day(t))
                .collect::<Result<_, _>>()?,
            max_start_time: max_start_time.map(parse_time_of_day).transpose()?,
        })
    }
}

/// 解析 "HH:MM" 或 "HH:MM:SS"
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, TypeParseError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| TypeParseError::InvalidTimeOfDay(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_normalizes_values() {
        let rule = ProtectedRule::from_raw(
            "R1",
            "D1",
            &["Friday".to_string()],
            &["mon".to_string(), "TUESDAY".to_string()],
            &["Solo1".to_string()],
            &["16:30".to_string()],
            Some("20:00"),
        )
        .unwrap();

        assert_eq!(rule.blocked_days, vec![Weekday::Fri]);
        assert_eq!(rule.allowed_days, vec![Weekday::Mon, Weekday::Tue]);
        assert_eq!(rule.allowed_solo_types, vec![SoloType::Solo1]);
        assert_eq!(
            rule.allowed_start_times,
            vec![NaiveTime::from_hms_opt(16, 30, 0).unwrap()]
        );
        assert_eq!(rule.max_start_time, NaiveTime::from_hms_opt(20, 0, 0));
    }

    #[test]
    fn test_from_raw_rejects_bad_time() {
        let result = ProtectedRule::from_raw("R1", "D1", &[], &[], &[], &[], Some("25:99"));
        assert!(result.is_err());
    }

    #[test]
    fn test_driver_eligibility() {
        let driver = Driver {
            driver_id: "D1".to_string(),
            tenant_id: "T1".to_string(),
            name: "Driver One".to_string(),
            solo_types: vec![SoloType::Solo1],
            status: DriverStatus::Active,
            is_protected: false,
        };
        assert!(driver.is_eligible_for(SoloType::Solo1));
        assert!(!driver.is_eligible_for(SoloType::Solo2));

        let any = Driver {
            solo_types: vec![],
            ..driver
        };
        assert!(any.is_eligible_for(SoloType::Team));
    }
}

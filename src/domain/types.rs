// ==========================================
// 司机排班调度系统 - 领域类型定义
// ==========================================
// 职责: 班次类型、校验状态、工作负荷等级等枚举
// 红线: 所有组件只使用此处的规范化类型,不直接处理原始字符串
// ==========================================

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// 班次类型 (Solo Type)
// ==========================================
// 决定合规窗口: solo1 → 24h, solo2 → 48h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoloType {
    Solo1,
    Solo2,
    Team,
}

/// 类型解析错误(边界规范化时使用)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("unknown solo type: {0}")]
    UnknownSoloType(String),

    #[error("unknown day of week: {0}")]
    UnknownWeekday(String),

    #[error("invalid time of day (expected HH:MM): {0}")]
    InvalidTimeOfDay(String),
}

impl SoloType {
    pub const ALL: [SoloType; 3] = [SoloType::Solo1, SoloType::Solo2, SoloType::Team];

    /// 解析班次类型
    ///
    /// 兼容来源数据中的大小写/空格/下划线变体:
    /// "Solo1" / "SOLO 1" / "solo_1" / "solo-1" → Solo1
    pub fn parse(raw: &str) -> Result<Self, TypeParseError> {
        let compact: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match compact.as_str() {
            "solo1" | "s1" => Ok(SoloType::Solo1),
            "solo2" | "s2" => Ok(SoloType::Solo2),
            "team" => Ok(SoloType::Team),
            _ => Err(TypeParseError::UnknownSoloType(raw.to_string())),
        }
    }

    /// 回溯天数(用于按服务日期限定查询范围)
    pub fn lookback_days(&self) -> i64 {
        match self {
            SoloType::Solo1 => 1,
            SoloType::Solo2 | SoloType::Team => 2,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SoloType::Solo1 => "solo1",
            SoloType::Solo2 => "solo2",
            SoloType::Team => "team",
        }
    }
}

impl fmt::Display for SoloType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 校验状态 (Validation Status)
// ==========================================
// 顺序: Valid < Warning < Violation (用于取最严重状态)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Warning,
    Violation,
}

impl ValidationStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "warning" => ValidationStatus::Warning,
            "violation" => ValidationStatus::Violation,
            _ => ValidationStatus::Valid,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Warning => "warning",
            ValidationStatus::Violation => "violation",
        }
    }

    /// 是否阻断写入
    pub fn is_blocking(&self) -> bool {
        matches!(self, ValidationStatus::Violation)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 工作负荷等级 (Workload Level)
// ==========================================
// 按周出勤天数: <4 欠载, =4 理想, =5 关注, >=6 超载
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadLevel {
    Underutilized,
    Ideal,
    Warning,
    Critical,
}

impl fmt::Display for WorkloadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadLevel::Underutilized => write!(f, "underutilized"),
            WorkloadLevel::Ideal => write!(f, "ideal"),
            WorkloadLevel::Warning => write!(f, "warning"),
            WorkloadLevel::Critical => write!(f, "critical"),
        }
    }
}

// ==========================================
// 司机状态 (Driver Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Active,
    Inactive,
}

impl DriverStatus {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "inactive" => DriverStatus::Inactive,
            _ => DriverStatus::Active,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            DriverStatus::Active => "active",
            DriverStatus::Inactive => "inactive",
        }
    }
}

// ==========================================
// 星期解析 (Day of Week)
// ==========================================

/// 解析星期名称(大小写不敏感,支持全称与三字母缩写)
pub fn parse_weekday(raw: &str) -> Result<Weekday, TypeParseError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        _ => Err(TypeParseError::UnknownWeekday(raw.to_string())),
    }
}

/// 星期的小写全称(用于消息与持久化)
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

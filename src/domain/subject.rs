// ==========================================
// 司机排班调度系统 - 班次(Block)实体
// ==========================================
// 职责: 规范化的 AssignmentSubject 值类型 + 边界规范化
// 红线: 引擎只接收 AssignmentSubject,原始记录必须先经过 normalize()
// ==========================================

use crate::domain::types::{SoloType, TypeParseError};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// AssignmentSubject - 班次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSubject {
    pub subject_id: String,
    pub tenant_id: String,
    pub service_date: NaiveDate,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    /// 时长(小时)
    pub duration_hours: f64,
    pub solo_type: SoloType,
    /// 牵引车编号
    pub resource_id: Option<String>,
    pub contract_id: Option<String>,
}

impl AssignmentSubject {
    /// 班次所在星期(按服务日期)
    pub fn day_of_week(&self) -> Weekday {
        self.service_date.weekday()
    }

    /// 班次开始时刻
    pub fn start_time(&self) -> NaiveTime {
        self.start_at.time()
    }

    /// 两个班次的时间区间是否重叠
    pub fn overlaps(&self, other: &AssignmentSubject) -> bool {
        self.start_at < other.end_at && other.start_at < self.end_at
    }
}

// ==========================================
// RawSubjectRecord - 外部原始记录
// ==========================================
// 来源: 导入/人工录入,字段格式不统一
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSubjectRecord {
    pub subject_id: String,
    pub tenant_id: String,
    pub service_date: Option<String>,
    pub start_timestamp: String,
    pub end_timestamp: Option<String>,
    pub duration_hours: Option<f64>,
    pub solo_type: String,
    pub resource_id: Option<String>,
    pub contract_id: Option<String>,
}

/// 规范化错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("subject {subject_id}: {source}")]
    Type {
        subject_id: String,
        #[source]
        source: TypeParseError,
    },

    #[error("subject {subject_id}: invalid timestamp '{value}'")]
    InvalidTimestamp { subject_id: String, value: String },

    #[error("subject {subject_id}: invalid service date '{value}'")]
    InvalidServiceDate { subject_id: String, value: String },

    #[error("subject {subject_id}: end must be after start and duration positive")]
    InvalidSpan { subject_id: String },
}

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// 解析时间戳(兼容多种格式)
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

impl RawSubjectRecord {
    /// 规范化为 AssignmentSubject
    ///
    /// # 规则
    /// 1. solo_type 兼容大小写/空格变体
    /// 2. end_timestamp 缺失时按 duration_hours 推算
    /// 3. duration_hours 缺失时按 end - start 推算
    /// 4. service_date 缺失时取开始日期
    /// 5. end <= start 或 duration <= 0 → 拒绝
    pub fn normalize(&self) -> Result<AssignmentSubject, NormalizeError> {
        let subject_id = self.subject_id.clone();

        let solo_type = SoloType::parse(&self.solo_type).map_err(|source| NormalizeError::Type {
            subject_id: subject_id.clone(),
            source,
        })?;

        let start_at =
            parse_timestamp(&self.start_timestamp).ok_or_else(|| NormalizeError::InvalidTimestamp {
                subject_id: subject_id.clone(),
                value: self.start_timestamp.clone(),
            })?;

        let end_at = match (&self.end_timestamp, self.duration_hours) {
            (Some(raw_end), _) => {
                parse_timestamp(raw_end).ok_or_else(|| NormalizeError::InvalidTimestamp {
                    subject_id: subject_id.clone(),
                    value: raw_end.clone(),
                })?
            }
            (None, Some(hours)) if hours > 0.0 => {
                start_at + chrono::Duration::seconds((hours * 3600.0).round() as i64)
            }
            (None, _) => return Err(NormalizeError::InvalidSpan { subject_id }),
        };

        if end_at <= start_at {
            return Err(NormalizeError::InvalidSpan { subject_id });
        }

        let duration_hours = match self.duration_hours {
            Some(hours) if hours > 0.0 => hours,
            Some(_) => return Err(NormalizeError::InvalidSpan { subject_id }),
            None => (end_at - start_at).num_seconds() as f64 / 3600.0,
        };

        let service_date = match &self.service_date {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                NormalizeError::InvalidServiceDate {
                    subject_id: subject_id.clone(),
                    value: raw.clone(),
                }
            })?,
            None => start_at.date(),
        };

        Ok(AssignmentSubject {
            subject_id,
            tenant_id: self.tenant_id.clone(),
            service_date,
            start_at,
            end_at,
            duration_hours,
            solo_type,
            resource_id: self.resource_id.clone().filter(|s| !s.trim().is_empty()),
            contract_id: self.contract_id.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}

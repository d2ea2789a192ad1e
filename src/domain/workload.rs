// ==========================================
// 司机排班调度系统 - 工作负荷摘要
// ==========================================
// 说明: 派生数据,按需重算,不作为事实来源落库
// ==========================================

use crate::domain::types::WorkloadLevel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSummary {
    pub driver_id: String,
    pub week_start: NaiveDate,
    /// 本周出勤的不同服务日数
    pub days_worked: u32,
    pub total_hours: f64,
    pub workload_level: WorkloadLevel,
    pub block_ids: Vec<String>,
}

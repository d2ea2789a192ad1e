// ==========================================
// 司机排班调度系统 - 自动排班结果
// ==========================================
// 职责: 自动排班参数、逐班次决策、运行结果
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 自动排班参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoBuildParams {
    /// 最多处理的班次数(达到后停止,剩余班次保持原样)
    pub max_iterations: usize,
    /// 综合得分下限
    pub min_confidence: f64,
    /// 显式处理顺序(None = 按开始时间)
    pub block_order: Option<Vec<String>>,
    /// 同一司机同一服务日期最多分配一个班次
    pub one_block_per_day: bool,
}

/// 单个班次的决策动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Assigned,
    Skipped,
    Failed,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Assigned => "assigned",
            DecisionAction::Skipped => "skipped",
            DecisionAction::Failed => "failed",
        }
    }
}

// ==========================================
// AutoBuildSuggestion - 单班次决策
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoBuildSuggestion {
    pub block_id: String,
    pub driver_id: Option<String>,
    pub combined_score: f64,
    pub decision: DecisionAction,
    pub reasoning: String,
}

// ==========================================
// SchedulingResult - 运行结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingResult {
    pub run_id: String,
    pub tenant_id: String,
    pub week_start: NaiveDate,
    pub decisions: Vec<AutoBuildSuggestion>,
    pub assigned: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 因 max_iterations 未处理的班次
    pub unprocessed_block_ids: Vec<String>,
    pub stopped_early: bool,
    /// 已处理班次中成功分配的比例
    pub coverage_rate: f64,
    /// 不在岗或不能承接任何待处理班次类型的司机数
    pub ineligible_driver_count: usize,
    pub config_snapshot: Option<String>,
}

// ==========================================
// 司机排班调度系统 - 级联变更
// ==========================================
// 职责: 改派/互换/取消分配的请求与影响分析结果
// 说明: 动作类型为封闭枚举,由 CascadeEffectAnalyzer 按变体分派
// ==========================================

use crate::domain::assignment::ValidationSummary;
use crate::domain::types::ValidationStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// CascadeAction - 请求动作
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum CascadeAction {
    /// 将分配改派给另一名司机
    Reassign { target_driver_id: String },
    /// 与另一条分配互换司机
    Swap { other_assignment_id: String },
    /// 取消分配(释放班次)
    Unassign,
}

impl CascadeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeAction::Reassign { .. } => "reassign",
            CascadeAction::Swap { .. } => "swap",
            CascadeAction::Unassign => "unassign",
        }
    }
}

/// 级联变更请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeRequest {
    pub tenant_id: String,
    pub origin_assignment_id: String,
    pub action: CascadeAction,
}

impl CascadeRequest {
    pub fn target_driver_id(&self) -> Option<&str> {
        match &self.action {
            CascadeAction::Reassign { target_driver_id } => Some(target_driver_id),
            _ => None,
        }
    }
}

// ==========================================
// AffectedAssignment - 受影响的分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedAssignment {
    pub assignment_id: String,
    /// 变更后的司机(取消分配时为原司机)
    pub driver_id: String,
    pub before_status: ValidationStatus,
    /// None 表示该分配在假设状态下被取消
    pub after_status: Option<ValidationStatus>,
    /// 是否为请求直接修改的分配
    pub is_direct: bool,
    pub description: String,
    /// 假设状态下的校验摘要(执行时随分配一并写入)
    #[serde(default)]
    pub after_summary: Option<ValidationSummary>,
}

/// 可行性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeFeasibility {
    Ok,
    Blocked,
}

// ==========================================
// CascadeScope - 分析读取范围
// ==========================================
// 执行时在同一事务内重新读取该范围,revision 不一致即拒绝写入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeScope {
    pub driver_ids: Vec<String>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

// ==========================================
// CascadeAnalysis - 影响分析结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeAnalysis {
    pub request: CascadeRequest,
    pub previous_driver_id: String,
    pub new_driver_id: Option<String>,
    pub affected: Vec<AffectedAssignment>,
    pub feasibility: CascadeFeasibility,
    pub scope: CascadeScope,
    /// 分析时读取到的 scope 内全部分配的 revision(执行时做乐观锁校验)
    pub observed_revisions: HashMap<String, i32>,
}

impl CascadeAnalysis {
    pub fn is_blocked(&self) -> bool {
        self.feasibility == CascadeFeasibility::Blocked
    }

    /// 受影响分配ID集合(排序后,便于比较)
    pub fn affected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .affected
            .iter()
            .map(|a| a.assignment_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

// ==========================================
// CascadeResult - 执行结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub analysis: CascadeAnalysis,
    pub updated_assignment_ids: Vec<String>,
}

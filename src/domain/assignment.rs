// ==========================================
// 司机排班调度系统 - 分配记录
// ==========================================
// 职责: Assignment 实体、校验摘要、班次联结视图
// 红线: violation 状态的分配永远不能以 active 落库
// ==========================================

use crate::domain::subject::AssignmentSubject;
use crate::domain::types::ValidationStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ValidationMetrics - 合规度量
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// 窗口内累计工时(含本次班次)
    pub hours_used: f64,
    pub max_hours: f64,
    pub window_hours: f64,
    /// 预警阈值 = max_hours * warning_ratio
    pub warning_threshold: f64,
    /// 与上一班次结束的间隔(小时)
    pub rest_gap_hours: Option<f64>,
    /// 与下一班次开始的间隔(小时)
    pub next_rest_gap_hours: Option<f64>,
}

// ==========================================
// ValidationSummary - 校验摘要(随分配持久化)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub messages: Vec<String>,
    pub metrics: ValidationMetrics,
}

// ==========================================
// Assignment - 司机与班次的分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: String,
    pub tenant_id: String,
    pub driver_id: String,
    pub subject_id: String,
    pub assigned_at: NaiveDateTime,
    pub is_active: bool,
    pub validation_status: ValidationStatus,
    pub validation_summary: ValidationSummary,
    /// 乐观锁版本号
    pub revision: i32,
}

impl Assignment {
    /// 新建一条 active 分配(revision 从 1 开始)
    pub fn new_active(
        tenant_id: &str,
        driver_id: &str,
        subject_id: &str,
        assigned_at: NaiveDateTime,
        validation_status: ValidationStatus,
        validation_summary: ValidationSummary,
    ) -> Self {
        Self {
            assignment_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            driver_id: driver_id.to_string(),
            subject_id: subject_id.to_string(),
            assigned_at,
            is_active: true,
            validation_status,
            validation_summary,
            revision: 1,
        }
    }
}

// ==========================================
// AssignmentWrite - 批量写入指令(级联执行)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AssignmentWrite {
    /// 改派司机并写入新的校验结果
    Move {
        assignment_id: String,
        expected_revision: i32,
        driver_id: String,
        validation_status: ValidationStatus,
        validation_summary: ValidationSummary,
    },
    /// 仅刷新校验结果
    Revalidate {
        assignment_id: String,
        expected_revision: i32,
        validation_status: ValidationStatus,
        validation_summary: ValidationSummary,
    },
    /// 取消分配
    Deactivate {
        assignment_id: String,
        expected_revision: i32,
    },
}

impl AssignmentWrite {
    pub fn assignment_id(&self) -> &str {
        match self {
            AssignmentWrite::Move { assignment_id, .. }
            | AssignmentWrite::Revalidate { assignment_id, .. }
            | AssignmentWrite::Deactivate { assignment_id, .. } => assignment_id,
        }
    }
}

// ==========================================
// AssignmentWithSubject - 分配 + 班次联结
// ==========================================
// 用途: 窗口工时、工作负荷、级联分析均需要班次时长与日期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentWithSubject {
    pub assignment: Assignment,
    pub subject: AssignmentSubject,
}

impl AssignmentWithSubject {
    pub fn assignment_id(&self) -> &str {
        &self.assignment.assignment_id
    }

    pub fn driver_id(&self) -> &str {
        &self.assignment.driver_id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject.subject_id
    }

    pub fn is_active(&self) -> bool {
        self.assignment.is_active
    }
}

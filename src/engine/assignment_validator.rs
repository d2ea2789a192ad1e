// ==========================================
// 司机排班调度系统 - 分配校验器
// ==========================================
// 职责: 组合 HOS 合规 + 保护规则 + 班次占用冲突,给出是否可分配
// 入口: 新建/改派/重校验/自动排班的唯一校验关口
// 红线: 纯函数(同样输入 → 同样输出),无 I/O 操作
//       warning 不阻断,violation 阻断
// ==========================================

use crate::domain::assignment::{AssignmentWithSubject, ValidationMetrics, ValidationSummary};
use crate::domain::driver::{Driver, ProtectedRule};
use crate::domain::subject::AssignmentSubject;
use crate::domain::types::ValidationStatus;
use crate::engine::hos::{ComplianceRules, HosComplianceCalculator};
use crate::engine::protected_rule::ProtectedRuleValidator;
use serde::{Deserialize, Serialize};

// ==========================================
// ValidationResult - 合并后的合规结论
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub messages: Vec<String>,
    pub metrics: ValidationMetrics,
}

// ==========================================
// ValidationOutcome - 校验输出
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub can_assign: bool,
    pub validation_result: ValidationResult,
    pub protected_rule_violations: Vec<String>,
    pub protected_rule_warnings: Vec<String>,
    /// 占用同一班次的其他有效分配ID
    pub conflicting_assignments: Vec<String>,
}

impl ValidationOutcome {
    pub fn status(&self) -> ValidationStatus {
        self.validation_result.status
    }

    /// 持久化用摘要
    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            messages: self.validation_result.messages.clone(),
            metrics: self.validation_result.metrics.clone(),
        }
    }

    pub fn has_conflict(&self) -> bool {
        !self.conflicting_assignments.is_empty()
    }
}

// ==========================================
// AssignmentValidator - 分配校验器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct AssignmentValidator {
    hos: HosComplianceCalculator,
}

impl AssignmentValidator {
    pub fn new(rules: ComplianceRules) -> Self {
        Self {
            hos: HosComplianceCalculator::new(rules),
        }
    }

    pub fn rules(&self) -> &ComplianceRules {
        self.hos.rules()
    }

    /// 校验 (司机, 班次) 组合
    ///
    /// # 参数
    /// - driver: 拟分配司机
    /// - subject: 拟分配班次
    /// - existing: 司机已有分配(可包含其他司机的记录,内部按 driver_id 过滤)
    /// - protected_rules: 保护规则(内部按 driver_id 过滤)
    /// - all_assignments: 用于班次占用检查的分配集合
    /// - exclude_assignment_id: 正在修改的分配(从工时集合和冲突集合中剔除)
    ///
    /// # 规则
    /// 1. HOS 窗口工时 + 休息间隔(见 HosComplianceCalculator)
    /// 2. 保护规则: violations 阻断,warnings 仅提示
    /// 3. 班次已被其他有效分配占用 → violation
    /// 4. can_assign = 最终状态不是 violation
    pub fn validate_assignment(
        &self,
        driver: &Driver,
        subject: &AssignmentSubject,
        existing: &[AssignmentWithSubject],
        protected_rules: &[ProtectedRule],
        all_assignments: &[AssignmentWithSubject],
        exclude_assignment_id: Option<&str>,
    ) -> ValidationOutcome {
        let is_excluded =
            |aws: &AssignmentWithSubject| exclude_assignment_id == Some(aws.assignment_id());

        // 1. HOS 合规
        let driver_shifts: Vec<&AssignmentSubject> = existing
            .iter()
            .filter(|aws| aws.is_active())
            .filter(|aws| aws.driver_id() == driver.driver_id)
            .filter(|aws| !is_excluded(aws))
            .map(|aws| &aws.subject)
            .collect();
        let hos = self.hos.calculate(subject, &driver_shifts);

        let mut status = hos.status;
        let mut messages = hos.messages;

        // 2. 保护规则
        let rules: Vec<&ProtectedRule> = protected_rules
            .iter()
            .filter(|r| r.driver_id == driver.driver_id)
            .collect();
        let protected = ProtectedRuleValidator::check_all(
            &rules,
            subject.day_of_week(),
            subject.solo_type,
            subject.start_time(),
        );

        if !protected.passed {
            status = ValidationStatus::Violation;
        } else if !protected.warnings.is_empty() {
            status = status.max(ValidationStatus::Warning);
        }
        messages.extend(protected.violations.iter().cloned());
        messages.extend(protected.warnings.iter().cloned());

        // 3. 班次占用冲突
        let conflicting: Vec<&AssignmentWithSubject> = all_assignments
            .iter()
            .filter(|aws| aws.is_active())
            .filter(|aws| aws.subject_id() == subject.subject_id)
            .filter(|aws| !is_excluded(aws))
            .collect();

        for other in &conflicting {
            status = ValidationStatus::Violation;
            messages.push(format!(
                "SUBJECT_ALREADY_ASSIGNED: subject {} is already assigned to driver {} (assignment {})",
                subject.subject_id,
                other.driver_id(),
                other.assignment_id()
            ));
        }

        ValidationOutcome {
            can_assign: !status.is_blocking(),
            validation_result: ValidationResult {
                status,
                messages,
                metrics: hos.metrics,
            },
            protected_rule_violations: protected.violations,
            protected_rule_warnings: protected.warnings,
            conflicting_assignments: conflicting
                .iter()
                .map(|aws| aws.assignment_id().to_string())
                .collect(),
        }
    }
}

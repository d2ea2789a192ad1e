// ==========================================
// 司机排班调度系统 - 级联影响分析
// ==========================================
// 职责: 改派/互换/取消分配之前,模拟变更并找出状态会变化的分配
// 范围: 仅前任司机与新司机的有效分配,且合规窗口与变更时段重叠
//       窗口 = [start - window_hours, end + min_rest_hours]
// 红线: 分析为纯函数;任一受影响分配变为 violation → blocked
// ==========================================

use crate::domain::assignment::{AssignmentWithSubject, AssignmentWrite};
use crate::domain::cascade::{
    AffectedAssignment, CascadeAction, CascadeAnalysis, CascadeFeasibility, CascadeRequest,
    CascadeScope,
};
use crate::domain::driver::{Driver, ProtectedRule};
use crate::domain::subject::AssignmentSubject;
use crate::domain::types::ValidationStatus;
use crate::engine::assignment_validator::{AssignmentValidator, ValidationOutcome};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument};

/// 级联请求本身不成立(与规则结论无关)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeInputError {
    #[error("assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("assignment {0} is not active")]
    InactiveAssignment(String),

    #[error("invalid cascade request: {0}")]
    InvalidRequest(String),
}

/// 分析所需的状态快照(由调用方按 CascadeScope 读取)
#[derive(Debug, Clone, Default)]
pub struct CascadeSnapshot {
    pub drivers: Vec<Driver>,
    pub protected_rules: Vec<ProtectedRule>,
    /// scope 内全部有效分配
    pub assignments: Vec<AssignmentWithSubject>,
}

// ==========================================
// CascadeEffectAnalyzer - 级联影响分析器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CascadeEffectAnalyzer {
    validator: AssignmentValidator,
}

impl CascadeEffectAnalyzer {
    pub fn new(validator: AssignmentValidator) -> Self {
        Self { validator }
    }

    /// 计算分析需要读取的范围
    ///
    /// 变更班次的服务日期向前后各扩展两个最长窗口,
    /// 保证受影响分配自身的合规上下文也在快照内
    pub fn scope_for(&self, changed: &[&AssignmentSubject], driver_ids: &[String]) -> CascadeScope {
        let window_days = (self.validator.rules().max_window_hours() / 24.0).ceil() as i64;
        let reach = Duration::days(window_days * 2 + 2);

        let min_date = changed.iter().map(|s| s.service_date).min();
        let max_date = changed.iter().map(|s| s.service_date).max();
        let (from_date, to_date) = match (min_date, max_date) {
            (Some(min), Some(max)) => (min - reach, max + reach),
            _ => (NaiveDate::MIN, NaiveDate::MAX),
        };

        let mut ids = driver_ids.to_vec();
        ids.sort();
        ids.dedup();

        CascadeScope {
            driver_ids: ids,
            from_date,
            to_date,
        }
    }

    /// 分析级联影响
    ///
    /// # 流程
    /// 1. 在快照上应用假设动作(改派 / 互换 / 取消)
    /// 2. 直接变更的分配: 当前状态 vs 假设状态各校验一次
    /// 3. 前任/新司机的其他分配: 合规窗口与变更时段重叠者重新校验,状态变化才列出
    /// 4. 任一 after_status = violation → blocked
    #[instrument(skip_all, fields(
        origin = %request.origin_assignment_id,
        action = request.action.as_str()
    ))]
    pub fn analyze(
        &self,
        request: &CascadeRequest,
        scope: CascadeScope,
        snapshot: &CascadeSnapshot,
    ) -> Result<CascadeAnalysis, CascadeInputError> {
        let origin = find_active(&snapshot.assignments, &request.origin_assignment_id)?;
        let previous_driver_id = origin.driver_id().to_string();

        // 1. 假设状态
        let mut hypothetical = snapshot.assignments.clone();
        let mut direct_ids = vec![origin.assignment_id().to_string()];
        let new_driver_id: Option<String>;

        match &request.action {
            CascadeAction::Reassign { target_driver_id } => {
                if *target_driver_id == previous_driver_id {
                    return Err(CascadeInputError::InvalidRequest(format!(
                        "assignment {} already belongs to driver {}",
                        origin.assignment_id(),
                        target_driver_id
                    )));
                }
                find_driver(&snapshot.drivers, target_driver_id)?;
                set_driver(&mut hypothetical, origin.assignment_id(), target_driver_id);
                new_driver_id = Some(target_driver_id.clone());
            }
            CascadeAction::Swap {
                other_assignment_id,
            } => {
                let other = find_active(&snapshot.assignments, other_assignment_id)?;
                if other.driver_id() == previous_driver_id {
                    return Err(CascadeInputError::InvalidRequest(format!(
                        "assignments {} and {} belong to the same driver",
                        origin.assignment_id(),
                        other.assignment_id()
                    )));
                }
                set_driver(&mut hypothetical, origin.assignment_id(), other.driver_id());
                set_driver(&mut hypothetical, other.assignment_id(), &previous_driver_id);
                direct_ids.push(other.assignment_id().to_string());
                new_driver_id = Some(other.driver_id().to_string());
            }
            CascadeAction::Unassign => {
                hypothetical.retain(|aws| aws.assignment_id() != origin.assignment_id());
                new_driver_id = None;
            }
        }

        let changed: Vec<(NaiveDateTime, NaiveDateTime)> = snapshot
            .assignments
            .iter()
            .filter(|aws| direct_ids.iter().any(|id| id == aws.assignment_id()))
            .map(|aws| (aws.subject.start_at, aws.subject.end_at))
            .collect();

        let mut involved: Vec<&str> = vec![previous_driver_id.as_str()];
        if let Some(id) = new_driver_id.as_deref() {
            involved.push(id);
        }

        let mut affected = Vec::new();

        // 2. 直接变更
        for id in &direct_ids {
            let before_aws = find_active(&snapshot.assignments, id)?;
            let before = self.revalidate(before_aws, &snapshot.assignments, snapshot)?;

            match hypothetical.iter().find(|aws| aws.assignment_id() == id) {
                Some(after_aws) => {
                    let after = self.revalidate(after_aws, &hypothetical, snapshot)?;
                    affected.push(AffectedAssignment {
                        assignment_id: id.clone(),
                        driver_id: after_aws.driver_id().to_string(),
                        before_status: before.status(),
                        after_status: Some(after.status()),
                        is_direct: true,
                        description: format!(
                            "{} moves from {} to {}: {} -> {}{}",
                            after_aws.subject_id(),
                            before_aws.driver_id(),
                            after_aws.driver_id(),
                            before.status(),
                            after.status(),
                            detail(&after)
                        ),
                        after_summary: Some(after.summary()),
                    });
                }
                None => affected.push(AffectedAssignment {
                    assignment_id: id.clone(),
                    driver_id: before_aws.driver_id().to_string(),
                    before_status: before.status(),
                    after_status: None,
                    is_direct: true,
                    description: format!(
                        "{} is released from {}",
                        before_aws.subject_id(),
                        before_aws.driver_id()
                    ),
                    after_summary: None,
                }),
            }
        }

        // 3. 连带影响
        let rules = self.validator.rules();
        for neighbour in snapshot.assignments.iter().filter(|aws| {
            !direct_ids.iter().any(|id| id == aws.assignment_id())
                && involved.contains(&aws.driver_id())
        }) {
            let (horizon_start, horizon_end) = rules.compliance_horizon(&neighbour.subject);
            let touched = changed
                .iter()
                .any(|(start, end)| *start < horizon_end && *end > horizon_start);
            if !touched {
                continue;
            }

            let before = self.revalidate(neighbour, &snapshot.assignments, snapshot)?;
            let after = self.revalidate(neighbour, &hypothetical, snapshot)?;
            if before.status() == after.status() {
                continue;
            }

            affected.push(AffectedAssignment {
                assignment_id: neighbour.assignment_id().to_string(),
                driver_id: neighbour.driver_id().to_string(),
                before_status: before.status(),
                after_status: Some(after.status()),
                is_direct: false,
                description: format!(
                    "{} for {} changes {} -> {}{}",
                    neighbour.subject_id(),
                    neighbour.driver_id(),
                    before.status(),
                    after.status(),
                    detail(&after)
                ),
                after_summary: Some(after.summary()),
            });
        }

        // 4. 可行性
        let feasibility = if affected
            .iter()
            .any(|a| a.after_status == Some(ValidationStatus::Violation))
        {
            CascadeFeasibility::Blocked
        } else {
            CascadeFeasibility::Ok
        };

        let observed_revisions: HashMap<String, i32> = snapshot
            .assignments
            .iter()
            .map(|aws| (aws.assignment_id().to_string(), aws.assignment.revision))
            .collect();

        debug!(
            affected = affected.len(),
            feasibility = ?feasibility,
            "级联影响分析完成"
        );

        Ok(CascadeAnalysis {
            request: request.clone(),
            previous_driver_id,
            new_driver_id,
            affected,
            feasibility,
            scope,
            observed_revisions,
        })
    }

    /// 将分析结果转换为批量写入指令
    pub fn plan_writes(analysis: &CascadeAnalysis) -> Vec<AssignmentWrite> {
        analysis
            .affected
            .iter()
            .map(|a| {
                let expected_revision = analysis
                    .observed_revisions
                    .get(&a.assignment_id)
                    .copied()
                    .unwrap_or_default();
                match (a.is_direct, a.after_status) {
                    (_, None) => AssignmentWrite::Deactivate {
                        assignment_id: a.assignment_id.clone(),
                        expected_revision,
                    },
                    (true, Some(status)) => AssignmentWrite::Move {
                        assignment_id: a.assignment_id.clone(),
                        expected_revision,
                        driver_id: a.driver_id.clone(),
                        validation_status: status,
                        validation_summary: a.after_summary.clone().unwrap_or_default(),
                    },
                    (false, Some(status)) => AssignmentWrite::Revalidate {
                        assignment_id: a.assignment_id.clone(),
                        expected_revision,
                        validation_status: status,
                        validation_summary: a.after_summary.clone().unwrap_or_default(),
                    },
                }
            })
            .collect()
    }

    /// 在给定状态下重新校验一条分配(排除自身)
    fn revalidate(
        &self,
        target: &AssignmentWithSubject,
        state: &[AssignmentWithSubject],
        snapshot: &CascadeSnapshot,
    ) -> Result<ValidationOutcome, CascadeInputError> {
        let driver = find_driver(&snapshot.drivers, target.driver_id())?;
        Ok(self.validator.validate_assignment(
            driver,
            &target.subject,
            state,
            &snapshot.protected_rules,
            state,
            Some(target.assignment_id()),
        ))
    }
}

fn find_active<'a>(
    assignments: &'a [AssignmentWithSubject],
    assignment_id: &str,
) -> Result<&'a AssignmentWithSubject, CascadeInputError> {
    let found = assignments
        .iter()
        .find(|aws| aws.assignment_id() == assignment_id)
        .ok_or_else(|| CascadeInputError::AssignmentNotFound(assignment_id.to_string()))?;
    if !found.is_active() {
        return Err(CascadeInputError::InactiveAssignment(assignment_id.to_string()));
    }
    Ok(found)
}

fn find_driver<'a>(drivers: &'a [Driver], driver_id: &str) -> Result<&'a Driver, CascadeInputError> {
    drivers
        .iter()
        .find(|d| d.driver_id == driver_id)
        .ok_or_else(|| CascadeInputError::DriverNotFound(driver_id.to_string()))
}

fn set_driver(state: &mut [AssignmentWithSubject], assignment_id: &str, driver_id: &str) {
    if let Some(aws) = state.iter_mut().find(|aws| aws.assignment_id() == assignment_id) {
        aws.assignment.driver_id = driver_id.to_string();
    }
}

fn detail(outcome: &ValidationOutcome) -> String {
    if outcome.validation_result.messages.is_empty() {
        String::new()
    } else {
        format!(" ({})", outcome.validation_result.messages.join("; "))
    }
}

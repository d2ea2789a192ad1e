// ==========================================
// 司机排班调度系统 - 分配 API
// ==========================================
// 职责: 新建/改派/取消/重校验分配,换班候选,周负荷
// 流程: 读取上下文 → AssignmentValidator → (通过) 仓储写入
// 红线: violation 结论不写入;班次占用以仓储事务为准
// ==========================================

use crate::api::error::{config_error, ApiError, ApiResult};
use crate::config::DispatchConfigReader;
use crate::domain::assignment::{Assignment, AssignmentWithSubject};
use crate::domain::driver::Driver;
use crate::domain::subject::AssignmentSubject;
use crate::domain::workload::WorkloadSummary;
use crate::engine::assignment_validator::{AssignmentValidator, ValidationOutcome};
use crate::engine::hos::ComplianceRules;
use crate::engine::swap_finder::{RankedCandidate, SwapCandidateFinder};
use crate::engine::workload::{week_start_for, WorkloadCalculator};
use crate::repository::{AssignmentRepository, DriverRepository, SubjectRepository};
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 写入成功后的返回
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentWriteResult {
    pub assignment: AssignmentWithSubject,
    pub outcome: ValidationOutcome,
}

/// 校验所需的司机分配读取范围 [from, to](按服务日期)
///
/// 向前覆盖工时窗口,向后覆盖下一班次的休息间隔
pub(crate) fn validation_range(rules: &ComplianceRules, subject: &AssignmentSubject) -> (NaiveDate, NaiveDate) {
    let rest_days = (rules.min_rest_hours / 24.0).ceil() as i64 + 1;
    (
        rules.lookback_start_date(subject),
        subject.end_at.date() + Duration::days(rest_days),
    )
}

// ==========================================
// AssignmentApi - 分配 API
// ==========================================
pub struct AssignmentApi {
    driver_repo: Arc<DriverRepository>,
    subject_repo: Arc<SubjectRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    config: Arc<dyn DispatchConfigReader>,
}

impl AssignmentApi {
    pub fn new(
        driver_repo: Arc<DriverRepository>,
        subject_repo: Arc<SubjectRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        config: Arc<dyn DispatchConfigReader>,
    ) -> Self {
        Self {
            driver_repo,
            subject_repo,
            assignment_repo,
            config,
        }
    }

    async fn validator(&self) -> ApiResult<AssignmentValidator> {
        let rules = self.config.get_compliance_rules().await.map_err(config_error)?;
        Ok(AssignmentValidator::new(rules))
    }

    fn load_driver(&self, driver_id: &str) -> ApiResult<Driver> {
        self.driver_repo
            .find_by_id(driver_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Driver(id={})不存在", driver_id)))
    }

    /// 读取同租户司机(跨租户视为不存在)
    fn load_tenant_driver(&self, driver_id: &str, subject: &AssignmentSubject) -> ApiResult<Driver> {
        let driver = self.load_driver(driver_id)?;
        if driver.tenant_id != subject.tenant_id {
            return Err(ApiError::NotFound(format!(
                "Driver(id={})不存在于租户{}",
                driver_id, subject.tenant_id
            )));
        }
        Ok(driver)
    }

    /// 写入前的资格门槛: 在岗且可承接该班次类型
    fn load_eligible_driver(&self, driver_id: &str, subject: &AssignmentSubject) -> ApiResult<Driver> {
        let driver = self.load_tenant_driver(driver_id, subject)?;
        if !driver.is_active() {
            return Err(ApiError::InvalidInput(format!("司机{}不在岗", driver_id)));
        }
        if !driver.is_eligible_for(subject.solo_type) {
            return Err(ApiError::InvalidInput(format!(
                "司机{}不可承接{}班次",
                driver_id, subject.solo_type
            )));
        }
        Ok(driver)
    }

    fn load_subject(&self, subject_id: &str) -> ApiResult<AssignmentSubject> {
        self.subject_repo
            .find_by_id(subject_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Subject(id={})不存在", subject_id)))
    }

    fn load_assignment(&self, assignment_id: &str) -> ApiResult<AssignmentWithSubject> {
        self.assignment_repo
            .find_with_subject_by_id(assignment_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Assignment(id={})不存在", assignment_id)))
    }

    /// 读取上下文并执行校验
    fn run_validation(
        &self,
        validator: &AssignmentValidator,
        driver: &Driver,
        subject: &AssignmentSubject,
        exclude_assignment_id: Option<&str>,
    ) -> ApiResult<ValidationOutcome> {
        let (from, to) = validation_range(validator.rules(), subject);
        let existing = self
            .assignment_repo
            .find_active_by_driver_and_date_range(&driver.driver_id, from, to)?;
        let rules = self.driver_repo.find_rules_by_driver(&driver.driver_id)?;

        let holders: Vec<AssignmentWithSubject> = match self
            .assignment_repo
            .find_active_by_subject(&subject.subject_id)?
        {
            Some(holder) => self
                .assignment_repo
                .find_with_subject_by_id(&holder.assignment_id)?
                .into_iter()
                .collect(),
            None => Vec::new(),
        };

        Ok(validator.validate_assignment(
            driver,
            subject,
            &existing,
            &rules,
            &holders,
            exclude_assignment_id,
        ))
    }

    /// 校验但不写入
    pub async fn validate_assignment(
        &self,
        driver_id: &str,
        subject_id: &str,
        exclude_assignment_id: Option<&str>,
    ) -> ApiResult<ValidationOutcome> {
        let validator = self.validator().await?;
        let subject = self.load_subject(subject_id)?;
        let driver = self.load_tenant_driver(driver_id, &subject)?;
        self.run_validation(&validator, &driver, &subject, exclude_assignment_id)
    }

    /// 新建分配
    ///
    /// # 返回
    /// - Err(SubjectConflict): 班次已有有效分配(含并发写入时落败)
    /// - Err(AssignmentRejected): 校验为 violation
    /// - Err(InvalidInput): 司机不在岗或不可承接该班次类型
    #[instrument(skip(self))]
    pub async fn create_assignment(
        &self,
        driver_id: &str,
        subject_id: &str,
    ) -> ApiResult<AssignmentWriteResult> {
        let validator = self.validator().await?;
        let subject = self.load_subject(subject_id)?;
        let driver = self.load_eligible_driver(driver_id, &subject)?;
        let outcome = self.run_validation(&validator, &driver, &subject, None)?;

        if let Some(holder) = outcome.conflicting_assignments.first() {
            return Err(ApiError::SubjectConflict {
                subject_id: subject.subject_id.clone(),
                assignment_id: holder.clone(),
            });
        }
        if !outcome.can_assign {
            return Err(ApiError::AssignmentRejected {
                outcome: Box::new(outcome),
            });
        }

        let assignment = Assignment::new_active(
            &subject.tenant_id,
            &driver.driver_id,
            &subject.subject_id,
            Local::now().naive_local(),
            outcome.status(),
            outcome.summary(),
        );
        self.assignment_repo.insert_active(&assignment)?;

        info!(
            assignment_id = %assignment.assignment_id,
            status = %outcome.status(),
            "分配已创建"
        );
        Ok(AssignmentWriteResult {
            assignment: AssignmentWithSubject { assignment, subject },
            outcome,
        })
    }

    /// 改派分配到另一名司机(排除自身后完整重校验)
    #[instrument(skip(self))]
    pub async fn update_assignment(
        &self,
        assignment_id: &str,
        expected_revision: i32,
        new_driver_id: &str,
    ) -> ApiResult<AssignmentWriteResult> {
        let validator = self.validator().await?;
        let current = self.load_assignment(assignment_id)?;
        if !current.is_active() {
            return Err(ApiError::InvalidInput(format!("分配{}已取消", assignment_id)));
        }
        let driver = self.load_eligible_driver(new_driver_id, &current.subject)?;
        let outcome = self.run_validation(&validator, &driver, &current.subject, Some(assignment_id))?;

        if !outcome.can_assign {
            return Err(ApiError::AssignmentRejected {
                outcome: Box::new(outcome),
            });
        }

        let assignment = self.assignment_repo.reassign(
            assignment_id,
            expected_revision,
            &driver.driver_id,
            outcome.status(),
            outcome.summary(),
        )?;

        info!(
            assignment_id,
            from = %current.driver_id(),
            to = %driver.driver_id,
            status = %outcome.status(),
            "分配已改派"
        );
        Ok(AssignmentWriteResult {
            assignment: AssignmentWithSubject {
                assignment,
                subject: current.subject,
            },
            outcome,
        })
    }

    /// 按当前状态重新校验并刷新结论
    ///
    /// 结论为 violation 时不写入,返回 AssignmentRejected 由调用方处理(改派或取消)
    pub async fn revalidate_assignment(
        &self,
        assignment_id: &str,
        expected_revision: i32,
    ) -> ApiResult<AssignmentWriteResult> {
        let validator = self.validator().await?;
        let current = self.load_assignment(assignment_id)?;
        if !current.is_active() {
            return Err(ApiError::InvalidInput(format!("分配{}已取消", assignment_id)));
        }
        let driver = self.load_driver(current.driver_id())?;
        let outcome = self.run_validation(&validator, &driver, &current.subject, Some(assignment_id))?;

        if !outcome.can_assign {
            warn!(assignment_id, "重校验结论为 violation,未写入");
            return Err(ApiError::AssignmentRejected {
                outcome: Box::new(outcome),
            });
        }

        let assignment = self.assignment_repo.revalidate(
            assignment_id,
            expected_revision,
            outcome.status(),
            outcome.summary(),
        )?;
        Ok(AssignmentWriteResult {
            assignment: AssignmentWithSubject {
                assignment,
                subject: current.subject,
            },
            outcome,
        })
    }

    /// 取消分配(释放班次)
    pub fn delete_assignment(&self, assignment_id: &str, expected_revision: i32) -> ApiResult<Assignment> {
        let assignment = self.assignment_repo.deactivate(assignment_id, expected_revision)?;
        info!(assignment_id, subject_id = %assignment.subject_id, "分配已取消");
        Ok(assignment)
    }

    /// 换班候选
    pub async fn find_swap_candidates(&self, subject_id: &str) -> ApiResult<Vec<RankedCandidate>> {
        let validator = self.validator().await?;
        let thresholds = self.config.get_workload_thresholds().await.map_err(config_error)?;
        let subject = self.load_subject(subject_id)?;

        // 周负荷与合规回溯的并集
        let week_start = week_start_for(subject.service_date);
        let (lookback_from, lookahead_to) = validation_range(validator.rules(), &subject);
        let from = lookback_from.min(week_start);
        let to = lookahead_to.max(week_start + Duration::days(6));

        let drivers = self.driver_repo.find_by_tenant(&subject.tenant_id)?;
        let assignments = self
            .assignment_repo
            .find_active_by_tenant_and_date_range(&subject.tenant_id, from, to)?;
        let rules = self.driver_repo.find_rules_by_tenant(&subject.tenant_id)?;

        let finder = SwapCandidateFinder::new(validator, WorkloadCalculator::new(thresholds));
        Ok(finder.find_swap_candidates(&subject, &drivers, &assignments, &rules))
    }

    /// 租户全部司机的周负荷(负荷升序)
    pub async fn get_all_driver_workloads(
        &self,
        tenant_id: &str,
        week_start: NaiveDate,
    ) -> ApiResult<Vec<WorkloadSummary>> {
        let thresholds = self.config.get_workload_thresholds().await.map_err(config_error)?;
        let drivers = self.driver_repo.find_by_tenant(tenant_id)?;
        let assignments = self.assignment_repo.find_active_by_tenant_and_date_range(
            tenant_id,
            week_start,
            week_start + Duration::days(6),
        )?;
        Ok(WorkloadCalculator::new(thresholds).get_all_driver_workloads(&drivers, week_start, &assignments))
    }
}

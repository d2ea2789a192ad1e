// ==========================================
// 司机排班调度系统 - 级联变更 API
// ==========================================
// 职责: 改派/互换/取消分配前的影响分析,以及原子执行
// 执行:
// 1. 按同一 scope 重新读取并重新分析
// 2. blocked → InfeasibleCascade,不写入
// 3. apply_batch: 同一事务内校验 scope revision 并写入全部变更
// ==========================================

use crate::api::error::{config_error, ApiError, ApiResult};
use crate::config::DispatchConfigReader;
use crate::domain::assignment::AssignmentWithSubject;
use crate::domain::cascade::{CascadeAction, CascadeAnalysis, CascadeRequest, CascadeResult};
use crate::domain::driver::Driver;
use crate::domain::subject::AssignmentSubject;
use crate::engine::assignment_validator::AssignmentValidator;
use crate::engine::cascade::{CascadeEffectAnalyzer, CascadeSnapshot};
use crate::repository::{AssignmentRepository, DriverRepository};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct CascadeApi {
    driver_repo: Arc<DriverRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    config: Arc<dyn DispatchConfigReader>,
}

impl CascadeApi {
    pub fn new(
        driver_repo: Arc<DriverRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        config: Arc<dyn DispatchConfigReader>,
    ) -> Self {
        Self {
            driver_repo,
            assignment_repo,
            config,
        }
    }

    fn load_active(&self, tenant_id: &str, assignment_id: &str) -> ApiResult<AssignmentWithSubject> {
        let aws = self
            .assignment_repo
            .find_with_subject_by_id(assignment_id)?
            .filter(|aws| aws.assignment.tenant_id == tenant_id)
            .ok_or_else(|| ApiError::NotFound(format!("Assignment(id={})不存在", assignment_id)))?;
        if !aws.is_active() {
            return Err(ApiError::InvalidInput(format!("分配{}已取消", assignment_id)));
        }
        Ok(aws)
    }

    /// 变更后的承接司机: 同租户、在岗、可承接该班次类型
    fn load_eligible_driver(
        &self,
        tenant_id: &str,
        driver_id: &str,
        subject: &AssignmentSubject,
    ) -> ApiResult<Driver> {
        let driver = self
            .driver_repo
            .find_by_id(driver_id)?
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or_else(|| ApiError::NotFound(format!("Driver(id={})不存在于租户{}", driver_id, tenant_id)))?;
        if !driver.is_active() || !driver.is_eligible_for(subject.solo_type) {
            return Err(ApiError::InvalidInput(format!(
                "司机{}不可承接班次{}({})",
                driver_id, subject.subject_id, subject.solo_type
            )));
        }
        Ok(driver)
    }

    /// 分析级联影响(只读)
    #[instrument(skip_all, fields(origin = %request.origin_assignment_id, action = request.action.as_str()))]
    pub async fn analyze(&self, request: &CascadeRequest) -> ApiResult<CascadeAnalysis> {
        let rules = self.config.get_compliance_rules().await.map_err(config_error)?;
        let analyzer = CascadeEffectAnalyzer::new(AssignmentValidator::new(rules));

        let origin = self.load_active(&request.tenant_id, &request.origin_assignment_id)?;
        let mut changed = vec![origin.subject.clone()];
        let mut driver_ids = vec![origin.driver_id().to_string()];

        match &request.action {
            CascadeAction::Reassign { target_driver_id } => {
                self.load_eligible_driver(&request.tenant_id, target_driver_id, &origin.subject)?;
                driver_ids.push(target_driver_id.clone());
            }
            CascadeAction::Swap {
                other_assignment_id,
            } => {
                let other = self.load_active(&request.tenant_id, other_assignment_id)?;
                // 互换后双方都要能承接对方的班次
                self.load_eligible_driver(&request.tenant_id, other.driver_id(), &origin.subject)?;
                self.load_eligible_driver(&request.tenant_id, origin.driver_id(), &other.subject)?;
                driver_ids.push(other.driver_id().to_string());
                changed.push(other.subject);
            }
            CascadeAction::Unassign => {}
        }

        let changed_refs: Vec<_> = changed.iter().collect();
        let scope = analyzer.scope_for(&changed_refs, &driver_ids);
        let snapshot = CascadeSnapshot {
            drivers: self.driver_repo.find_by_ids(&scope.driver_ids)?,
            protected_rules: self.driver_repo.find_rules_by_drivers(&scope.driver_ids)?,
            assignments: self.assignment_repo.find_active_in_scope(&scope)?,
        };

        Ok(analyzer.analyze(request, scope, &snapshot)?)
    }

    /// 执行级联变更
    ///
    /// # 返回
    /// - Err(InfeasibleCascade): 变更会产生 violation,未写入
    /// - Err(OptimisticLockFailure): 分析之后 scope 内分配被修改,整体回滚
    #[instrument(skip_all, fields(origin = %request.origin_assignment_id, action = request.action.as_str()))]
    pub async fn execute(&self, request: &CascadeRequest) -> ApiResult<CascadeResult> {
        let analysis = self.analyze(request).await?;
        if analysis.is_blocked() {
            warn!(affected = analysis.affected.len(), "级联变更不可行,拒绝执行");
            return Err(ApiError::InfeasibleCascade {
                analysis: Box::new(analysis),
            });
        }

        let writes = CascadeEffectAnalyzer::plan_writes(&analysis);
        let updated_assignment_ids =
            self.assignment_repo
                .apply_batch(&analysis.scope, &analysis.observed_revisions, &writes)?;

        info!(updated = updated_assignment_ids.len(), "级联变更已执行");
        Ok(CascadeResult {
            analysis,
            updated_assignment_ids,
        })
    }
}

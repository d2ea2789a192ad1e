// ==========================================
// 司机排班调度系统 - 自动排班 API
// ==========================================
// 职责: 为目标周的未分配班次自动选择司机
// 并发: 同一 (tenant, week) 通过 schedule_run_lock 串行化;
//       不同租户/周可并行
// 说明: 已提交的分配在达到 max_iterations 或运行结束后保留(不回滚)
// ==========================================

use crate::api::error::{config_error, ApiError, ApiResult};
use crate::config::DispatchConfigReader;
use crate::domain::assignment::{Assignment, AssignmentWithSubject};
use crate::domain::schedule::{AutoBuildParams, SchedulingResult};
use crate::domain::subject::AssignmentSubject;
use crate::engine::assignment_validator::AssignmentValidator;
use crate::engine::auto_build::{AutoBuildInput, AutoBuildScheduler, CommitOutcome};
use crate::engine::scoring::{HistoricalScoreProvider, ScoreProvider};
use crate::repository::{
    AssignmentRepository, DriverRepository, RepositoryError, ScheduleRunLockRepository,
    SubjectRepository,
};
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 调用方参数(None 使用配置默认值)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildScheduleOptions {
    pub max_iterations: Option<usize>,
    pub min_confidence: Option<f64>,
    /// 显式处理顺序(subject_id 列表)
    pub block_order: Option<Vec<String>>,
}

pub struct ScheduleApi {
    driver_repo: Arc<DriverRepository>,
    subject_repo: Arc<SubjectRepository>,
    assignment_repo: Arc<AssignmentRepository>,
    run_lock_repo: Arc<ScheduleRunLockRepository>,
    config: Arc<dyn DispatchConfigReader>,
}

impl ScheduleApi {
    pub fn new(
        driver_repo: Arc<DriverRepository>,
        subject_repo: Arc<SubjectRepository>,
        assignment_repo: Arc<AssignmentRepository>,
        run_lock_repo: Arc<ScheduleRunLockRepository>,
        config: Arc<dyn DispatchConfigReader>,
    ) -> Self {
        Self {
            driver_repo,
            subject_repo,
            assignment_repo,
            run_lock_repo,
            config,
        }
    }

    /// 自动排班(得分来自目标周之前的历史分配)
    pub async fn build_schedule(
        &self,
        tenant_id: &str,
        week_start: NaiveDate,
        options: BuildScheduleOptions,
    ) -> ApiResult<SchedulingResult> {
        let history = self.assignment_repo.find_history_before(tenant_id, week_start)?;
        let scores = HistoricalScoreProvider::from_history(&history);
        info!(tenant_id, history = history.len(), "历史得分模型已加载");
        self.build_schedule_with_scores(tenant_id, week_start, options, &scores)
            .await
    }

    /// 自动排班(调用方提供得分)
    #[instrument(skip(self, options, scores), fields(run_id = tracing::field::Empty))]
    pub async fn build_schedule_with_scores(
        &self,
        tenant_id: &str,
        week_start: NaiveDate,
        options: BuildScheduleOptions,
        scores: &dyn ScoreProvider,
    ) -> ApiResult<SchedulingResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        self.run_lock_repo.try_acquire(tenant_id, week_start, &run_id)?;
        let result = self
            .run_locked(tenant_id, week_start, &run_id, options, scores)
            .await;
        if let Err(e) = self.run_lock_repo.release(tenant_id, week_start, &run_id) {
            warn!(error = %e, "排班运行锁释放失败");
        }
        result
    }

    async fn run_locked(
        &self,
        tenant_id: &str,
        week_start: NaiveDate,
        run_id: &str,
        options: BuildScheduleOptions,
        scores: &dyn ScoreProvider,
    ) -> ApiResult<SchedulingResult> {
        // 1. 配置
        let rules = self.config.get_compliance_rules().await.map_err(config_error)?;
        let weights = self.config.get_score_weights().await.map_err(config_error)?;
        let params = AutoBuildParams {
            max_iterations: match options.max_iterations {
                Some(v) => v,
                None => self.config.get_default_max_iterations().await.map_err(config_error)?,
            },
            min_confidence: match options.min_confidence {
                Some(v) => v,
                None => self.config.get_default_min_confidence().await.map_err(config_error)?,
            },
            block_order: options.block_order,
            one_block_per_day: self.config.get_one_block_per_day().await.map_err(config_error)?,
        };
        let snapshot = self.config.get_config_snapshot().await.map_err(config_error)?;

        // 2. 输入
        let week_end = week_start + Duration::days(6);
        let blocks = self.load_blocks(tenant_id, week_start, week_end, params.block_order.as_deref())?;
        let drivers = self.driver_repo.find_by_tenant(tenant_id)?;
        let protected_rules = self.driver_repo.find_rules_by_tenant(tenant_id)?;
        let reach = Duration::days((rules.max_window_hours() / 24.0).ceil() as i64 + 1);
        let existing = self.assignment_repo.find_active_by_tenant_and_date_range(
            tenant_id,
            week_start - reach,
            week_end + reach,
        )?;

        info!(
            blocks = blocks.len(),
            drivers = drivers.len(),
            existing = existing.len(),
            "自动排班开始"
        );

        // 3. 逐班次决策,通过的候选立即落库
        let scheduler = AutoBuildScheduler::new(AssignmentValidator::new(rules), weights);
        let input = AutoBuildInput {
            blocks: &blocks,
            drivers: &drivers,
            protected_rules: &protected_rules,
            existing: &existing,
        };
        let repo = self.assignment_repo.clone();
        let run = scheduler.run(input, &params, scores, |driver, block, outcome| {
            let assignment = Assignment::new_active(
                tenant_id,
                &driver.driver_id,
                &block.subject_id,
                Local::now().naive_local(),
                outcome.status(),
                outcome.summary(),
            );
            match repo.insert_active(&assignment) {
                Ok(()) => CommitOutcome::Committed(AssignmentWithSubject {
                    assignment,
                    subject: block.clone(),
                }),
                Err(RepositoryError::SubjectAlreadyAssigned { assignment_id, .. }) => {
                    CommitOutcome::Rejected(format!(
                        "subject {} was assigned concurrently ({})",
                        block.subject_id, assignment_id
                    ))
                }
                Err(e) => CommitOutcome::Rejected(e.to_string()),
            }
        });

        let result = run.into_result(run_id, tenant_id, week_start, Some(snapshot));
        info!(
            assigned = result.assigned,
            skipped = result.skipped,
            failed = result.failed,
            unprocessed = result.unprocessed_block_ids.len(),
            coverage = result.coverage_rate,
            "自动排班完成"
        );
        Ok(result)
    }

    /// 待处理班次: 显式顺序 或 周内未分配班次(按开始时间)
    fn load_blocks(
        &self,
        tenant_id: &str,
        week_start: NaiveDate,
        week_end: NaiveDate,
        block_order: Option<&[String]>,
    ) -> ApiResult<Vec<AssignmentSubject>> {
        match block_order {
            None => Ok(self
                .subject_repo
                .find_unassigned_by_tenant_and_date_range(tenant_id, week_start, week_end)?),
            Some(ids) => ids
                .iter()
                .map(|id| {
                    self.subject_repo
                        .find_by_id(id)?
                        .filter(|s| s.tenant_id == tenant_id)
                        .ok_or_else(|| ApiError::NotFound(format!("Subject(id={})不存在", id)))
                })
                .collect(),
        }
    }
}

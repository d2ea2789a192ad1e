// ==========================================
// 司机排班调度系统 - 自动排班引擎
// ==========================================
// 职责: 为目标周内未分配班次逐个挑选最佳司机
// 流程(每个班次):
// 1. 候选 = 在岗且可承接该班次类型的司机(可选: 当天尚未有班次)
// 2. 分配校验器硬约束过滤(can_assign)
// 3. 综合得分 = ownership * w_o + affinity * w_a,低于 min_confidence 的剔除
// 4. 排序: 综合得分降序 → 本次运行已分配班次数升序(公平) → driver_id
// 5. 通过提交回调落库;写入失败记为 failed,运行继续
// 红线: 严格顺序处理;达到 max_iterations 后剩余班次保持未处理
// ==========================================

use crate::domain::assignment::AssignmentWithSubject;
use crate::domain::driver::{Driver, ProtectedRule};
use crate::domain::schedule::{
    AutoBuildParams, AutoBuildSuggestion, DecisionAction, SchedulingResult,
};
use crate::domain::subject::AssignmentSubject;
use crate::engine::assignment_validator::{AssignmentValidator, ValidationOutcome};
use crate::engine::scoring::ScoreProvider;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

pub const REASON_NO_ELIGIBLE_DRIVERS: &str = "no eligible drivers";
pub const REASON_BELOW_CONFIDENCE: &str = "below confidence threshold";
pub const REASON_ALREADY_ASSIGNED: &str = "already assigned";

/// 综合得分权重
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub ownership: f64,
    pub affinity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            ownership: 0.7,
            affinity: 0.3,
        }
    }
}

impl ScoreWeights {
    pub fn combine(&self, ownership: f64, affinity: f64) -> f64 {
        ownership.clamp(0.0, 1.0) * self.ownership + affinity.clamp(0.0, 1.0) * self.affinity
    }
}

/// 提交回调的返回
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// 已落库,返回写入后的分配
    Committed(AssignmentWithSubject),
    /// 写入时被拒绝(如并发占用),附原因
    Rejected(String),
}

/// 引擎输入
#[derive(Debug, Clone, Copy)]
pub struct AutoBuildInput<'a> {
    /// 待处理班次(已按处理顺序排列)
    pub blocks: &'a [AssignmentSubject],
    pub drivers: &'a [Driver],
    pub protected_rules: &'a [ProtectedRule],
    /// 目标周及其回溯范围内的有效分配
    pub existing: &'a [AssignmentWithSubject],
}

/// 引擎输出(不含运行标识与配置快照)
#[derive(Debug, Clone, Default)]
pub struct AutoBuildRun {
    pub decisions: Vec<AutoBuildSuggestion>,
    pub unprocessed_block_ids: Vec<String>,
    pub stopped_early: bool,
    pub ineligible_driver_count: usize,
}

impl AutoBuildRun {
    pub fn into_result(
        self,
        run_id: &str,
        tenant_id: &str,
        week_start: NaiveDate,
        config_snapshot: Option<String>,
    ) -> SchedulingResult {
        let count = |action: DecisionAction| {
            self.decisions
                .iter()
                .filter(|d| d.decision == action)
                .count()
        };
        let assigned = count(DecisionAction::Assigned);
        let skipped = count(DecisionAction::Skipped);
        let failed = count(DecisionAction::Failed);
        let processed = self.decisions.len();
        let coverage_rate = if processed == 0 {
            0.0
        } else {
            assigned as f64 / processed as f64
        };

        SchedulingResult {
            run_id: run_id.to_string(),
            tenant_id: tenant_id.to_string(),
            week_start,
            decisions: self.decisions,
            assigned,
            skipped,
            failed,
            unprocessed_block_ids: self.unprocessed_block_ids,
            stopped_early: self.stopped_early,
            coverage_rate,
            ineligible_driver_count: self.ineligible_driver_count,
            config_snapshot,
        }
    }
}

/// 单个候选
#[derive(Debug, Clone)]
struct Candidate<'a> {
    driver: &'a Driver,
    ownership: f64,
    affinity: f64,
    combined: f64,
    outcome: ValidationOutcome,
}

// ==========================================
// AutoBuildScheduler - 自动排班引擎
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct AutoBuildScheduler {
    validator: AssignmentValidator,
    weights: ScoreWeights,
}

impl AutoBuildScheduler {
    pub fn new(validator: AssignmentValidator, weights: ScoreWeights) -> Self {
        Self { validator, weights }
    }

    /// 执行一次自动排班
    ///
    /// # 参数
    /// - input: 班次/司机/规则/已有分配
    /// - params: max_iterations / min_confidence
    /// - scores: 得分提供者
    /// - commit: 提交回调(由调用方负责落库)
    #[instrument(skip_all, fields(
        blocks = input.blocks.len(),
        drivers = input.drivers.len(),
        max_iterations = params.max_iterations,
        min_confidence = params.min_confidence
    ))]
    pub fn run<F>(
        &self,
        input: AutoBuildInput<'_>,
        params: &AutoBuildParams,
        scores: &dyn ScoreProvider,
        mut commit: F,
    ) -> AutoBuildRun
    where
        F: FnMut(&Driver, &AssignmentSubject, &ValidationOutcome) -> CommitOutcome,
    {
        let mut working: Vec<AssignmentWithSubject> = input.existing.to_vec();
        let mut assigned_this_run: HashMap<String, usize> = HashMap::new();
        let mut run = AutoBuildRun {
            ineligible_driver_count: input
                .drivers
                .iter()
                .filter(|d| {
                    !d.is_active()
                        || (!input.blocks.is_empty()
                            && !input.blocks.iter().any(|b| d.is_eligible_for(b.solo_type)))
                })
                .count(),
            ..Default::default()
        };

        for (index, block) in input.blocks.iter().enumerate() {
            if index >= params.max_iterations {
                run.unprocessed_block_ids = input.blocks[index..]
                    .iter()
                    .map(|b| b.subject_id.clone())
                    .collect();
                run.stopped_early = true;
                info!(
                    processed = index,
                    remaining = run.unprocessed_block_ids.len(),
                    "达到最大迭代次数,停止处理"
                );
                break;
            }

            let decision = self.decide_block(
                block,
                &input,
                &working,
                &assigned_this_run,
                params.min_confidence,
                params.one_block_per_day,
                scores,
                &mut commit,
            );

            if let Some(committed) = decision.1 {
                *assigned_this_run
                    .entry(committed.driver_id().to_string())
                    .or_insert(0) += 1;
                working.push(committed);
            }
            run.decisions.push(decision.0);
        }

        run
    }

    #[allow(clippy::too_many_arguments)]
    fn decide_block<F>(
        &self,
        block: &AssignmentSubject,
        input: &AutoBuildInput<'_>,
        working: &[AssignmentWithSubject],
        assigned_this_run: &HashMap<String, usize>,
        min_confidence: f64,
        one_block_per_day: bool,
        scores: &dyn ScoreProvider,
        commit: &mut F,
    ) -> (AutoBuildSuggestion, Option<AssignmentWithSubject>)
    where
        F: FnMut(&Driver, &AssignmentSubject, &ValidationOutcome) -> CommitOutcome,
    {
        let skip = |reasoning: String| AutoBuildSuggestion {
            block_id: block.subject_id.clone(),
            driver_id: None,
            combined_score: 0.0,
            decision: DecisionAction::Skipped,
            reasoning,
        };

        if let Some(current) = working
            .iter()
            .find(|aws| aws.is_active() && aws.subject_id() == block.subject_id)
        {
            return (
                skip(format!(
                    "{}: held by driver {}",
                    REASON_ALREADY_ASSIGNED,
                    current.driver_id()
                )),
                None,
            );
        }

        // 1. 类型资格
        let eligible: Vec<&Driver> = input
            .drivers
            .iter()
            .filter(|d| d.is_active() && d.is_eligible_for(block.solo_type))
            .collect();
        if eligible.is_empty() {
            return (
                skip(format!(
                    "{}: no active driver qualified for {}",
                    REASON_NO_ELIGIBLE_DRIVERS, block.solo_type
                )),
                None,
            );
        }

        // 同日只排一个班次
        let eligible: Vec<&Driver> = if one_block_per_day {
            let free: Vec<&Driver> = eligible
                .into_iter()
                .filter(|d| {
                    !working.iter().any(|aws| {
                        aws.is_active()
                            && aws.driver_id() == d.driver_id
                            && aws.subject.service_date == block.service_date
                    })
                })
                .collect();
            if free.is_empty() {
                return (
                    skip(format!(
                        "{}: every qualified driver already works on {}",
                        REASON_NO_ELIGIBLE_DRIVERS, block.service_date
                    )),
                    None,
                );
            }
            free
        } else {
            eligible
        };

        // 2. 硬约束
        let passed: Vec<Candidate> = eligible
            .into_iter()
            .filter_map(|driver| {
                let outcome = self.validator.validate_assignment(
                    driver,
                    block,
                    working,
                    input.protected_rules,
                    working,
                    None,
                );
                if !outcome.can_assign {
                    return None;
                }
                let ownership = scores.ownership_score(driver, block).clamp(0.0, 1.0);
                let affinity = scores.affinity_score(driver, block).clamp(0.0, 1.0);
                Some(Candidate {
                    driver,
                    ownership,
                    affinity,
                    combined: self.weights.combine(ownership, affinity),
                    outcome,
                })
            })
            .collect();

        if passed.is_empty() {
            return (
                skip(format!(
                    "{}: every qualified driver fails compliance for this block",
                    REASON_NO_ELIGIBLE_DRIVERS
                )),
                None,
            );
        }

        // 3. 置信度
        let best_score = passed
            .iter()
            .map(|c| c.combined)
            .fold(f64::NEG_INFINITY, f64::max);
        let mut ranked: Vec<Candidate> = passed
            .into_iter()
            .filter(|c| c.combined >= min_confidence)
            .collect();

        if ranked.is_empty() {
            return (
                AutoBuildSuggestion {
                    combined_score: best_score,
                    ..skip(format!(
                        "{}: best score {:.2} < {:.2}",
                        REASON_BELOW_CONFIDENCE, best_score, min_confidence
                    ))
                },
                None,
            );
        }

        // 4. 排序
        let load = |id: &str| assigned_this_run.get(id).copied().unwrap_or(0);
        ranked.sort_by(|a, b| {
            b.combined
                .total_cmp(&a.combined)
                .then_with(|| load(&a.driver.driver_id).cmp(&load(&b.driver.driver_id)))
                .then_with(|| a.driver.driver_id.cmp(&b.driver.driver_id))
        });

        let alternatives = ranked.len() - 1;
        let top = &ranked[0];
        let reasoning = format!(
            "ownership {:.2}, affinity {:.2}, combined {:.2}; status {}; {} other candidate(s)",
            top.ownership,
            top.affinity,
            top.combined,
            top.outcome.status(),
            alternatives
        );

        // 5. 提交
        match commit(top.driver, block, &top.outcome) {
            CommitOutcome::Committed(aws) => {
                debug!(block_id = %block.subject_id, driver_id = %top.driver.driver_id, "班次已分配");
                (
                    AutoBuildSuggestion {
                        block_id: block.subject_id.clone(),
                        driver_id: Some(top.driver.driver_id.clone()),
                        combined_score: top.combined,
                        decision: DecisionAction::Assigned,
                        reasoning,
                    },
                    Some(aws),
                )
            }
            CommitOutcome::Rejected(reason) => {
                warn!(block_id = %block.subject_id, driver_id = %top.driver.driver_id, %reason, "分配写入失败");
                (
                    AutoBuildSuggestion {
                        block_id: block.subject_id.clone(),
                        driver_id: Some(top.driver.driver_id.clone()),
                        combined_score: top.combined,
                        decision: DecisionAction::Failed,
                        reasoning: format!("{}; write rejected: {}", reasoning, reason),
                    },
                    None,
                )
            }
        }
    }
}

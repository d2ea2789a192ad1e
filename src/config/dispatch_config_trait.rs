// ==========================================
// 司机排班调度系统 - 调度配置读取 Trait
// ==========================================
// 职责: 定义引擎与 API 所需的配置读取接口(不包含实现)
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::engine::auto_build::ScoreWeights;
use crate::engine::hos::ComplianceRules;
use crate::engine::workload::WorkloadThresholds;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// DispatchConfigReader Trait
// ==========================================
// 实现者: ConfigManager(从 config_kv 表读取)
#[async_trait]
pub trait DispatchConfigReader: Send + Sync {
    /// 获取工时合规规则
    ///
    /// # 默认值
    /// - solo1 {14, 24, 0.9}; solo2 {38, 48, 0.9}; team 同 solo2; 最少休息 10h
    async fn get_compliance_rules(&self) -> Result<ComplianceRules, Box<dyn Error + Send + Sync>>;

    /// 获取周负荷等级阈值
    ///
    /// # 默认值
    /// - ideal 4 / warning 5 / critical 6
    async fn get_workload_thresholds(
        &self,
    ) -> Result<WorkloadThresholds, Box<dyn Error + Send + Sync>>;

    /// 获取自动排班综合得分权重
    ///
    /// # 默认值
    /// - ownership 0.7 / affinity 0.3
    async fn get_score_weights(&self) -> Result<ScoreWeights, Box<dyn Error + Send + Sync>>;

    /// 自动排班默认最低置信度(默认 0.0)
    async fn get_default_min_confidence(&self) -> Result<f64, Box<dyn Error + Send + Sync>>;

    /// 自动排班默认最大迭代次数(默认 1000)
    async fn get_default_max_iterations(&self) -> Result<usize, Box<dyn Error + Send + Sync>>;

    /// 自动排班同一司机同一服务日期最多一个班次(默认 true)
    async fn get_one_block_per_day(&self) -> Result<bool, Box<dyn Error + Send + Sync>>;

    /// 全部 global 配置的 JSON 快照(随排班结果留档)
    async fn get_config_snapshot(&self) -> Result<String, Box<dyn Error + Send + Sync>>;
}

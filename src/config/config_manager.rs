// ==========================================
// 司机排班调度系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 说明: 缺失或格式错误的配置回落到默认值,并记录 warn 日志
// ==========================================

use crate::config::dispatch_config_trait::DispatchConfigReader;
use crate::db::open_sqlite_connection;
use crate::engine::auto_build::ScoreWeights;
use crate::engine::hos::{ComplianceLimits, ComplianceRules};
use crate::engine::workload::WorkloadThresholds;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明: 会对传入连接再次应用统一 PRAGMA(幂等)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值(scope_id='global')
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值(公开方法,供其他模块复用)
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now', 'localtime'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
              value = excluded.value,
              updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 读取并解析数值配置;缺失 → 默认值;解析失败 → warn + 默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置格式错误,使用默认值"
                );
                Ok(default)
            }
        }
    }

    fn get_positive_or_default(&self, key: &str, default: f64) -> ConfigResult<f64> {
        let value = self.get_parsed_or_default(key, default)?;
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            warn!(config_key = key, value, default, "配置值必须为正数,使用默认值");
            Ok(default)
        }
    }

    fn get_limits(&self, prefix: &str, default: ComplianceLimits) -> ConfigResult<ComplianceLimits> {
        let mut limits = ComplianceLimits {
            max_hours: self.get_positive_or_default(&format!("{}.max_hours", prefix), default.max_hours)?,
            window_hours: self
                .get_positive_or_default(&format!("{}.window_hours", prefix), default.window_hours)?,
            warning_ratio: self
                .get_positive_or_default(&format!("{}.warning_ratio", prefix), default.warning_ratio)?,
        };
        if limits.warning_ratio > 1.0 {
            warn!(prefix, ratio = limits.warning_ratio, "预警比例不能超过 1,使用默认值");
            limits.warning_ratio = default.warning_ratio;
        }
        Ok(limits)
    }

    /// 获取所有配置的快照(JSON 格式,按 key 排序)
    pub fn snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let config_map = stmt
            .query_map(params![GLOBAL_SCOPE], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// DispatchConfigReader Trait 实现
// ==========================================
#[async_trait]
impl DispatchConfigReader for ConfigManager {
    async fn get_compliance_rules(&self) -> ConfigResult<ComplianceRules> {
        let solo2 = self.get_limits("hos.solo2", ComplianceLimits::SOLO2)?;
        Ok(ComplianceRules {
            solo1: self.get_limits("hos.solo1", ComplianceLimits::SOLO1)?,
            team: self.get_limits("hos.team", solo2)?,
            solo2,
            min_rest_hours: self.get_positive_or_default(config_keys::HOS_MIN_REST_HOURS, 10.0)?,
        })
    }

    async fn get_workload_thresholds(&self) -> ConfigResult<WorkloadThresholds> {
        let default = WorkloadThresholds::default();
        let thresholds = WorkloadThresholds {
            ideal_days: self.get_parsed_or_default(config_keys::WORKLOAD_IDEAL_DAYS, default.ideal_days)?,
            warning_days: self
                .get_parsed_or_default(config_keys::WORKLOAD_WARNING_DAYS, default.warning_days)?,
            critical_days: self
                .get_parsed_or_default(config_keys::WORKLOAD_CRITICAL_DAYS, default.critical_days)?,
        };

        if thresholds.ideal_days <= thresholds.warning_days
            && thresholds.warning_days <= thresholds.critical_days
        {
            Ok(thresholds)
        } else {
            warn!(?thresholds, "负荷阈值非递增,使用默认值");
            Ok(default)
        }
    }

    async fn get_score_weights(&self) -> ConfigResult<ScoreWeights> {
        let default = ScoreWeights::default();
        let weights = ScoreWeights {
            ownership: self.get_parsed_or_default(config_keys::OWNERSHIP_WEIGHT, default.ownership)?,
            affinity: self.get_parsed_or_default(config_keys::AFFINITY_WEIGHT, default.affinity)?,
        };

        if weights.ownership < 0.0 || weights.affinity < 0.0 || weights.ownership + weights.affinity <= 0.0 {
            warn!(?weights, "得分权重无效,使用默认值");
            return Ok(default);
        }
        Ok(weights)
    }

    async fn get_default_min_confidence(&self) -> ConfigResult<f64> {
        let value: f64 = self.get_parsed_or_default(config_keys::DEFAULT_MIN_CONFIDENCE, 0.0)?;
        Ok(value.clamp(0.0, 1.0))
    }

    async fn get_default_max_iterations(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::DEFAULT_MAX_ITERATIONS, 1000)
    }

    async fn get_one_block_per_day(&self) -> ConfigResult<bool> {
        self.get_parsed_or_default(config_keys::ONE_BLOCK_PER_DAY, true)
    }

    async fn get_config_snapshot(&self) -> ConfigResult<String> {
        self.snapshot()
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 工时合规
    pub const HOS_SOLO1_MAX_HOURS: &str = "hos.solo1.max_hours";
    pub const HOS_SOLO1_WINDOW_HOURS: &str = "hos.solo1.window_hours";
    pub const HOS_SOLO1_WARNING_RATIO: &str = "hos.solo1.warning_ratio";
    pub const HOS_SOLO2_MAX_HOURS: &str = "hos.solo2.max_hours";
    pub const HOS_SOLO2_WINDOW_HOURS: &str = "hos.solo2.window_hours";
    pub const HOS_SOLO2_WARNING_RATIO: &str = "hos.solo2.warning_ratio";
    pub const HOS_TEAM_MAX_HOURS: &str = "hos.team.max_hours";
    pub const HOS_TEAM_WINDOW_HOURS: &str = "hos.team.window_hours";
    pub const HOS_TEAM_WARNING_RATIO: &str = "hos.team.warning_ratio";
    pub const HOS_MIN_REST_HOURS: &str = "hos.min_rest_hours";

    // 周负荷
    pub const WORKLOAD_IDEAL_DAYS: &str = "workload.ideal_days";
    pub const WORKLOAD_WARNING_DAYS: &str = "workload.warning_days";
    pub const WORKLOAD_CRITICAL_DAYS: &str = "workload.critical_days";

    // 自动排班
    pub const OWNERSHIP_WEIGHT: &str = "auto_build.ownership_weight";
    pub const AFFINITY_WEIGHT: &str = "auto_build.affinity_weight";
    pub const DEFAULT_MIN_CONFIDENCE: &str = "auto_build.default_min_confidence";
    pub const DEFAULT_MAX_ITERATIONS: &str = "auto_build.default_max_iterations";
    pub const ONE_BLOCK_PER_DAY: &str = "auto_build.one_block_per_day";
}

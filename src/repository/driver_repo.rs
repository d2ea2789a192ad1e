// ==========================================
// 司机排班调度系统 - 司机与保护规则仓储
// ==========================================
// 说明: 司机与保护规则由外部司机管理模块维护,本仓储以读取为主;
//       写入方法供初始化与测试使用
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::driver::{Driver, ProtectedRule};
use crate::domain::types::{weekday_name, DriverStatus, SoloType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// DriverRepository - 司机仓储
// ==========================================
pub struct DriverRepository {
    conn: Arc<Mutex<Connection>>,
}

/// driver 表原始行
struct DriverRow {
    driver_id: String,
    tenant_id: String,
    name: String,
    solo_types: String,
    status: String,
    is_protected: bool,
}

impl DriverRow {
    fn into_driver(self) -> RepositoryResult<Driver> {
        let solo_types = self
            .solo_types
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SoloType::parse)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::field("solo_types", e))?;

        Ok(Driver {
            driver_id: self.driver_id,
            tenant_id: self.tenant_id,
            name: self.name,
            solo_types,
            status: DriverStatus::from_str(&self.status),
            is_protected: self.is_protected,
        })
    }
}

/// protected_rule 表原始行(列表列为 JSON 字符串数组)
struct RuleRow {
    rule_id: String,
    driver_id: String,
    blocked_days: String,
    allowed_days: String,
    allowed_solo_types: String,
    allowed_start_times: String,
    max_start_time: Option<String>,
}

impl RuleRow {
    fn into_rule(self) -> RepositoryResult<ProtectedRule> {
        let blocked: Vec<String> = serde_json::from_str(&self.blocked_days)?;
        let allowed: Vec<String> = serde_json::from_str(&self.allowed_days)?;
        let solo: Vec<String> = serde_json::from_str(&self.allowed_solo_types)?;
        let starts: Vec<String> = serde_json::from_str(&self.allowed_start_times)?;

        ProtectedRule::from_raw(
            &self.rule_id,
            &self.driver_id,
            &blocked,
            &allowed,
            &solo,
            &starts,
            self.max_start_time.as_deref().filter(|s| !s.trim().is_empty()),
        )
        .map_err(|e| RepositoryError::field("protected_rule", e))
    }
}

const DRIVER_COLUMNS: &str = "driver_id, tenant_id, name, solo_types, status, is_protected";
const RULE_COLUMNS: &str = "rule_id, driver_id, blocked_days, allowed_days, allowed_solo_types, allowed_start_times, max_start_time";

fn map_driver_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DriverRow> {
    Ok(DriverRow {
        driver_id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        solo_types: row.get(3)?,
        status: row.get(4)?,
        is_protected: row.get::<_, i64>(5)? != 0,
    })
}

fn map_rule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        rule_id: row.get(0)?,
        driver_id: row.get(1)?,
        blocked_days: row.get(2)?,
        allowed_days: row.get(3)?,
        allowed_solo_types: row.get(4)?,
        allowed_start_times: row.get(5)?,
        max_start_time: row.get(6)?,
    })
}

/// 生成 "?1, ?2, ..." 占位符
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

impl DriverRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 司机 =====

    /// 写入或覆盖司机
    pub fn upsert(&self, driver: &Driver) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let solo_types: Vec<&str> = driver.solo_types.iter().map(|s| s.to_db_str()).collect();
        conn.execute(
            r#"
            INSERT INTO driver (driver_id, tenant_id, name, solo_types, status, is_protected)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(driver_id) DO UPDATE SET
              tenant_id = excluded.tenant_id,
              name = excluded.name,
              solo_types = excluded.solo_types,
              status = excluded.status,
              is_protected = excluded.is_protected
            "#,
            params![
                driver.driver_id,
                driver.tenant_id,
                driver.name,
                solo_types.join(","),
                driver.status.to_db_str(),
                driver.is_protected as i64,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, driver_id: &str) -> RepositoryResult<Option<Driver>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM driver WHERE driver_id = ?1", DRIVER_COLUMNS),
                params![driver_id],
                map_driver_row,
            )
            .optional()?;
        row.map(DriverRow::into_driver).transpose()
    }

    /// 租户内全部司机(按 driver_id 排序)
    pub fn find_by_tenant(&self, tenant_id: &str) -> RepositoryResult<Vec<Driver>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM driver WHERE tenant_id = ?1 ORDER BY driver_id",
            DRIVER_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![tenant_id], map_driver_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(DriverRow::into_driver).collect()
    }

    pub fn find_by_ids(&self, driver_ids: &[String]) -> RepositoryResult<Vec<Driver>> {
        if driver_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM driver WHERE driver_id IN ({}) ORDER BY driver_id",
            DRIVER_COLUMNS,
            placeholders(1, driver_ids.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(driver_ids.iter()), map_driver_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(DriverRow::into_driver).collect()
    }

    // ===== 保护规则 =====

    /// 写入或覆盖保护规则
    pub fn upsert_rule(&self, tenant_id: &str, rule: &ProtectedRule) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let days = |list: &[chrono::Weekday]| -> RepositoryResult<String> {
            Ok(serde_json::to_string(
                &list.iter().map(|d| weekday_name(*d)).collect::<Vec<_>>(),
            )?)
        };
        let solo = serde_json::to_string(
            &rule
                .allowed_solo_types
                .iter()
                .map(|s| s.to_db_str())
                .collect::<Vec<_>>(),
        )?;
        let starts = serde_json::to_string(
            &rule
                .allowed_start_times
                .iter()
                .map(|t| t.format("%H:%M").to_string())
                .collect::<Vec<_>>(),
        )?;

        conn.execute(
            r#"
            INSERT INTO protected_rule (
              rule_id, tenant_id, driver_id, blocked_days, allowed_days,
              allowed_solo_types, allowed_start_times, max_start_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(rule_id) DO UPDATE SET
              tenant_id = excluded.tenant_id,
              driver_id = excluded.driver_id,
              blocked_days = excluded.blocked_days,
              allowed_days = excluded.allowed_days,
              allowed_solo_types = excluded.allowed_solo_types,
              allowed_start_times = excluded.allowed_start_times,
              max_start_time = excluded.max_start_time
            "#,
            params![
                rule.rule_id,
                tenant_id,
                rule.driver_id,
                days(&rule.blocked_days)?,
                days(&rule.allowed_days)?,
                solo,
                starts,
                rule.max_start_time.map(|t| t.format("%H:%M").to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn find_rules_by_driver(&self, driver_id: &str) -> RepositoryResult<Vec<ProtectedRule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM protected_rule WHERE driver_id = ?1 ORDER BY rule_id",
            RULE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![driver_id], map_rule_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RuleRow::into_rule).collect()
    }

    pub fn find_rules_by_tenant(&self, tenant_id: &str) -> RepositoryResult<Vec<ProtectedRule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM protected_rule WHERE tenant_id = ?1 ORDER BY rule_id",
            RULE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![tenant_id], map_rule_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RuleRow::into_rule).collect()
    }

    pub fn find_rules_by_drivers(&self, driver_ids: &[String]) -> RepositoryResult<Vec<ProtectedRule>> {
        if driver_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM protected_rule WHERE driver_id IN ({}) ORDER BY rule_id",
            RULE_COLUMNS,
            placeholders(1, driver_ids.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(driver_ids.iter()), map_rule_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RuleRow::into_rule).collect()
    }
}

// ==========================================
// 司机排班调度系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为(外键、busy_timeout)
// - 启动时幂等建表,并记录 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout(毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表(幂等)
///
/// 约束:
/// - assignment(subject_id) 上的部分唯一索引保证"每个班次最多一条有效分配"
/// - assignment.revision 用于乐观锁
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS driver (
          driver_id TEXT PRIMARY KEY,
          tenant_id TEXT NOT NULL,
          name TEXT NOT NULL,
          solo_types TEXT NOT NULL DEFAULT '',
          status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'inactive')),
          is_protected INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_driver_tenant ON driver(tenant_id);

        CREATE TABLE IF NOT EXISTS protected_rule (
          rule_id TEXT PRIMARY KEY,
          tenant_id TEXT NOT NULL,
          driver_id TEXT NOT NULL REFERENCES driver(driver_id),
          blocked_days TEXT NOT NULL DEFAULT '[]',
          allowed_days TEXT NOT NULL DEFAULT '[]',
          allowed_solo_types TEXT NOT NULL DEFAULT '[]',
          allowed_start_times TEXT NOT NULL DEFAULT '[]',
          max_start_time TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_protected_rule_driver ON protected_rule(driver_id);
        CREATE INDEX IF NOT EXISTS idx_protected_rule_tenant ON protected_rule(tenant_id);

        CREATE TABLE IF NOT EXISTS assignment_subject (
          subject_id TEXT PRIMARY KEY,
          tenant_id TEXT NOT NULL,
          service_date TEXT NOT NULL,
          start_at TEXT NOT NULL,
          end_at TEXT NOT NULL,
          duration_hours REAL NOT NULL CHECK(duration_hours > 0),
          solo_type TEXT NOT NULL CHECK(solo_type IN ('solo1', 'solo2', 'team')),
          resource_id TEXT,
          contract_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_subject_tenant_date ON assignment_subject(tenant_id, service_date);

        CREATE TABLE IF NOT EXISTS assignment (
          assignment_id TEXT PRIMARY KEY,
          tenant_id TEXT NOT NULL,
          driver_id TEXT NOT NULL REFERENCES driver(driver_id),
          subject_id TEXT NOT NULL REFERENCES assignment_subject(subject_id),
          assigned_at TEXT NOT NULL,
          is_active INTEGER NOT NULL DEFAULT 1,
          validation_status TEXT NOT NULL CHECK(validation_status IN ('valid', 'warning', 'violation')),
          validation_summary TEXT NOT NULL DEFAULT '{}',
          revision INTEGER NOT NULL DEFAULT 1,
          updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ux_assignment_active_subject
          ON assignment(subject_id) WHERE is_active = 1;
        CREATE INDEX IF NOT EXISTS idx_assignment_driver ON assignment(driver_id, is_active);
        CREATE INDEX IF NOT EXISTS idx_assignment_tenant ON assignment(tenant_id, is_active);

        CREATE TABLE IF NOT EXISTS schedule_run_lock (
          tenant_id TEXT NOT NULL,
          week_start TEXT NOT NULL,
          run_id TEXT NOT NULL,
          locked_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
          PRIMARY KEY (tenant_id, week_start)
        );

        CREATE TABLE IF NOT EXISTS config_kv (
          scope_id TEXT NOT NULL,
          key TEXT NOT NULL,
          value TEXT NOT NULL,
          updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
          PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS schema_version (
          version INTEGER PRIMARY KEY,
          applied_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version(若表不存在则返回 None)
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }
}

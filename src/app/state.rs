// ==========================================
// 司机排班调度系统 - 应用状态
// ==========================================
// 职责: 进程启动时一次性构建仓储/配置/API,并以引用传递给调用方
// 红线: 不使用全局单例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{AssignmentApi, CascadeApi, ScheduleApi};
use crate::config::{ConfigManager, DispatchConfigReader};
use crate::db::{ensure_schema, open_sqlite_connection, read_schema_version, CURRENT_SCHEMA_VERSION};
use crate::repository::{
    AssignmentRepository, DriverRepository, ScheduleRunLockRepository, SubjectRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 分配API
    pub assignment_api: Arc<AssignmentApi>,

    /// 级联变更API
    pub cascade_api: Arc<CascadeApi>,

    /// 自动排班API
    pub schedule_api: Arc<ScheduleApi>,

    /// 配置管理器(用于配置读写命令)
    pub config_manager: Arc<ConfigManager>,

    /// 司机仓储(用于初始化/导入)
    pub driver_repo: Arc<DriverRepository>,

    /// 班次仓储(用于初始化/导入)
    pub subject_repo: Arc<SubjectRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 1. 打开共享连接并幂等建表
    /// 2. 初始化所有Repository
    /// 3. 创建所有API实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState,数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        match read_schema_version(&conn) {
            Ok(Some(v)) if v > CURRENT_SCHEMA_VERSION => {
                tracing::warn!(
                    db_version = v,
                    expected = CURRENT_SCHEMA_VERSION,
                    "数据库 schema 版本高于当前程序"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("schema_version 读取失败(将继续启动): {}", e),
        }
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let driver_repo = Arc::new(DriverRepository::new(conn.clone()));
        let subject_repo = Arc::new(SubjectRepository::new(conn.clone()));
        let assignment_repo = Arc::new(AssignmentRepository::new(conn.clone()));
        let run_lock_repo = Arc::new(ScheduleRunLockRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config: Arc<dyn DispatchConfigReader> = config_manager.clone();

        // ==========================================
        // 初始化API层
        // ==========================================
        let assignment_api = Arc::new(AssignmentApi::new(
            driver_repo.clone(),
            subject_repo.clone(),
            assignment_repo.clone(),
            config.clone(),
        ));
        let cascade_api = Arc::new(CascadeApi::new(
            driver_repo.clone(),
            assignment_repo.clone(),
            config.clone(),
        ));
        let schedule_api = Arc::new(ScheduleApi::new(
            driver_repo.clone(),
            subject_repo.clone(),
            assignment_repo,
            run_lock_repo,
            config,
        ));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            assignment_api,
            cascade_api,
            schedule_api,
            config_manager,
            driver_repo,
            subject_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: DRIVER_DISPATCH_DB_PATH 环境变量 → 用户数据目录 → ./driver_dispatch.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("DRIVER_DISPATCH_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./driver_dispatch.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("driver-dispatch");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("driver_dispatch.db");
        }
    }

    path.to_string_lossy().to_string()
}

// ==========================================
// 司机排班调度系统 - 命令行入口
// ==========================================
// 用法:
//   driver-dispatch init
//   driver-dispatch build <tenant_id> <week_start> [max_iterations] [min_confidence]
//   driver-dispatch workload <tenant_id> <week_start>
// 数据库: DRIVER_DISPATCH_DB_PATH 或用户数据目录
// ==========================================

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use driver_dispatch::api::BuildScheduleOptions;
use driver_dispatch::app::{get_default_db_path, AppState};
use driver_dispatch::engine::week_start_for;
use driver_dispatch::logging;

fn usage() -> String {
    [
        "用法:",
        "  driver-dispatch init",
        "  driver-dispatch build <tenant_id> <week_start YYYY-MM-DD> [max_iterations] [min_confidence]",
        "  driver-dispatch workload <tenant_id> <week_start YYYY-MM-DD>",
    ]
    .join("\n")
}

fn parse_week_start(raw: Option<&String>) -> anyhow::Result<NaiveDate> {
    let raw = raw.ok_or_else(|| anyhow!("缺少 week_start\n{}", usage()))?;
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("week_start 格式错误: {}", raw))?;
    let normalized = week_start_for(date);
    if normalized != date {
        tracing::warn!(input = %date, week_start = %normalized, "week_start 已对齐到周日");
    }
    Ok(normalized)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");

    let db_path = get_default_db_path();
    tracing::info!("{} v{} 使用数据库: {}", driver_dispatch::APP_NAME, driver_dispatch::VERSION, db_path);

    match command {
        "init" => {
            AppState::new(db_path.clone()).map_err(|e| anyhow!(e))?;
            println!("数据库已初始化: {}", db_path);
        }
        "build" => {
            let tenant_id = args.get(1).ok_or_else(|| anyhow!("缺少 tenant_id\n{}", usage()))?;
            let week_start = parse_week_start(args.get(2))?;
            let max_iterations = args
                .get(3)
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("max_iterations 必须为非负整数")?;
            let min_confidence = args
                .get(4)
                .map(|v| v.parse::<f64>())
                .transpose()
                .context("min_confidence 必须为数字")?;

            let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;
            let result = state
                .schedule_api
                .build_schedule(
                    tenant_id,
                    week_start,
                    BuildScheduleOptions {
                        max_iterations,
                        min_confidence,
                        block_order: None,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "workload" => {
            let tenant_id = args.get(1).ok_or_else(|| anyhow!("缺少 tenant_id\n{}", usage()))?;
            let week_start = parse_week_start(args.get(2))?;

            let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;
            let workloads = state
                .assignment_api
                .get_all_driver_workloads(tenant_id, week_start)
                .await?;
            println!("{}", serde_json::to_string_pretty(&workloads)?);
        }
        "" | "help" | "--help" | "-h" => println!("{}", usage()),
        other => bail!("未知命令: {}\n{}", other, usage()),
    }

    Ok(())
}

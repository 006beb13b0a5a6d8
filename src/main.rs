// ==========================================
// 绝缘工器具试验报告系统 - 命令行主入口
// ==========================================
// 功能: 数据导入/导出、表格查看与编辑、批次列表、报告生成
// 约束: 命令行下的编辑立即保存（单条命令即一次保存）
// ==========================================

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use insulating_tool_report::api::{ReportApi, ToolApi};
use insulating_tool_report::app::{get_default_db_path, AppState, RefreshRegistry, Refreshable};
use insulating_tool_report::config::config_keys;
use insulating_tool_report::domain::{CellValue, DATE_FORMAT};
use insulating_tool_report::repository::RowRef;
use insulating_tool_report::{logging, APP_NAME, VERSION};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "insulating-tool-report")]
#[command(about = "绝缘工器具试验报告系统（命令行）")]
#[command(version)]
struct Cli {
    /// 数据库文件路径
    #[arg(long, global = true, env = "INSULATING_TOOL_REPORT_DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 导入 Excel/CSV 文件（整表替换）
    Import { file: PathBuf },

    /// 导出当前数据到 .xlsx/.csv
    Export { file: PathBuf },

    /// 显示全部数据
    Show,

    /// 列出试验批次
    Batches,

    /// 预览批次数据（序号或批次名）
    Preview {
        batch: String,
        /// 输出渲染上下文（JSON）
        #[arg(long)]
        context: bool,
    },

    /// 生成单个批次的报告
    Generate { batch: String },

    /// 生成全部批次的报告（Ctrl-C 在当前批次完成后停止）
    GenerateAll,

    /// 新增一行（可同时赋值: --set 列名=值）
    AddRow {
        #[arg(long = "set", value_name = "COLUMN=VALUE")]
        sets: Vec<String>,
        #[arg(long, value_enum, default_value_t = CellKind::Text)]
        kind: CellKind,
    },

    /// 删除一行（行号见 show 输出）
    DeleteRow { row: String },

    /// 修改一个单元格
    SetCell {
        row: String,
        column: String,
        value: String,
        #[arg(long, value_enum, default_value_t = CellKind::Text)]
        kind: CellKind,
    },

    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 读取配置
    Get { key: String },
    /// 写入配置
    Set { key: String, value: String },
    /// 列出全部配置
    List,
}

/// 单元格输入类型
#[derive(Clone, Copy, ValueEnum)]
enum CellKind {
    Text,
    Number,
    Date,
}

// ==========================================
// 视图刷新（数据变更后重新读取）
// ==========================================

struct TableView {
    api: Arc<ToolApi>,
}

impl Refreshable for TableView {
    fn name(&self) -> &str {
        "数据表"
    }

    fn refresh(&self) -> Result<(), String> {
        let rows = self.api.read_view().map_err(|e| e.to_string())?;
        tracing::debug!(rows = rows.len(), "数据表已重新加载");
        Ok(())
    }
}

struct BatchListView {
    api: Arc<ReportApi>,
}

impl Refreshable for BatchListView {
    fn name(&self) -> &str {
        "批次列表"
    }

    fn refresh(&self) -> Result<(), String> {
        let batches = self.api.list_batches().map_err(|e| e.to_string())?;
        tracing::debug!(batches = batches.len(), "批次列表已重新加载");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let db_path = cli.db.unwrap_or_else(get_default_db_path);
    tracing::info!("{} v{}，数据库: {}", APP_NAME, VERSION, db_path);
    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    let mut registry = RefreshRegistry::new();
    registry.register(Arc::new(TableView {
        api: state.tool_api.clone(),
    }));
    registry.register(Arc::new(BatchListView {
        api: state.report_api.clone(),
    }));

    match cli.command {
        Commands::Import { file } => {
            let summary = state.tool_api.import_file(&file)?;
            println!(
                "已导入 {} 行，{} 列: {}",
                summary.row_count,
                summary.columns.len(),
                summary.columns.join(", ")
            );
            registry.refresh_all();
        }

        Commands::Export { file } => {
            let rows = state.tool_api.export_file(&file)?;
            println!("已导出 {} 行到 {}", rows, file.display());
        }

        Commands::Show => {
            let columns = state.tool_api.column_names()?;
            println!("行号\t{}", columns.join("\t"));
            for row in state.tool_api.read_view()? {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| row.record.get(c).map(|v| v.to_string()).unwrap_or_default())
                    .collect();
                println!("{}\t{}", row.row_ref, cells.join("\t"));
            }
        }

        Commands::Batches => {
            let batches = state.report_api.list_batches()?;
            if batches.is_empty() {
                println!("没有数据");
            }
            for (i, b) in batches.iter().enumerate() {
                println!("{:>3}. {}（{} 条记录）", i + 1, b.display_name, b.row_count);
            }
        }

        Commands::Preview { batch, context } => {
            let batch = state.report_api.select_batch(&batch)?;
            if context {
                let ctx = state.report_api.preview_context(&batch.key)?;
                println!("{}", serde_json::to_string_pretty(&ctx)?);
            } else {
                for (i, record) in batch.rows.iter().enumerate() {
                    let row: serde_json::Map<String, serde_json::Value> = record
                        .iter()
                        .map(|(c, v)| (c.clone(), v.to_json()))
                        .collect();
                    println!("{}\t{}", i + 1, serde_json::Value::Object(row));
                }
            }
        }

        Commands::Generate { batch } => {
            let batch = state.report_api.select_batch(&batch)?;
            let path = state.report_api.generate_report(&batch.key)?;
            println!("报告已生成: {}", path.display());
        }

        Commands::GenerateAll => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("收到中断信号，当前批次完成后停止");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let api = state.report_api.clone();
            let summary = tokio::task::spawn_blocking(move || {
                api.generate_all(&cancel, |progress| eprintln!("{}", progress))
            })
            .await
            .context("批量生成任务异常退出")??;

            println!(
                "批量生成完成: 共 {} 个批次，成功 {}，失败 {}{}",
                summary.total,
                summary.succeeded,
                summary.failed,
                if summary.cancelled { "（已取消）" } else { "" }
            );
            for failure in &summary.failures {
                println!("  [{}] {}: {}", failure.stage, failure.display_name, failure.reason);
            }
        }

        Commands::AddRow { sets, kind } => {
            let row = state.tool_api.add_row()?;
            for assignment in &sets {
                let (column, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("赋值格式应为 列名=值: {}", assignment))?;
                state
                    .tool_api
                    .update_cell(row, column.trim(), parse_cell(value, kind)?)?;
            }
            save_or_revert(&state.tool_api)?;
            registry.refresh_all();
        }

        Commands::DeleteRow { row } => {
            state.tool_api.delete_row(Some(parse_row_ref(&row)?))?;
            save_or_revert(&state.tool_api)?;
            registry.refresh_all();
        }

        Commands::SetCell {
            row,
            column,
            value,
            kind,
        } => {
            state
                .tool_api
                .update_cell(parse_row_ref(&row)?, &column, parse_cell(&value, kind)?)?;
            save_or_revert(&state.tool_api)?;
            registry.refresh_all();
        }

        Commands::Config { action } => match action {
            ConfigAction::Get { key } => {
                let value = state
                    .config
                    .get_global_config_value(&key)
                    .map_err(|e| anyhow!(e.to_string()))?;
                match value {
                    Some(v) => println!("{}", v),
                    None => println!("(未设置)"),
                }
            }
            ConfigAction::Set { key, value } => {
                if !config_keys::ALL.contains(&key.as_str()) {
                    tracing::warn!(config_key = %key, "非报告配置项，仍然写入");
                }
                state
                    .config
                    .set_value(&key, &value)
                    .map_err(|e| anyhow!(e.to_string()))?;
            }
            ConfigAction::List => {
                let values = state
                    .config
                    .list_values()
                    .map_err(|e| anyhow!(e.to_string()))?;
                for (key, value) in values {
                    println!("{} = {}", key, value);
                }
                let settings = state
                    .report_api
                    .settings()?;
                println!("# 生效配置");
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
        },
    }

    Ok(())
}

/// 保存修改，失败时撤销，数据库保持原状
fn save_or_revert(api: &ToolApi) -> anyhow::Result<()> {
    match api.save_changes() {
        Ok(summary) => {
            println!(
                "已保存: 新增 {}，修改 {}，删除 {}",
                summary.inserted, summary.updated, summary.deleted
            );
            Ok(())
        }
        Err(e) => {
            api.revert_changes()?;
            Err(e.into())
        }
    }
}

/// 行号: `12` 或 `#12`
fn parse_row_ref(raw: &str) -> anyhow::Result<RowRef> {
    let id = raw
        .trim()
        .trim_start_matches('#')
        .parse::<i64>()
        .with_context(|| format!("无效的行号: {}", raw))?;
    Ok(RowRef::Stored(id))
}

fn parse_cell(raw: &str, kind: CellKind) -> anyhow::Result<CellValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(CellValue::Empty);
    }
    match kind {
        CellKind::Text => Ok(CellValue::text(raw)),
        CellKind::Number => match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(CellValue::Number(n)),
            _ => bail!("无效的数值: {}", raw),
        },
        CellKind::Date => chrono::NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .map(CellValue::Date)
            .with_context(|| format!("无效的日期（应为 YYYY-MM-DD）: {}", raw)),
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mistake_notebook::backup;
use mistake_notebook::query::sort_newest_first;
use mistake_notebook::render::render_markdown;
use mistake_notebook::{logging, Config, Notebook, RecordQuery, RecordStore, RemoteAnalyzer, SqliteRecordStore, Subject};

#[derive(Debug, Parser)]
#[command(name = "mistake-notebook", version, about = "📒 错题本：拍照录入、AI 分析、本地整理")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 分析错题照片并保存
    Capture {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// 科目：Chinese / Math / English / Physics（也可用中文）
        #[arg(short, long)]
        subject: Subject,
        /// 给 AI 的补充说明
        #[arg(long)]
        hint: Option<String>,
    },
    /// 浏览错题
    List {
        #[arg(short, long)]
        subject: Option<Subject>,
        #[arg(short, long)]
        tag: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// 查看单条错题详情
    Show { id: i64 },
    /// 删除单条错题
    Delete { id: i64 },
    /// 清空所有错题
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// 导出备份（可附带 CSV 摘要）
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        csv: bool,
    },
    /// 从备份文件导入
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::load_from(&cli.config)?;
    let store = SqliteRecordStore::new(&config).await.context("打开错题数据库失败")?;
    let analyzer = RemoteAnalyzer::new(config.clone())?;
    let notebook = Notebook::new(store, analyzer, config);

    run(&notebook, cli.command).await
}

async fn run(notebook: &Notebook<SqliteRecordStore, RemoteAnalyzer>, command: Command) -> Result<()> {
    match command {
        Command::Capture { images, subject, hint } => {
            println!("🔄 开始分析 {} 张图片（{}）...", images.len(), subject.display_name());
            let summary = notebook.capture_files(&images, subject, hint.as_deref()).await?;

            for (name, ids) in &summary.saved {
                println!("✅ {}：保存 {} 条错题 {:?}", name, ids.len(), ids);
            }
            for (name, reason) in &summary.failed {
                println!("❌ {}：{}", name, reason);
            }
            if !summary.failed.is_empty() {
                println!("💡 可以补充 --hint 说明后重新分析失败的图片");
            }
        }
        Command::List { subject, tag, search } => {
            let records = notebook.list(&RecordQuery { subject, tag, search }).await?;
            if records.is_empty() {
                println!("📭 没有符合条件的错题");
            }
            for record in &records {
                println!(
                    "[{}] {} ｜ {} ｜ {} ｜ {}",
                    record.id.unwrap_or_default(),
                    record.subject.display_name(),
                    record.title,
                    record.analysis.error_root.category.label(),
                    record.tags.join("、")
                );
            }
        }
        Command::Show { id } => match notebook.store().get_by_id(id).await? {
            Some(record) => println!("{}", render_markdown(&record)),
            None => println!("⚠️  未找到 ID 为 {} 的错题", id),
        },
        Command::Delete { id } => {
            notebook.store().delete_by_id(id).await?;
            println!("🗑️ 已删除错题 {}", id);
        }
        Command::Clear { yes } => {
            if !yes {
                println!("⚠️  清空操作不可恢复，请加上 --yes 确认");
                return Ok(());
            }
            notebook.store().clear().await?;
            println!("🗑️ 所有错题已清空");
        }
        Command::Export { dir, csv } => {
            let output = &notebook.config.output;
            let dir = dir.unwrap_or_else(|| PathBuf::from(&output.export_dir));
            let path = backup::export_to_dir(notebook.store(), &dir, &output.app_name)
                .await
                .context("导出失败")?;
            println!("📄 备份文件：{}", path.display());

            if csv {
                let mut records = notebook.store().get_all().await?;
                sort_newest_first(&mut records);
                let csv_path = path.with_extension("csv");
                backup::export_csv(&records, &csv_path).context("导出 CSV 失败")?;
                println!("📄 CSV 摘要：{}", csv_path.display());
            }
        }
        Command::Import { file } => {
            let report = backup::import_file(notebook.store(), &file)
                .await
                .with_context(|| format!("导入 {} 失败", file.display()))?;
            println!("📥 成功导入 {} 条错题", report.imported.len());
            for skipped in &report.skipped {
                println!("  ⚠️ 跳过第 {} 条：{}", skipped.index + 1, skipped.reason);
            }
        }
    }
    Ok(())
}

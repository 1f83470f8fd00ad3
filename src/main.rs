use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::BufReader;

use doc_assistant::error::AppError;
use doc_assistant::models::load_document_file;
use doc_assistant::orchestrator::serve;
use doc_assistant::utils::logging;
use doc_assistant::{ChallengeQuestion, Config, Document, DocumentAssistant};

/// 基于 LLM 的文档助手
#[derive(Debug, Parser)]
#[command(name = "doc-assistant", version, about)]
struct Cli {
    /// TOML 配置文件（环境变量优先级更高）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出 debug 日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 生成文档摘要
    Summarize(DocumentArgs),
    /// 基于文档回答问题
    Ask {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(short, long)]
        question: String,
    },
    /// 生成理解题
    Challenge(DocumentArgs),
    /// 判定一道题的答案
    Evaluate {
        #[command(flatten)]
        document: DocumentArgs,
        #[arg(short, long)]
        question: String,
        #[arg(short, long, default_value = "")]
        answer: String,
        /// 题目序号
        #[arg(long, default_value_t = 1)]
        id: usize,
    },
    /// 从 stdin 逐行读取 JSON 请求，向 stdout 逐行输出 JSON 响应
    Serve,
}

#[derive(Debug, clap::Args)]
struct DocumentArgs {
    /// 文档路径（.pdf / .txt / .md）
    file: PathBuf,
    /// 覆盖按扩展名推断的类型（pdf / text）
    #[arg(long)]
    kind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load(cli.config.as_deref())?;

    // 初始化日志
    logging::init(cli.verbose || config.verbose_logging);
    logging::log_startup(&config);

    let assistant = DocumentAssistant::new(&config)?;

    match cli.command {
        Command::Summarize(args) => {
            let document = read_document(&assistant, &args).await?;
            print_json(assistant.summarize(&document).await)
        }
        Command::Ask { document, question } => {
            let document = read_document(&assistant, &document).await?;
            print_json(assistant.ask(&document, &question).await)
        }
        Command::Challenge(args) => {
            let document = read_document(&assistant, &args).await?;
            print_json(assistant.generate_challenge(&document).await)
        }
        Command::Evaluate {
            document,
            question,
            answer,
            id,
        } => {
            let document = read_document(&assistant, &document).await?;
            let question = ChallengeQuestion::new(id, question);
            print_json(assistant.evaluate_challenge(&document, &question, &answer).await)
        }
        Command::Serve => {
            let stats = serve(
                assistant,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                config.max_concurrent_requests,
            )
            .await?;
            if stats.failed > 0 {
                tracing::warn!("⚠️ {} 个请求失败", stats.failed);
            }
            Ok(())
        }
    }
}

async fn read_document(assistant: &DocumentAssistant, args: &DocumentArgs) -> Result<Document> {
    let raw = load_document_file(&args.file, args.kind.as_deref()).await?;
    assistant
        .load_document(raw.bytes, raw.kind)
        .await
        .map_err(describe)
}

fn print_json<T: Serialize>(result: Result<T, AppError>) -> Result<()> {
    let value = result.map_err(describe)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn describe(e: AppError) -> anyhow::Error {
    anyhow!("{} ({}, stage: {})", e, e.kind(), e.stage())
}

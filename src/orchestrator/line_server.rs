//! JSON-lines 服务循环 - 编排层
//!
//! ## 职责
//!
//! 1. **逐行读取**：每行一个 JSON 请求
//! 2. **并发控制**：使用 Semaphore 限制同时进行的请求数
//! 3. **结果输出**：每个请求完成后立即写出一行 JSON 响应（完成顺序，不保证与输入顺序一致，靠 `id` 对应）
//! 4. **统计**：输入结束后汇总成功/失败数量
//!
//! 读端关闭（EOF）时不再接收新请求，等待进行中的请求全部完成后返回。

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::orchestrator::api;
use crate::orchestrator::assistant::DocumentAssistant;

/// 处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub received: usize,
    pub success: usize,
    pub failed: usize,
}

/// 运行 JSON-lines 服务循环
///
/// # 参数
/// - `assistant`: 文档助手（每个请求 clone 一份）
/// - `reader`: 请求输入（通常是 stdin）
/// - `writer`: 响应输出（通常是 stdout）
/// - `max_concurrent`: 最大并发请求数
pub async fn serve<R, W>(
    assistant: DocumentAssistant,
    reader: R,
    writer: W,
    max_concurrent: usize,
) -> Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let max_concurrent = max_concurrent.max(1);
    info!("📡 开始接收请求 (最大并发数: {})", max_concurrent);

    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let (tx, rx) = mpsc::channel::<String>(max_concurrent * 2);
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut stats = ServeStats::default();
    let mut tasks = JoinSet::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        stats.received += 1;
        let request_index = stats.received;

        // 回收已完成的任务
        while let Some(joined) = tasks.try_join_next() {
            record(&mut stats, joined);
        }

        let permit = semaphore.clone().acquire_owned().await?;
        let assistant = assistant.clone();
        let tx = tx.clone();

        tasks.spawn(async move {
            let _permit = permit;
            debug!("[第 {} 行] 开始处理", request_index);
            let response = api::handle_line(&assistant, &line).await;
            let ok = response.is_ok();
            if tx.send(api::encode_response(&response)).await.is_err() {
                error!("[第 {} 行] 输出通道已关闭，响应丢失", request_index);
            }
            ok
        });
    }

    // 等待进行中的请求
    while let Some(joined) = tasks.join_next().await {
        record(&mut stats, joined);
    }

    drop(tx);
    writer_task.await??;

    log_serve_complete(&stats);
    Ok(stats)
}

fn record(stats: &mut ServeStats, joined: Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(true) => stats.success += 1,
        Ok(false) => stats.failed += 1,
        Err(e) => {
            error!("请求任务执行失败: {}", e);
            stats.failed += 1;
        }
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

fn log_serve_complete(stats: &ServeStats) {
    info!("\n{}", "─".repeat(60));
    info!("📊 输入结束，处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 成功: {}/{}", stats.success, stats.received);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "─".repeat(60));
}

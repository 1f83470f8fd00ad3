/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数。日志一律写到 stderr，
/// stdout 留给 JSON 结果。
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志
///
/// 优先使用 `RUST_LOG`；未设置时按 `verbose` 选择 debug 或 info。
/// 重复调用不会报错（测试中常见）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// 只输出非敏感配置，永远不打印 API 凭证
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 文档助手启动 - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("🤖 模型: {} @ {}", config.llm_model_name, config.llm_api_base_url);
    info!(
        "⏱️ 超时: {}s, 最多重试 {} 次",
        config.request_timeout_secs, config.max_retries
    );
    info!(
        "📄 文档预算: {} 字符, 每批 {} 道题",
        config.document_char_budget, config.challenge_batch_size
    );
    info!("📊 最大并发数: {}", config.max_concurrent_requests);
    info!(
        "🔑 API 凭证: {}",
        if config.llm_api_key.is_some() { "已配置" } else { "未配置" }
    );
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

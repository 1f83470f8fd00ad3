//! LLM 传输后端 - 基础设施层
//!
//! 持有唯一可复用的 HTTP 连接池（`reqwest::Client`），只暴露"发一次补全请求"的能力。
//!
//! ## 技术栈
//! - 使用 `async-openai` 的请求类型构建请求体
//! - 使用 `reqwest` 发送，自行按状态码归类错误（限流、鉴权、超时）
//! - 兼容 OpenAI API 的服务（Groq、OpenAI、本地推理网关等）

use std::time::Duration;

use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppResult, ConfigError, LlmError};
use crate::utils::logging::truncate_text;

/// 生成参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// 一次补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub params: GenerationParams,
}

/// LLM 后端能力
///
/// 实现者只负责一次网络调用，不做重试；必须可以被多个请求并发调用
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 返回模型的原始输出；没有内容时返回空字符串
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// OpenAI 兼容的 `/chat/completions` 后端
pub struct OpenAiCompatibleBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleBackend {
    /// 创建后端，缺少凭证时报配置错误
    pub fn new(config: &Config) -> AppResult<Self> {
        let api_key = config.require_api_key()?.to_string();
        let timeout = config.request_timeout();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.llm_api_base_url.trim_end_matches('/')),
            api_key,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        debug!("调用 LLM API，模型: {}", request.model);
        debug!("提示词长度: {} 字符", request.prompt.len());

        let body = build_request_body(request)?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    debug!("读取错误响应体失败: {}", e);
                    String::new()
                }
            };
            let err = classify_status(status.as_u16(), retry_after.as_deref(), &text);
            warn!("LLM API 返回 {}: {}", status.as_u16(), err);
            return Err(err);
        }

        // 读取失败是传输问题；2xx 但内容不是补全结构视为服务端拒绝，不重试
        let raw = response.text().await.map_err(|e| self.map_send_error(e))?;
        let completion: ChatCompletionBody = serde_json::from_str(&raw).map_err(|e| {
            warn!("LLM API 返回了无法解析的响应体: {}", truncate_text(&raw, 80));
            LlmError::Rejected {
                status: status.as_u16(),
                message: format!("malformed completion body: {}", e),
            }
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        debug!("LLM API 调用成功: {}", truncate_text(&content, 80));

        Ok(content.trim().to_string())
    }
}

impl OpenAiCompatibleBackend {
    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout { after: self.timeout }
        } else {
            LlmError::Transport {
                message: e.to_string(),
            }
        }
    }
}

/// 构建 OpenAI 格式的请求体
fn build_request_body(request: &ChatRequest) -> Result<impl serde::Serialize, LlmError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

    if let Some(sys_msg) = &request.system {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(sys_msg.as_str())
            .build()
            .map_err(request_build_error)?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));
    }

    let user_msg = ChatCompletionRequestUserMessageArgs::default()
        .content(request.prompt.as_str())
        .build()
        .map_err(request_build_error)?;
    messages.push(ChatCompletionRequestMessage::User(user_msg));

    CreateChatCompletionRequestArgs::default()
        .model(&request.model)
        .messages(messages)
        .temperature(request.params.temperature)
        .max_tokens(request.params.max_output_tokens)
        .build()
        .map_err(request_build_error)
}

fn request_build_error(e: impl std::fmt::Display) -> LlmError {
    LlmError::Request {
        message: e.to_string(),
    }
}

/// 按 HTTP 状态码归类错误
///
/// - 401 / 403 → 鉴权失败
/// - 429 → 限流（解析数字形式的 `Retry-After`）
/// - 408 → 超时
/// - 5xx → 传输错误（可重试）
/// - 其他 → 请求被拒绝
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth { status },
        429 => LlmError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
        },
        408 => LlmError::Timeout {
            after: Duration::ZERO,
        },
        500..=599 => LlmError::Transport {
            message: format!("server error {}: {}", status, truncate_text(body.trim(), 200)),
        },
        _ => LlmError::Rejected {
            status,
            message: truncate_text(body.trim(), 200),
        },
    }
}

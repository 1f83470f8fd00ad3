use std::time::Duration;

use serde::Serialize;

/// 请求处理阶段
///
/// 错误会标注它发生在哪个阶段，表现层据此决定如何提示用户
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 请求解码（JSON、base64、参数校验之前）
    Received,
    /// 文本提取
    Extracting,
    /// 构建提示词
    Prompting,
    /// 调用 LLM
    Inferring,
    /// 解析模型输出
    Parsing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Extracting => "extracting",
            Stage::Prompting => "prompting",
            Stage::Inferring => "inferring",
            Stage::Parsing => "parsing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 应用程序错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 请求本身不合法
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
    /// 文档相关错误
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
    /// LLM 服务错误
    #[error("inference error: {0}")]
    Llm(#[from] LlmError),
    /// 模型输出解析错误
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// 配置错误
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// 请求错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// JSON 请求无法解析
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    /// 文档 base64 内容无法解码
    #[error("document payload is not valid base64: {0}")]
    InvalidBase64(String),
    /// 文档既没有 text 也没有 base64
    #[error("document payload must carry either `text` or `base64`")]
    MissingPayload,
    /// 问题为空
    #[error("question must not be blank")]
    BlankQuestion,
}

/// 文档错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// 不支持的文档类型
    #[error("unsupported document kind `{kind}`; only pdf and text are accepted")]
    UnsupportedFormat { kind: String },
    /// 文档结构无法读取
    #[error("document could not be read: {reason}")]
    CorruptDocument { reason: String },
    /// 提取出的文本为空
    #[error("no text could be extracted from the document (a scanned PDF without a text layer?)")]
    EmptyDocument,
}

/// LLM 服务错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// 网络或连接失败，可重试
    #[error("could not reach the inference service: {message}")]
    Transport { message: String },
    /// 服务端限流，可重试
    #[error("the inference service is rate limiting requests")]
    RateLimited { retry_after: Option<Duration> },
    /// 凭证无效，不重试
    #[error("the inference service rejected the API credential (status {status})")]
    Auth { status: u16 },
    /// 超时
    #[error("the inference call did not finish within {}s", .after.as_secs_f32())]
    Timeout { after: Duration },
    /// 服务端拒绝请求（非限流、非鉴权的 4xx）
    #[error("the inference service rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    /// 请求体构建失败
    #[error("could not build the inference request: {message}")]
    Request { message: String },
}

impl LlmError {
    /// 是否属于可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transport { .. } | LlmError::RateLimited { .. })
    }
}

/// 模型输出解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// 模型返回空白内容
    #[error("the model returned an empty response")]
    EmptyResponse,
    /// 生成的题目数量不足
    #[error("expected {expected} questions but the model produced {found}")]
    IncompleteGeneration { expected: usize, found: usize },
    /// 找不到判定关键字
    #[error("no verdict (correct / partially correct / incorrect) found in the model output")]
    UnparseableVerdict { response: String },
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// 缺少 API 凭证
    #[error("no API credential configured (set LLM_API_KEY or GROQ_API_KEY)")]
    MissingApiKey,
    /// 配置值不合法
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 配置文件读取或解析失败
    #[error("could not load config file {path}: {reason}")]
    FileLoadFailed { path: String, reason: String },
    /// HTTP 客户端构建失败
    #[error("could not build the HTTP client: {reason}")]
    HttpClient { reason: String },
}

impl AppError {
    /// 稳定的、机器可读的错误类型
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Request(_) => "invalid_request",
            AppError::Document(e) => match e {
                DocumentError::UnsupportedFormat { .. } => "unsupported_format",
                DocumentError::CorruptDocument { .. } => "corrupt_document",
                DocumentError::EmptyDocument => "empty_document",
            },
            AppError::Llm(e) => match e {
                LlmError::Transport { .. } => "transport_error",
                LlmError::RateLimited { .. } => "rate_limited",
                LlmError::Auth { .. } => "auth_error",
                LlmError::Timeout { .. } => "timeout_error",
                LlmError::Rejected { .. } => "upstream_rejected",
                LlmError::Request { .. } => "invalid_request",
            },
            AppError::Parse(e) => match e {
                ParseError::EmptyResponse => "empty_response",
                ParseError::IncompleteGeneration { .. } => "incomplete_generation",
                ParseError::UnparseableVerdict { .. } => "unparseable_verdict",
            },
            AppError::Config(_) => "config_error",
        }
    }

    /// 错误发生的阶段
    pub fn stage(&self) -> Stage {
        match self {
            AppError::Request(RequestError::BlankQuestion) => Stage::Prompting,
            AppError::Request(_) | AppError::Config(_) => Stage::Received,
            AppError::Document(_) => Stage::Extracting,
            AppError::Llm(_) => Stage::Inferring,
            AppError::Parse(_) => Stage::Parsing,
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文档损坏错误
    pub fn corrupt_document(reason: impl std::fmt::Display) -> Self {
        AppError::Document(DocumentError::CorruptDocument {
            reason: reason.to_string(),
        })
    }

    /// 创建配置值错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

//! JSON 请求/响应协议 - 编排层
//!
//! 表现层通过一行 JSON 描述一次操作：
//!
//! ```json
//! {"id": 7, "operation": "ask",
//!  "document": {"kind": "text", "text": "The sky is blue during the day."},
//!  "question": "What color is the sky?"}
//! ```
//!
//! 响应固定为 `{"id": .., "status": "ok", "result": {..}}` 或
//! `{"id": .., "status": "error", "error": {"kind", "stage", "message"}}`。
//! 文档内容用 `text`（纯文本）或 `base64`（任意字节，PDF 必须用这种）传入。

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, RequestError, Stage};
use crate::models::{AnswerResult, ChallengeBatch, ChallengeQuestion, Document, Evaluation, SummaryResult};
use crate::orchestrator::assistant::DocumentAssistant;

/// 请求信封
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    /// 调用方自定义的请求标识，原样带回
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(flatten)]
    pub request: ApiRequest,
}

/// 操作请求
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ApiRequest {
    Summarize {
        document: DocumentPayload,
    },
    Ask {
        document: DocumentPayload,
        question: String,
    },
    GenerateChallenge {
        document: DocumentPayload,
    },
    EvaluateChallenge {
        document: DocumentPayload,
        question: ChallengeQuestion,
        #[serde(default)]
        user_answer: String,
    },
    EvaluateChallengeBatch {
        document: DocumentPayload,
        answers: Vec<AnswerPayload>,
    },
}

/// 文档载荷
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentPayload {
    /// `pdf` / `text`（也接受对应的 MIME 类型）
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
}

impl DocumentPayload {
    /// 取出原始字节，`text` 优先
    pub fn into_bytes(self) -> Result<Vec<u8>, RequestError> {
        match (self.text, self.base64) {
            (Some(text), _) => Ok(text.into_bytes()),
            (None, Some(encoded)) => BASE64
                .decode(encoded.trim())
                .map_err(|e| RequestError::InvalidBase64(e.to_string())),
            (None, None) => Err(RequestError::MissingPayload),
        }
    }
}

/// 批量判定中的一项
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerPayload {
    pub question: ChallengeQuestion,
    #[serde(default)]
    pub user_answer: String,
}

/// 操作结果
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ApiResult {
    Summary(SummaryResult),
    Answer(AnswerResult),
    Challenge(ChallengeBatch),
    Evaluation(Evaluation),
    Evaluations { evaluations: Vec<ApiOutcome> },
}

/// 成功或失败
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiOutcome {
    Ok { result: ApiResult },
    Error { error: ApiErrorBody },
}

impl From<AppResult<ApiResult>> for ApiOutcome {
    fn from(result: AppResult<ApiResult>) -> Self {
        match result {
            Ok(result) => ApiOutcome::Ok { result },
            Err(e) => ApiOutcome::Error {
                error: ApiErrorBody::from(&e),
            },
        }
    }
}

/// 结构化错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorBody {
    pub kind: String,
    pub stage: Stage,
    pub message: String,
}

impl From<&AppError> for ApiErrorBody {
    fn from(e: &AppError) -> Self {
        Self {
            kind: e.kind().to_string(),
            stage: e.stage(),
            message: e.to_string(),
        }
    }
}

/// 响应信封
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    #[serde(flatten)]
    pub outcome: ApiOutcome,
}

/// 执行一个已解码的请求
pub async fn handle(assistant: &DocumentAssistant, request: ApiRequest) -> AppResult<ApiResult> {
    match request {
        ApiRequest::Summarize { document } => {
            let document = load(assistant, document).await?;
            assistant.summarize(&document).await.map(ApiResult::Summary)
        }
        ApiRequest::Ask { document, question } => {
            let document = load(assistant, document).await?;
            assistant.ask(&document, &question).await.map(ApiResult::Answer)
        }
        ApiRequest::GenerateChallenge { document } => {
            let document = load(assistant, document).await?;
            assistant
                .generate_challenge(&document)
                .await
                .map(ApiResult::Challenge)
        }
        ApiRequest::EvaluateChallenge {
            document,
            question,
            user_answer,
        } => {
            let document = load(assistant, document).await?;
            assistant
                .evaluate_challenge(&document, &question, &user_answer)
                .await
                .map(ApiResult::Evaluation)
        }
        ApiRequest::EvaluateChallengeBatch { document, answers } => {
            let document = load(assistant, document).await?;
            let pairs: Vec<(ChallengeQuestion, String)> = answers
                .into_iter()
                .map(|a| (a.question, a.user_answer))
                .collect();
            let evaluations = assistant
                .evaluate_challenge_batch(&document, &pairs)
                .await
                .into_iter()
                .map(|r| ApiOutcome::from(r.map(ApiResult::Evaluation)))
                .collect();
            Ok(ApiResult::Evaluations { evaluations })
        }
    }
}

/// 处理一行 JSON 请求
///
/// 请求无法解析时也会返回结构化错误，并尽量带回 `id`
pub async fn handle_line(assistant: &DocumentAssistant, line: &str) -> ApiResponse {
    match decode_envelope(line) {
        Ok(envelope) => {
            let outcome = ApiOutcome::from(handle(assistant, envelope.request).await);
            ApiResponse {
                id: envelope.id,
                outcome,
            }
        }
        Err((id, e)) => {
            warn!("请求无法解析: {}", e);
            ApiResponse {
                id,
                outcome: ApiOutcome::from(Err::<ApiResult, _>(e)),
            }
        }
    }
}

/// 处理一行 JSON 请求，返回一行 JSON 响应
pub async fn handle_json(assistant: &DocumentAssistant, line: &str) -> String {
    encode_response(&handle_line(assistant, line).await)
}

/// 编码响应（单行，无换行符）
pub fn encode_response(response: &ApiResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(
            r#"{{"status":"error","error":{{"kind":"invalid_request","stage":"received","message":"response could not be encoded: {}"}}}}"#,
            e.to_string().replace('"', "'")
        )
    })
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ApiOutcome::Ok { .. })
    }
}

fn decode_envelope(line: &str) -> Result<ApiEnvelope, (Option<JsonValue>, AppError)> {
    let value: JsonValue = serde_json::from_str(line)
        .map_err(|e| (None, AppError::from(RequestError::MalformedBody(e.to_string()))))?;
    let id = value.get("id").cloned();
    serde_json::from_value(value)
        .map_err(|e| (id, AppError::from(RequestError::MalformedBody(e.to_string()))))
}

async fn load(assistant: &DocumentAssistant, payload: DocumentPayload) -> AppResult<Document> {
    let kind = payload.kind.clone();
    let bytes = payload.into_bytes()?;
    debug!("收到文档: {} 类型, {} 字节", kind, bytes.len());
    assistant.load_declared(bytes, &kind).await
}

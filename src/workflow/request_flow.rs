//! 请求处理流程 - 流程层
//!
//! 核心职责：定义"一次请求"的完整处理流程
//!
//! 状态顺序：
//! Received → Extracting → Prompting → Inferring → Parsing → Completed
//!
//! 任一阶段失败都进入 `Failed { stage }`，之后不再进入后续阶段。

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, DocumentError, Stage};
use crate::models::Document;
use crate::services::{InferenceClient, ParseOutcome, PromptBuilder, Task};
use crate::utils::logging::truncate_text;
use crate::workflow::request_ctx::RequestCtx;

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Extracting,
    Prompting,
    Inferring,
    Parsing,
    Completed,
    Failed { stage: Stage },
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed { .. })
    }
}

/// 流程输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOutput<T> {
    pub value: T,
    /// 发给模型的文档是否被截断
    pub document_truncated: bool,
}

/// 请求处理流程
///
/// - 编排单个请求从文档到结构化结果的全过程
/// - 决定何时拒绝（空文档、空问题）、何时调用模型、何时解析
/// - 不持有文档，不缓存任何东西，可被并发调用
#[derive(Clone)]
pub struct RequestFlow {
    prompt_builder: PromptBuilder,
    inference: InferenceClient,
    verbose_logging: bool,
}

impl RequestFlow {
    /// 创建新的请求处理流程
    pub fn new(config: &Config, inference: InferenceClient) -> Self {
        Self {
            prompt_builder: PromptBuilder::new(config),
            inference,
            verbose_logging: config.verbose_logging,
        }
    }

    pub fn prompt_builder(&self) -> &PromptBuilder {
        &self.prompt_builder
    }

    /// 执行一次请求
    ///
    /// # 参数
    /// - `ctx`: 日志上下文
    /// - `document`: 已提取的文档
    /// - `task`: 任务类型
    /// - `parse`: 把模型原始输出解析成结构化结果
    pub async fn run<T, F>(
        &self,
        ctx: &RequestCtx,
        document: &Document,
        task: Task<'_>,
        parse: F,
    ) -> AppResult<FlowOutput<T>>
    where
        F: FnOnce(&str) -> ParseOutcome<T>,
    {
        let mut state = RequestState::Received;
        let result = self.drive(ctx, document, &task, parse, &mut state).await;

        match &result {
            Ok(output) => {
                self.transition(ctx, &mut state, RequestState::Completed);
                if output.document_truncated {
                    info!("{} ✓ 完成（文档已截断）", ctx);
                } else {
                    info!("{} ✓ 完成", ctx);
                }
            }
            Err(e) => {
                let failed = RequestState::Failed { stage: e.stage() };
                self.transition(ctx, &mut state, failed);
                warn!("{} ❌ 在 {} 阶段失败: {}", ctx, e.stage(), e);
            }
        }

        result
    }

    async fn drive<T, F>(
        &self,
        ctx: &RequestCtx,
        document: &Document,
        task: &Task<'_>,
        parse: F,
        state: &mut RequestState,
    ) -> AppResult<FlowOutput<T>>
    where
        F: FnOnce(&str) -> ParseOutcome<T>,
    {
        // ========== 文本检查 ==========
        self.transition(ctx, state, RequestState::Extracting);
        if document.is_blank() {
            return Err(DocumentError::EmptyDocument.into());
        }

        // ========== 构建提示词 ==========
        self.transition(ctx, state, RequestState::Prompting);
        let prompt = self.prompt_builder.build(task, document.text())?;
        if prompt.truncated {
            info!(
                "{} 文档超出预算，已截断: {} → {} 字符",
                ctx, prompt.original_chars, prompt.kept_chars
            );
        }

        // ========== 调用模型 ==========
        self.transition(ctx, state, RequestState::Inferring);
        let raw = self.inference.infer(&prompt.text).await?;
        if self.verbose_logging {
            info!("{} 模型输出: {}", ctx, truncate_text(&raw, 200));
        }

        // ========== 解析输出 ==========
        self.transition(ctx, state, RequestState::Parsing);
        let value = parse(&raw).into_result().map_err(AppError::from)?;

        Ok(FlowOutput {
            value,
            document_truncated: prompt.truncated,
        })
    }

    fn transition(&self, ctx: &RequestCtx, state: &mut RequestState, next: RequestState) {
        debug!("{} {:?} → {:?}", ctx, state, next);
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, ParseError};
    use crate::infrastructure::{ChatBackend, ChatRequest};
    use crate::services::response_parser;
    use crate::workflow::Operation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedBackend {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for FixedBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn flow(reply: &str) -> (RequestFlow, Arc<FixedBackend>) {
        let backend = Arc::new(FixedBackend {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        });
        let config = Config::default();
        let inference = InferenceClient::new(&config, backend.clone());
        (RequestFlow::new(&config, inference), backend)
    }

    #[tokio::test]
    async fn test_blank_document_never_reaches_model() {
        let (flow, backend) = flow("anything");
        let ctx = RequestCtx::new(Operation::Summarize);
        let err = flow
            .run(&ctx, &Document::from_text(" \n\t "), Task::Summarize, response_parser::parse_summary)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "empty_document");
        assert_eq!(err.stage(), Stage::Extracting);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_question_fails_at_prompting() {
        let (flow, backend) = flow("anything");
        let ctx = RequestCtx::new(Operation::Ask);
        let err = flow
            .run(
                &ctx,
                &Document::from_text("The sky is blue."),
                Task::Ask { question: "" },
                response_parser::parse_answer,
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Prompting);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_model_output_fails_at_parsing() {
        let (flow, _) = flow("   ");
        let ctx = RequestCtx::new(Operation::Summarize);
        let err = flow
            .run(&ctx, &Document::from_text("Some text."), Task::Summarize, response_parser::parse_summary)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Parse(ParseError::EmptyResponse)));
        assert_eq!(err.stage(), Stage::Parsing);
    }

    #[tokio::test]
    async fn test_successful_run_reports_truncation() {
        let (flow, backend) = flow("A short summary.");
        let ctx = RequestCtx::new(Operation::Summarize);
        let long = "word ".repeat(5000);
        let output = flow
            .run(&ctx, &Document::from_text(long), Task::Summarize, response_parser::parse_summary)
            .await
            .unwrap();
        assert_eq!(output.value, "A short summary.");
        assert!(output.document_truncated);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_terminal_states() {
        assert!(RequestState::Completed.is_terminal());
        assert!(RequestState::Failed { stage: Stage::Parsing }.is_terminal());
        assert!(!RequestState::Inferring.is_terminal());
    }
}

//! 文档助手 - 编排层
//!
//! ## 职责
//!
//! 对外提供四个无状态操作，每个操作都是一次独立的请求：
//!
//! 1. **summarize**：生成文档摘要
//! 2. **ask**：基于文档回答问题并给出依据
//! 3. **generate_challenge**：生成一批理解题
//! 4. **evaluate_challenge**：判定用户答案
//!
//! ## 设计特点
//!
//! - **无状态**：不缓存文档，不保存会话，调用方每次都要带上文档
//! - **可并发**：`DocumentAssistant` 可以 clone 到多个任务里同时使用
//! - **可取消**：丢弃返回的 future 即可取消，进行中的 HTTP 请求随之中止

use std::sync::Arc;

use futures::future::join_all;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{ChatBackend, OpenAiCompatibleBackend};
use crate::models::{
    AnswerResult, ChallengeBatch, ChallengeQuestion, Document, Evaluation, MimeKind, SummaryResult,
    Verdict,
};
use crate::services::{response_parser, InferenceClient, Task, TextExtractor};
use crate::workflow::{Operation, RequestCtx, RequestFlow};

/// 用户没有作答时的固定理由
pub const NO_ANSWER_JUSTIFICATION: &str = "No answer provided.";

/// 文档助手
#[derive(Clone)]
pub struct DocumentAssistant {
    flow: Arc<RequestFlow>,
    extractor: TextExtractor,
}

impl DocumentAssistant {
    /// 使用真实的 OpenAI 兼容后端创建
    ///
    /// 配置不合法或缺少 API 凭证时返回 `config_error`
    pub fn new(config: &Config) -> AppResult<Self> {
        config.validate()?;
        let backend = OpenAiCompatibleBackend::new(config)?;
        info!("✓ LLM 后端就绪: {}", backend.endpoint());
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// 使用任意后端创建（测试中注入桩实现）
    pub fn with_backend(config: &Config, backend: Arc<dyn ChatBackend>) -> Self {
        let inference = InferenceClient::new(config, backend);
        Self::with_inference(config, inference)
    }

    /// 使用已配置好的推理客户端创建
    pub fn with_inference(config: &Config, inference: InferenceClient) -> Self {
        Self {
            flow: Arc::new(RequestFlow::new(config, inference)),
            extractor: TextExtractor::new(),
        }
    }

    /// 提取文档文本
    ///
    /// PDF 解析是 CPU 密集操作，放到阻塞线程池里执行
    pub async fn load_document(&self, payload: Vec<u8>, kind: MimeKind) -> AppResult<Document> {
        let extractor = self.extractor;
        let document = tokio::task::spawn_blocking(move || extractor.load(&payload, kind))
            .await
            .map_err(|e| AppError::corrupt_document(format!("extraction task failed: {}", e)))??;
        Ok(document)
    }

    /// 按声明的类型字符串提取文档文本
    pub async fn load_declared(&self, payload: Vec<u8>, declared_kind: &str) -> AppResult<Document> {
        let kind = MimeKind::parse(declared_kind)?;
        self.load_document(payload, kind).await
    }

    /// 生成摘要
    pub async fn summarize(&self, document: &Document) -> AppResult<SummaryResult> {
        let ctx = RequestCtx::new(Operation::Summarize);
        info!("{} 📝 开始生成摘要 ({} 字符)", ctx, document.char_count());

        let output = self
            .flow
            .run(&ctx, document, Task::Summarize, response_parser::parse_summary)
            .await?;

        Ok(SummaryResult {
            summary: output.value,
            document_truncated: output.document_truncated,
        })
    }

    /// 基于文档回答问题
    pub async fn ask(&self, document: &Document, question: &str) -> AppResult<AnswerResult> {
        let ctx = RequestCtx::new(Operation::Ask);
        info!("{} ❓ 提问: {}", ctx, question.trim());

        let output = self
            .flow
            .run(&ctx, document, Task::Ask { question }, response_parser::parse_answer)
            .await?;

        Ok(AnswerResult {
            answer_text: output.value.answer,
            justification_text: output.value.justification,
            document_truncated: output.document_truncated,
        })
    }

    /// 生成一批理解题
    ///
    /// 要么得到完整的一批，要么失败，不返回部分结果
    pub async fn generate_challenge(&self, document: &Document) -> AppResult<ChallengeBatch> {
        let ctx = RequestCtx::new(Operation::GenerateChallenge);
        let expected = self.flow.prompt_builder().question_count();
        info!("{} 🎯 生成 {} 道理解题", ctx, expected);

        let output = self
            .flow
            .run(&ctx, document, Task::GenerateQuestions, |raw| {
                response_parser::parse_questions(raw, expected)
            })
            .await?;

        let questions = output
            .value
            .into_iter()
            .enumerate()
            .map(|(idx, text)| ChallengeQuestion::new(idx + 1, text))
            .collect();

        Ok(ChallengeBatch {
            questions,
            document_truncated: output.document_truncated,
        })
    }

    /// 判定用户答案
    ///
    /// 空白答案直接判为错误，不调用模型
    pub async fn evaluate_challenge(
        &self,
        document: &Document,
        question: &ChallengeQuestion,
        user_answer: &str,
    ) -> AppResult<Evaluation> {
        let ctx = RequestCtx::new(Operation::EvaluateChallenge).with_question(question.id);

        if user_answer.trim().is_empty() && !document.is_blank() && !question.question_text.trim().is_empty() {
            info!("{} 用户未作答，直接判为错误", ctx);
            return Ok(Evaluation {
                question_id: question.id,
                user_answer: user_answer.to_string(),
                verdict: Verdict::Incorrect,
                justification_text: NO_ANSWER_JUSTIFICATION.to_string(),
                supporting_excerpt: None,
                document_truncated: self.flow.prompt_builder().would_truncate(document.text()),
            });
        }

        info!("{} ⚖️ 判定答案", ctx);
        let task = Task::EvaluateAnswer {
            question: &question.question_text,
            user_answer,
        };
        let output = self
            .flow
            .run(&ctx, document, task, |raw| {
                response_parser::parse_evaluation(raw, document.text())
            })
            .await?;

        info!("{} 判定结果: {}", ctx, output.value.verdict);

        Ok(Evaluation {
            question_id: question.id,
            user_answer: user_answer.to_string(),
            verdict: output.value.verdict,
            justification_text: output.value.justification,
            supporting_excerpt: output.value.supporting_excerpt,
            document_truncated: output.document_truncated,
        })
    }

    /// 并发判定多道题
    ///
    /// 每道题的结果相互独立，顺序与输入一致
    pub async fn evaluate_challenge_batch(
        &self,
        document: &Document,
        answers: &[(ChallengeQuestion, String)],
    ) -> Vec<AppResult<Evaluation>> {
        info!("⚖️ 批量判定 {} 道题", answers.len());
        let futures = answers
            .iter()
            .map(|(question, answer)| self.evaluate_challenge(document, question, answer));
        join_all(futures).await
    }
}

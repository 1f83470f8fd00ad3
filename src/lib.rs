//! # Doc Assistant
//!
//! 基于 LLM 的文档助手后端：摘要、问答、出题、判题
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（HTTP 连接池），只暴露能力
//! - `ChatBackend` - LLM 补全能力（可替换为测试桩）
//! - `OpenAiCompatibleBackend` - OpenAI 兼容接口的实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个文件一种能力
//! - `TextExtractor` - PDF / 纯文本提取
//! - `PromptBuilder` - 按任务构建提示词（含截断）
//! - `InferenceClient` - 超时 + 重试
//! - `response_parser` - 防御式解析模型输出
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次请求"的完整处理流程
//! - `RequestCtx` - 上下文封装（请求序号 + 操作）
//! - `RequestFlow` - 状态机（extract → prompt → infer → parse）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/assistant` - 四个对外操作
//! - `orchestrator/api` - JSON 请求/响应协议
//! - `orchestrator/line_server` - JSON-lines 服务循环
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, Stage};
pub use infrastructure::{ChatBackend, ChatRequest, OpenAiCompatibleBackend};
pub use models::{
    AnswerResult, ChallengeBatch, ChallengeQuestion, Document, Evaluation, MimeKind, SummaryResult,
    Verdict,
};
pub use orchestrator::DocumentAssistant;
pub use services::{InferenceClient, ParseOutcome, RetryPolicy};
pub use workflow::{RequestCtx, RequestFlow};

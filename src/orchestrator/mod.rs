//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层把能力层和流程层组合成对外的操作，是表现层唯一接触的入口。
//!
//! ## 模块划分
//!
//! ### `assistant` - 文档助手
//! - 四个无状态操作：summarize / ask / generate_challenge / evaluate_challenge
//! - 批量判定（并发、保序）
//! - 文档提取（阻塞线程池）
//!
//! ### `api` - JSON 协议
//! - 请求/响应信封
//! - 把 `AppError` 转成带 kind + stage 的结构化错误
//!
//! ### `line_server` - JSON-lines 服务循环
//! - 逐行读取请求，Semaphore 控制并发
//! - 输出统计信息
//!
//! ## 层次关系
//!
//! ```text
//! line_server (处理请求流)
//!     ↓
//! api (处理单个 JSON 请求)
//!     ↓
//! assistant (处理单个操作)
//!     ↓
//! workflow::RequestFlow (单个请求的状态机)
//!     ↓
//! services (能力层：extract / prompt / infer / parse)
//!     ↓
//! infrastructure (基础设施：ChatBackend)
//! ```

pub mod api;
pub mod assistant;
pub mod line_server;

// 重新导出主要类型
pub use api::{handle, handle_json, ApiRequest, ApiResponse};
pub use assistant::DocumentAssistant;
pub use line_server::{serve, ServeStats};

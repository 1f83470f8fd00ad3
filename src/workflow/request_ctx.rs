//! 请求处理上下文
//!
//! 封装"我正在处理哪个请求的哪种操作"这一信息

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// 对外提供的四种操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Summarize,
    Ask,
    GenerateChallenge,
    EvaluateChallenge,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Summarize => "summarize",
            Operation::Ask => "ask",
            Operation::GenerateChallenge => "generate_challenge",
            Operation::EvaluateChallenge => "evaluate_challenge",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求处理上下文
///
/// 只用于日志定位，不参与业务判断
#[derive(Debug, Clone)]
pub struct RequestCtx {
    /// 进程内自增的请求序号
    pub request_id: u64,

    pub operation: Operation,

    /// 评估时对应的题目序号
    pub question_id: Option<usize>,
}

impl RequestCtx {
    /// 创建新的请求上下文，自动分配序号
    pub fn new(operation: Operation) -> Self {
        Self {
            request_id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            operation,
            question_id: None,
        }
    }

    pub fn with_question(mut self, question_id: usize) -> Self {
        self.question_id = Some(question_id);
        self
    }
}

impl Display for RequestCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.question_id {
            Some(qid) => write!(
                f,
                "[请求 #{} {} 题目#{}]",
                self.request_id, self.operation, qid
            ),
            None => write!(f, "[请求 #{} {}]", self.request_id, self.operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestCtx::new(Operation::Ask);
        let b = RequestCtx::new(Operation::Ask);
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_display_includes_question() {
        let ctx = RequestCtx::new(Operation::EvaluateChallenge).with_question(2);
        let shown = ctx.to_string();
        assert!(shown.contains("evaluate_challenge"));
        assert!(shown.contains("题目#2"));
    }
}

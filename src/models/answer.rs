use serde::{Deserialize, Serialize};

/// 问答结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer_text: String,
    /// 模型没有按格式给出理由时为空字符串
    pub justification_text: String,
    pub document_truncated: bool,
}

/// 摘要结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub document_truncated: bool,
}

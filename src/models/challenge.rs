use serde::{Deserialize, Serialize};

/// 挑战题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeQuestion {
    /// 批次内序号（从 1 开始）
    pub id: usize,
    pub question_text: String,
}

impl ChallengeQuestion {
    pub fn new(id: usize, question_text: impl Into<String>) -> Self {
        Self {
            id,
            question_text: question_text.into(),
        }
    }
}

/// 一次生成的完整题目批次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeBatch {
    pub questions: Vec<ChallengeQuestion>,
    pub document_truncated: bool,
}

/// 判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    PartiallyCorrect,
    Incorrect,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Correct => "correct",
            Verdict::PartiallyCorrect => "partially_correct",
            Verdict::Incorrect => "incorrect",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对一条用户答案的评估
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub question_id: usize,
    pub user_answer: String,
    pub verdict: Verdict,
    pub justification_text: String,
    /// 文档中支撑判定的原文片段
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_excerpt: Option<String>,
    pub document_truncated: bool,
}

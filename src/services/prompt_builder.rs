//! 提示词构建服务 - 业务能力层
//!
//! 每个任务一个纯函数，负责把文档文本和用户输入拼成提示词
//!
//! ## 截断策略
//!
//! 文档超过字符预算时保留开头 `char_budget` 个字符（按 Unicode 标量计数，
//! 不会切断字符），其余丢弃。截断是确定性的，并通过 `Prompt::truncated`
//! 告知调用方，同时在提示词里注明。

use crate::config::Config;
use crate::error::RequestError;

/// 回答标签
pub const ANSWER_LABEL: &str = "Answer:";
/// 理由标签
pub const JUSTIFICATION_LABEL: &str = "Justification:";
/// 判定标签
pub const VERDICT_LABEL: &str = "Verdict:";
/// 原文摘录标签
pub const EXCERPT_LABEL: &str = "Excerpt:";

/// 文档中找不到答案时要求模型使用的固定回答
pub const NOT_IN_DOCUMENT_ANSWER: &str =
    "The document does not contain enough information to answer this question.";

/// 任务类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task<'a> {
    Summarize,
    Ask { question: &'a str },
    GenerateQuestions,
    EvaluateAnswer { question: &'a str, user_answer: &'a str },
}

/// 构建好的提示词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    /// 文档是否被截断
    pub truncated: bool,
    pub original_chars: usize,
    pub kept_chars: usize,
}

/// 截断后的文档片段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentExcerpt<'a> {
    pub text: &'a str,
    pub truncated: bool,
    pub original_chars: usize,
    pub kept_chars: usize,
}

/// 头部截断
pub fn truncate_document(text: &str, char_budget: usize) -> DocumentExcerpt<'_> {
    let original_chars = text.chars().count();
    if original_chars <= char_budget {
        return DocumentExcerpt {
            text,
            truncated: false,
            original_chars,
            kept_chars: original_chars,
        };
    }

    let cut = text
        .char_indices()
        .nth(char_budget)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    DocumentExcerpt {
        text: &text[..cut],
        truncated: true,
        original_chars,
        kept_chars: char_budget,
    }
}

/// 提示词构建服务
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    char_budget: usize,
    question_count: usize,
    summary_max_words: usize,
}

impl PromptBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            char_budget: config.document_char_budget,
            question_count: config.challenge_batch_size,
            summary_max_words: config.summary_max_words,
        }
    }

    pub fn with_limits(char_budget: usize, question_count: usize, summary_max_words: usize) -> Self {
        Self {
            char_budget,
            question_count,
            summary_max_words,
        }
    }

    pub fn question_count(&self) -> usize {
        self.question_count
    }

    /// 给定文档在当前预算下是否会被截断
    pub fn would_truncate(&self, document_text: &str) -> bool {
        truncate_document(document_text, self.char_budget).truncated
    }

    /// 按任务构建提示词
    ///
    /// 问题为空时返回 `BlankQuestion`；空白的用户答案不在这里拦截
    pub fn build(&self, task: &Task<'_>, document_text: &str) -> Result<Prompt, RequestError> {
        let excerpt = truncate_document(document_text, self.char_budget);
        let document_block = render_document_block(&excerpt);

        let text = match task {
            Task::Summarize => summarize_prompt(&document_block, self.summary_max_words),
            Task::Ask { question } => {
                let question = non_blank(question)?;
                ask_prompt(&document_block, question)
            }
            Task::GenerateQuestions => generate_questions_prompt(&document_block, self.question_count),
            Task::EvaluateAnswer {
                question,
                user_answer,
            } => {
                let question = non_blank(question)?;
                evaluate_answer_prompt(&document_block, question, user_answer.trim())
            }
        };

        Ok(Prompt {
            text,
            truncated: excerpt.truncated,
            original_chars: excerpt.original_chars,
            kept_chars: excerpt.kept_chars,
        })
    }
}

fn non_blank(s: &str) -> Result<&str, RequestError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Err(RequestError::BlankQuestion)
    } else {
        Ok(trimmed)
    }
}

fn render_document_block(excerpt: &DocumentExcerpt<'_>) -> String {
    if excerpt.truncated {
        format!(
            "<document>\n{}\n</document>\n(Note: the document was truncated; only the first {} of {} characters are shown.)",
            excerpt.text, excerpt.kept_chars, excerpt.original_chars
        )
    } else {
        format!("<document>\n{}\n</document>", excerpt.text)
    }
}

pub fn summarize_prompt(document_block: &str, max_words: usize) -> String {
    format!(
        r#"Summarize the document below in a few sentences, using no more than {max_words} words.

Rules:
1) Use ONLY information stated in the document. Do not add outside facts or opinions.
2) Focus on the main points and key takeaways.
3) Return the summary text only, with no heading or preamble.

{document_block}"#
    )
}

pub fn ask_prompt(document_block: &str, question: &str) -> String {
    format!(
        r#"Answer the question using ONLY the document below.

Rules:
1) Do not use outside knowledge and do not guess.
2) Justify the answer by quoting or pointing to the sentence or paragraph of the document that supports it.
3) If the document does not contain the information, answer exactly: "{NOT_IN_DOCUMENT_ANSWER}"

Format your response exactly as:
{ANSWER_LABEL} <your answer>
{JUSTIFICATION_LABEL} <the supporting reference from the document>

{document_block}

Question: {question}"#
    )
}

pub fn generate_questions_prompt(document_block: &str, count: usize) -> String {
    format!(
        r#"Write exactly {count} distinct questions that test logical reasoning and comprehension of the document below.

Rules:
1) Every question must be answerable from the document alone.
2) Prefer questions that need understanding or inference over plain recall.
3) Output exactly {count} lines, one question per line, numbered "1." to "{count}.".
4) Output nothing else: no heading, no answers, no blank lines between questions.

{document_block}"#
    )
}

pub fn evaluate_answer_prompt(document_block: &str, question: &str, user_answer: &str) -> String {
    format!(
        r#"Judge whether the user's answer to the question is correct, using ONLY the document below.

Rules:
1) Choose one verdict: Correct, Partially Correct, or Incorrect.
2) Justify the verdict with reference to the document.
3) Quote the single most relevant sentence of the document as the excerpt, copied verbatim.

Format your response exactly as:
{VERDICT_LABEL} <Correct | Partially Correct | Incorrect>
{JUSTIFICATION_LABEL} <why, with reference to the document>
{EXCERPT_LABEL} "<verbatim sentence from the document>"

{document_block}

Question: {question}
User's answer: {user_answer}"#
    )
}

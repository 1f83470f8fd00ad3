//! 模型输出解析 - 业务能力层
//!
//! 不信任模型的输出格式：尽量宽松地解析，实在恢复不出最小可用结构时
//! 返回 `ParseOutcome::Malformed`，由调用方显式处理。

use std::collections::HashSet;
use std::sync::LazyLock;

use phf::phf_map;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::ParseError;
use crate::models::Verdict;

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ParseOutcome<T> {
    Parsed(T),
    Malformed(ParseError),
}

impl<T> ParseOutcome<T> {
    pub fn into_result(self) -> Result<T, ParseError> {
        match self {
            ParseOutcome::Parsed(value) => Ok(value),
            ParseOutcome::Malformed(reason) => Err(reason),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }
}

/// 问答解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnswer {
    pub answer: String,
    pub justification: String,
}

/// 评估解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvaluation {
    pub verdict: Verdict,
    pub justification: String,
    pub supporting_excerpt: Option<String>,
}

/// 否定词与判定关键字之间最多相隔的词数（含否定词本身）
const NEGATION_WINDOW: usize = 3;

/// 判定关键字 → 判定结果（关键字已小写、空白已归一）
static VERDICT_WORDS: phf::Map<&'static str, Verdict> = phf_map! {
    "correct" => Verdict::Correct,
    "partially correct" => Verdict::PartiallyCorrect,
    "partly correct" => Verdict::PartiallyCorrect,
    "partially" => Verdict::PartiallyCorrect,
    "partly" => Verdict::PartiallyCorrect,
    "incorrect" => Verdict::Incorrect,
    "not correct" => Verdict::Incorrect,
    "wrong" => Verdict::Incorrect,
};

// 同一位置上较长的短语排在前面
static VERDICT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(partially\s+correct|partly\s+correct|partially|partly|not\s+correct|incorrect|wrong|correct)\b")
        .expect("static regex")
});

static ANSWER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t*_#>-]*answer[ \t*_]*:[ \t*_]*").expect("static regex")
});

static JUSTIFICATION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bjustification\b[ \t*_]*:[ \t*_]*").expect("static regex")
});

static VERDICT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t*_#>-]*(?:verdict|evaluation)[ \t*_]*:[ \t*_]*(.*)$").expect("static regex")
});

static EXCERPT_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t*_#>-]*(?:excerpt|quote|supporting excerpt)[ \t*_]*:[ \t*_]*").expect("static regex")
});

static QUOTED_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"\n]{4,})"|“([^”\n]{4,})”"#).expect("static regex")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:q(?:uestion)?[ \t]*)?\d+[ \t]*[.):\]-]|\(\d+\)|[-*•][ \t])[ \t*_]*").expect("static regex")
});

/// 摘要：去掉首尾空白即可
pub fn parse_summary(raw: &str) -> ParseOutcome<String> {
    let summary = raw.trim();
    if summary.is_empty() {
        return ParseOutcome::Malformed(ParseError::EmptyResponse);
    }
    ParseOutcome::Parsed(summary.to_string())
}

/// 问答：按 `Justification:` 分隔答案和理由
///
/// 没有分隔符时整段都是答案、理由为空，这种格式漂移不算错误
pub fn parse_answer(raw: &str) -> ParseOutcome<ParsedAnswer> {
    let text = raw.trim();
    if text.is_empty() {
        return ParseOutcome::Malformed(ParseError::EmptyResponse);
    }

    let (answer_part, justification) = match JUSTIFICATION_LABEL.find(text) {
        Some(m) => (&text[..m.start()], clean_fragment(&text[m.end()..])),
        None => (text, String::new()),
    };

    // 标签前的寒暄丢掉，以最后一个 `Answer:` 为准
    let answer_body = match ANSWER_LABEL.find_iter(answer_part).last() {
        Some(m) => &answer_part[m.end()..],
        None => answer_part,
    };
    let answer = clean_fragment(answer_body);
    if answer.is_empty() && justification.is_empty() {
        return ParseOutcome::Malformed(ParseError::EmptyResponse);
    }

    ParseOutcome::Parsed(ParsedAnswer {
        answer,
        justification,
    })
}

/// 题目列表：必须恰好得到 `expected` 道题，多了保留前 `expected` 道
pub fn parse_questions(raw: &str, expected: usize) -> ParseOutcome<Vec<String>> {
    let text = raw.trim();
    if text.is_empty() {
        return ParseOutcome::Malformed(ParseError::EmptyResponse);
    }

    let candidates = questions_from_json(text).unwrap_or_else(|| questions_from_lines(text));

    let mut seen = HashSet::new();
    let mut questions: Vec<String> = candidates
        .into_iter()
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .collect();

    if questions.len() < expected {
        return ParseOutcome::Malformed(ParseError::IncompleteGeneration {
            expected,
            found: questions.len(),
        });
    }

    questions.truncate(expected);
    ParseOutcome::Parsed(questions)
}

/// 评估：找判定关键字，其余作为理由
pub fn parse_evaluation(raw: &str, document_text: &str) -> ParseOutcome<ParsedEvaluation> {
    let text = raw.trim();
    if text.is_empty() {
        return ParseOutcome::Malformed(ParseError::EmptyResponse);
    }

    // 先看 Verdict:/Evaluation: 标签行，再退回全文最早出现的关键字
    let labelled = VERDICT_LINE.captures(text).and_then(|caps| {
        let line = caps.get(0)?;
        let value = caps.get(1)?.as_str();
        find_verdict(value).map(|verdict| (verdict, line.start(), line.end()))
    });

    // 无标签时只有行首的关键字会被剥掉，句中的关键字保留在理由里
    let found = labelled.or_else(|| {
        let m = VERDICT_KEYWORD.find(text)?;
        let verdict = verdict_at(text, &m)?;
        let line_start = text[..m.start()].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let prefix = &text[line_start..m.start()];
        if prefix.trim_matches(|c: char| matches!(c, '*' | '_' | '#' | '>' | '-') || c.is_whitespace()).is_empty() {
            let tail = &text[m.end()..];
            let skipped = tail.len()
                - tail
                    .trim_start_matches(|c: char| matches!(c, '.' | ':' | '!' | ',' | ';' | '-' | '*' | '_'))
                    .len();
            Some((verdict, line_start, m.end() + skipped))
        } else {
            Some((verdict, 0, 0))
        }
    });

    let Some((verdict, remove_start, remove_end)) = found else {
        return ParseOutcome::Malformed(ParseError::UnparseableVerdict {
            response: text.to_string(),
        });
    };

    let (body, excerpt_label) = split_excerpt(text);

    let justification = match JUSTIFICATION_LABEL.find(body) {
        Some(m) => clean_fragment(&body[m.end()..]),
        None => {
            let mut rest = String::new();
            rest.push_str(&text[..remove_start]);
            rest.push_str(&text[remove_end..]);
            let (rest_body, _) = split_excerpt(&rest);
            clean_fragment(rest_body)
        }
    };

    let supporting_excerpt = excerpt_label
        .and_then(|e| grounded_excerpt(&e, document_text))
        .or_else(|| first_quoted_span(&justification, document_text));

    ParseOutcome::Parsed(ParsedEvaluation {
        verdict,
        justification,
        supporting_excerpt,
    })
}

// ========== 辅助函数 ==========

fn find_verdict(text: &str) -> Option<Verdict> {
    VERDICT_KEYWORD
        .find(text)
        .and_then(|m| verdict_at(text, &m))
}

/// 关键字前面带否定词时："correct" 反转为 Incorrect，其余关键字无法判断
fn verdict_at(text: &str, m: &regex::Match<'_>) -> Option<Verdict> {
    let verdict = lookup_verdict(m.as_str())?;
    if !is_negated(&text[..m.start()]) {
        return Some(verdict);
    }
    match verdict {
        Verdict::Correct => Some(Verdict::Incorrect),
        Verdict::PartiallyCorrect | Verdict::Incorrect => None,
    }
}

/// 同一分句内、关键字前最多三个词里是否有否定词
fn is_negated(before: &str) -> bool {
    let clause_start = before
        .rfind(|c: char| matches!(c, '.' | ';' | ':' | '!' | '?' | '\n'))
        .map(|i| i + 1)
        .unwrap_or(0);
    before[clause_start..]
        .split_whitespace()
        .rev()
        .take(NEGATION_WINDOW)
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '’')
                .to_lowercase()
        })
        .any(|word| {
            matches!(word.as_str(), "not" | "never" | "cannot")
                || word.ends_with("n't")
                || word.ends_with("n’t")
        })
}

fn lookup_verdict(keyword: &str) -> Option<Verdict> {
    let normalized = keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    VERDICT_WORDS.get(normalized.as_str()).copied()
}

/// 拆出 `Excerpt:` 段，返回（前面的正文, 摘录）
fn split_excerpt(text: &str) -> (&str, Option<String>) {
    match EXCERPT_LABEL.find(text) {
        Some(m) => {
            let excerpt = clean_fragment(&text[m.end()..]);
            (&text[..m.start()], Some(excerpt))
        }
        None => (text, None),
    }
}

/// 只保留确实出现在文档里的摘录
fn grounded_excerpt(candidate: &str, document_text: &str) -> Option<String> {
    let trimmed = candidate
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '“' | '”' | '\''))
        .trim();
    if trimmed.is_empty() {
        return None;
    }
    if document_text.contains(trimmed) {
        return Some(trimmed.to_string());
    }
    let without_period = trimmed.trim_end_matches('.');
    if !without_period.is_empty() && document_text.contains(without_period) {
        return Some(without_period.to_string());
    }
    None
}

fn first_quoted_span(text: &str, document_text: &str) -> Option<String> {
    QUOTED_SPAN.captures_iter(text).find_map(|caps| {
        let span = caps.get(1).or_else(|| caps.get(2))?.as_str();
        grounded_excerpt(span, document_text)
    })
}

/// 去掉首尾空白和 markdown 强调符号
fn clean_fragment(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .to_string()
}

/// 兼容 `{"questions":[{"question": ...}]}` 或字符串数组
fn questions_from_json(text: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(text);
    if !(body.starts_with('{') || body.starts_with('[')) {
        return None;
    }
    let value: JsonValue = serde_json::from_str(body).ok()?;
    let items = match &value {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => map.get("questions")?.as_array()?,
        _ => return None,
    };

    let questions: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            JsonValue::String(s) => Some(s.trim().to_string()),
            JsonValue::Object(obj) => ["question", "question_text", "text"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(|v| v.as_str()))
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .collect();

    if questions.is_empty() {
        None
    } else {
        Some(questions)
    }
}

/// 去掉行首紧贴内容的 `**` / `__` / `#` 强调符号
fn strip_emphasis(line: &str) -> &str {
    let mut rest = line;
    loop {
        let next = rest
            .strip_prefix("**")
            .or_else(|| rest.strip_prefix("__"))
            .or_else(|| rest.strip_prefix('#'))
            .map(str::trim_start);
        match next {
            Some(stripped) if stripped.len() < rest.len() => rest = stripped,
            _ => return rest,
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
        return rest.trim_end().trim_end_matches("```").trim();
    }
    trimmed
}

/// 逐行解析：有编号/项目符号的行优先，都没有时取全部非空行
fn questions_from_lines(text: &str) -> Vec<String> {
    let mut marked = Vec::new();
    let mut plain = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        // 先按原行匹配（`* ` 本身就是项目符号），再去掉 `**1.**`、`## 1.` 这类强调前缀重试
        let marker = LIST_MARKER.find(line).map(|m| &line[m.end()..]).or_else(|| {
            let unwrapped = strip_emphasis(line);
            LIST_MARKER.find(unwrapped).map(|m| &unwrapped[m.end()..])
        });
        match marker {
            Some(rest) => marked.push(clean_fragment(rest)),
            None => plain.push(clean_fragment(line)),
        }
    }

    if marked.is_empty() {
        plain
    } else {
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_trimmed() {
        assert_eq!(
            parse_summary("  A short summary.\n").into_result().unwrap(),
            "A short summary."
        );
        assert_eq!(
            parse_summary(" \n ").into_result().unwrap_err(),
            ParseError::EmptyResponse
        );
    }

    #[test]
    fn test_answer_with_labels() {
        let parsed = parse_answer(
            "Answer: The sky is blue.\nJustification: \"The sky is blue during the day.\"",
        )
        .into_result()
        .unwrap();
        assert_eq!(parsed.answer, "The sky is blue.");
        assert_eq!(parsed.justification, "\"The sky is blue during the day.\"");
    }

    #[test]
    fn test_answer_with_markdown_labels() {
        let parsed = parse_answer("**Answer:** Blue\n\n**Justification:** first sentence")
            .into_result()
            .unwrap();
        assert_eq!(parsed.answer, "Blue");
        assert_eq!(parsed.justification, "first sentence");
    }

    #[test]
    fn test_answer_without_separator_is_all_answer() {
        let parsed = parse_answer("It is blue, according to the text.")
            .into_result()
            .unwrap();
        assert_eq!(parsed.answer, "It is blue, according to the text.");
        assert_eq!(parsed.justification, "");
    }

    #[test]
    fn test_answer_label_after_chatter() {
        let parsed = parse_answer("Sure!\nAnswer: Blue\nJustification: x")
            .into_result()
            .unwrap();
        assert_eq!(parsed.answer, "Blue");
        assert_eq!(parsed.justification, "x");

        let parsed = parse_answer("Happy to help.\n\n**Answer:** Blue")
            .into_result()
            .unwrap();
        assert_eq!(parsed.answer, "Blue");
    }

    #[test]
    fn test_answer_inline_separator() {
        let parsed = parse_answer("answer: blue. justification: line one")
            .into_result()
            .unwrap();
        assert_eq!(parsed.answer, "blue.");
        assert_eq!(parsed.justification, "line one");
    }

    #[test]
    fn test_questions_numbered() {
        let raw = "1. What is A?\n2) Why does B happen?\n\n3. How are A and B related?";
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(
            questions,
            vec![
                "What is A?".to_string(),
                "Why does B happen?".to_string(),
                "How are A and B related?".to_string()
            ]
        );
    }

    #[test]
    fn test_questions_skip_preamble_when_list_is_marked() {
        let raw = "Here are three questions:\n- What is A?\n- Why B?\n- How C?";
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(questions[0], "What is A?");
        assert_eq!(questions.len(), 3);
    }

    #[test]
    fn test_questions_asterisk_bullets_after_preamble() {
        let raw = "Here are three questions:\n* What is A?\n* Why B?\n* How C?";
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(questions, vec!["What is A?", "Why B?", "How C?"]);
    }

    #[test]
    fn test_questions_dot_bullets_and_bold_numbers() {
        let raw = "Questions:\n• What is A?\n• Why B?\n• How C?";
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(questions, vec!["What is A?", "Why B?", "How C?"]);

        let raw = "Sure, here you go.\n**1.** What is A?\n## 2. Why B?\n**3.** How C?";
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(questions, vec!["What is A?", "Why B?", "How C?"]);
    }

    #[test]
    fn test_questions_bold_prefix() {
        let raw = "**Question 1:** What is A?\n**Question 2:** Why B?\n**Question 3:** How C?";
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(questions, vec!["What is A?", "Why B?", "How C?"]);
    }

    #[test]
    fn test_questions_extra_are_truncated() {
        let raw = "1. A?\n2. B?\n3. C?\n4. D?";
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(questions, vec!["A?", "B?", "C?"]);
    }

    #[test]
    fn test_questions_too_few_is_incomplete() {
        let err = parse_questions("1. A?\n2. B?", 3).into_result().unwrap_err();
        assert_eq!(
            err,
            ParseError::IncompleteGeneration {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_duplicate_questions_do_not_count_twice() {
        let err = parse_questions("1. A?\n2. a?\n3. B?", 3).into_result().unwrap_err();
        assert!(matches!(err, ParseError::IncompleteGeneration { found: 2, .. }));
    }

    #[test]
    fn test_questions_from_json_shape() {
        let raw = r#"```json
{"questions": [{"question": "What is A?"}, {"question": "Why B?"}, {"question": "How C?"}]}
```"#;
        let questions = parse_questions(raw, 3).into_result().unwrap();
        assert_eq!(questions, vec!["What is A?", "Why B?", "How C?"]);
    }

    #[test]
    fn test_verdict_labelled() {
        let doc = "Water boils at 100 degrees Celsius at sea level.";
        let raw = "Verdict: Partially Correct\nJustification: The answer omits the sea-level condition.\nExcerpt: \"Water boils at 100 degrees Celsius at sea level.\"";
        let parsed = parse_evaluation(raw, doc).into_result().unwrap();
        assert_eq!(parsed.verdict, Verdict::PartiallyCorrect);
        assert_eq!(parsed.justification, "The answer omits the sea-level condition.");
        assert_eq!(
            parsed.supporting_excerpt.as_deref(),
            Some("Water boils at 100 degrees Celsius at sea level.")
        );
    }

    #[test]
    fn test_verdict_incorrect_not_read_as_correct() {
        let parsed = parse_evaluation("Verdict: INCORRECT\nJustification: wrong color", "")
            .into_result()
            .unwrap();
        assert_eq!(parsed.verdict, Verdict::Incorrect);
    }

    #[test]
    fn test_negated_correct_is_incorrect() {
        let parsed = parse_evaluation(
            "The user's answer isn't correct; the document says blue.",
            "",
        )
        .into_result()
        .unwrap();
        assert_eq!(parsed.verdict, Verdict::Incorrect);
        assert!(parsed.justification.contains("isn't correct"));

        let parsed = parse_evaluation("Verdict: Not quite correct\nJustification: wrong color", "")
            .into_result()
            .unwrap();
        assert_eq!(parsed.verdict, Verdict::Incorrect);
        assert_eq!(parsed.justification, "wrong color");

        let parsed = parse_evaluation("The answer is not entirely correct.", "")
            .into_result()
            .unwrap();
        assert_eq!(parsed.verdict, Verdict::Incorrect);
    }

    #[test]
    fn test_negation_in_earlier_sentence_does_not_flip() {
        let parsed = parse_evaluation(
            "It is not obvious at first. But the answer is correct.",
            "",
        )
        .into_result()
        .unwrap();
        assert_eq!(parsed.verdict, Verdict::Correct);

        let outcome = parse_evaluation("The answer is not wrong.", "");
        assert!(matches!(
            outcome.into_result().unwrap_err(),
            ParseError::UnparseableVerdict { .. }
        ));
    }

    #[test]
    fn test_verdict_legacy_evaluation_label() {
        let parsed = parse_evaluation("Evaluation: Correct\nJustification: matches", "")
            .into_result()
            .unwrap();
        assert_eq!(parsed.verdict, Verdict::Correct);
        assert_eq!(parsed.justification, "matches");
    }

    #[test]
    fn test_verdict_unlabelled_uses_first_keyword() {
        let parsed = parse_evaluation(
            "Correct. The document says \"the sky is blue\" and the user said blue.",
            "In the morning the sky is blue.",
        )
        .into_result()
        .unwrap();
        assert_eq!(parsed.verdict, Verdict::Correct);
        assert_eq!(parsed.supporting_excerpt.as_deref(), Some("the sky is blue"));
    }

    #[test]
    fn test_excerpt_not_in_document_is_dropped() {
        let parsed = parse_evaluation(
            "Verdict: Correct\nJustification: ok\nExcerpt: \"something invented\"",
            "real text",
        )
        .into_result()
        .unwrap();
        assert_eq!(parsed.supporting_excerpt, None);
    }

    #[test]
    fn test_no_verdict_is_unparseable() {
        let outcome = parse_evaluation("I am not sure what to say here.", "");
        assert!(!outcome.is_parsed());
        assert!(matches!(
            outcome.into_result().unwrap_err(),
            ParseError::UnparseableVerdict { .. }
        ));
    }
}

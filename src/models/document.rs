use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// 文档类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MimeKind {
    Pdf,
    Text,
}

impl MimeKind {
    /// 解析声明的文档类型
    ///
    /// 接受简写（`pdf` / `text` / `txt`）和 MIME 字符串，大小写不敏感
    pub fn parse(kind: &str) -> Result<Self, DocumentError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "pdf" | "application/pdf" => Ok(MimeKind::Pdf),
            "text" | "txt" | "plain" | "text/plain" => Ok(MimeKind::Text),
            _ => Err(DocumentError::UnsupportedFormat {
                kind: kind.to_string(),
            }),
        }
    }

    /// 按文件扩展名推断
    pub fn from_extension(ext: &str) -> Result<Self, DocumentError> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Ok(MimeKind::Pdf),
            "txt" | "text" | "md" => Ok(MimeKind::Text),
            _ => Err(DocumentError::UnsupportedFormat {
                kind: ext.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MimeKind::Pdf => "pdf",
            MimeKind::Text => "text",
        }
    }
}

impl FromStr for MimeKind {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已提取文本的文档
///
/// 只在一次请求（或调用方自行缓存）的生命周期内存在，核心不负责存储
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    kind: MimeKind,
    text: String,
}

impl Document {
    pub fn new(kind: MimeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// 直接由纯文本构建
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(MimeKind::Text, text)
    }

    pub fn kind(&self) -> MimeKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 文本是否为空（只有空白也算空）
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_variants() {
        assert_eq!(MimeKind::parse("PDF").unwrap(), MimeKind::Pdf);
        assert_eq!(MimeKind::parse("application/pdf").unwrap(), MimeKind::Pdf);
        assert_eq!(MimeKind::parse("text/plain").unwrap(), MimeKind::Text);
        assert_eq!(MimeKind::parse(" txt ").unwrap(), MimeKind::Text);
    }

    #[test]
    fn test_parse_kind_rejects_others() {
        let err = MimeKind::parse("application/msword").unwrap_err();
        assert_eq!(
            err,
            DocumentError::UnsupportedFormat {
                kind: "application/msword".to_string()
            }
        );
        assert!(MimeKind::from_extension("docx").is_err());
    }

    #[test]
    fn test_blank_document() {
        assert!(Document::from_text("  \n\t").is_blank());
        assert!(!Document::from_text("x").is_blank());
    }
}

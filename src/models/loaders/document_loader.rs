use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;

use crate::models::document::MimeKind;

/// 从磁盘读取的原始文档
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub file_name: String,
    pub kind: MimeKind,
    pub bytes: Vec<u8>,
}

/// 读取文档文件，按扩展名推断类型
///
/// `kind_override` 给出时以它为准（例如没有扩展名的文件）
pub async fn load_document_file(path: &Path, kind_override: Option<&str>) -> Result<RawDocument> {
    let kind = match kind_override {
        Some(kind) => MimeKind::parse(kind)?,
        None => {
            let ext = path
                .extension()
                .and_then(|s| s.to_str())
                .with_context(|| format!("无法从文件名推断文档类型: {}", path.display()))?;
            MimeKind::from_extension(ext)?
        }
    };

    let bytes = fs::read(path)
        .await
        .with_context(|| format!("无法读取文档: {}", path.display()))?;

    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    tracing::info!("已读取文档 {} ({}, {} 字节)", file_name, kind, bytes.len());

    Ok(RawDocument {
        file_name,
        kind,
        bytes,
    })
}

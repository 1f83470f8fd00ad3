//! 文本提取服务 - 业务能力层
//!
//! 只负责"把上传内容变成纯文本"，纯函数，无副作用

use tracing::{debug, warn};

use crate::error::DocumentError;
use crate::models::{Document, MimeKind};

/// 文本提取服务
///
/// 职责：
/// - text：按 UTF-8 解码，原样返回
/// - pdf：按页序拼接每页文本，不保留版面，忽略图片和表单
/// - 不判断文本是否为空（由流程层负责）
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 提取文本
    ///
    /// # 参数
    /// - `payload`: 上传的原始字节
    /// - `mime_kind`: 声明的文档类型
    pub fn extract(&self, payload: &[u8], mime_kind: MimeKind) -> Result<String, DocumentError> {
        match mime_kind {
            MimeKind::Text => decode_text(payload),
            MimeKind::Pdf => extract_pdf_text(payload),
        }
    }

    /// 按声明的类型字符串提取，未知类型返回 `UnsupportedFormat`
    pub fn extract_declared(&self, payload: &[u8], declared_kind: &str) -> Result<String, DocumentError> {
        let kind = MimeKind::parse(declared_kind)?;
        self.extract(payload, kind)
    }

    /// 提取并包装成 `Document`
    pub fn load(&self, payload: &[u8], mime_kind: MimeKind) -> Result<Document, DocumentError> {
        let text = self.extract(payload, mime_kind)?;
        debug!("提取完成: {} 类型, {} 字符", mime_kind, text.chars().count());
        Ok(Document::new(mime_kind, text))
    }
}

fn decode_text(payload: &[u8]) -> Result<String, DocumentError> {
    String::from_utf8(payload.to_vec()).map_err(|e| DocumentError::CorruptDocument {
        reason: format!("text payload is not valid UTF-8: {}", e.utf8_error()),
    })
}

fn extract_pdf_text(payload: &[u8]) -> Result<String, DocumentError> {
    let pdf = lopdf::Document::load_mem(payload).map_err(|e| DocumentError::CorruptDocument {
        reason: e.to_string(),
    })?;

    // get_pages 返回 BTreeMap，按页码升序
    let pages = pdf.get_pages();
    debug!("PDF 共 {} 页", pages.len());

    let mut text = String::new();
    for page_number in pages.keys() {
        match pdf.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                if !page_text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Err(e) => {
                // 没有文本层或内容流无法解码的页面按空页处理
                warn!("第 {} 页无法提取文本，已跳过: {}", page_number, e);
            }
        }
    }

    Ok(text)
}

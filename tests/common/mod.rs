//! 集成测试共用的桩后端
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use doc_assistant::error::LlmError;
use doc_assistant::{ChatBackend, ChatRequest, Config, DocumentAssistant};

type Responder = dyn Fn(&ChatRequest, usize) -> Result<String, LlmError> + Send + Sync;

/// 按闭包生成回复并记录调用次数和提示词的后端
pub struct StubBackend {
    responder: Box<Responder>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubBackend {
    /// `responder` 的第二个参数是本次调用的序号（从 0 开始）
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ChatRequest, usize) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// 每次都返回同一段文本
    pub fn replying(reply: &str) -> Arc<Self> {
        let reply = reply.to_string();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for StubBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        (self.responder)(request, index)
    }
}

/// 重试等待缩短到毫秒级的配置
pub fn fast_config() -> Config {
    Config {
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 2,
        ..Config::default()
    }
}

pub fn assistant_with(backend: Arc<StubBackend>) -> DocumentAssistant {
    DocumentAssistant::with_backend(&fast_config(), backend)
}

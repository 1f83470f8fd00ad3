//! 推理客户端 - 业务能力层
//!
//! 只负责"把提示词交给模型并拿回原始输出"，包括超时和重试，不关心任务类型
//!
//! ## 重试策略
//! - `Transport` / `RateLimited` 视为瞬时错误，最多重试 `max_retries` 次，指数退避
//! - `RateLimited` 带 `Retry-After` 时至少等待该时长（不超过退避上限）
//! - `Auth` / `Timeout` / `Rejected` 直接返回，不重试
//!
//! 重试只会重复推理调用本身，不触发其他副作用。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LlmError;
use crate::infrastructure::{ChatBackend, ChatRequest, GenerationParams};

/// 所有任务共用的系统消息
pub const SYSTEM_MESSAGE: &str = "You are a careful reading assistant. You answer strictly from the document the user provides, never invent facts, and follow the requested output format exactly.";

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次调用）
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// 第 `retry_index` 次重试（从 0 开始）前的等待时间
    pub fn delay_for(&self, retry_index: u32, err: &LlmError) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        match err {
            LlmError::RateLimited {
                retry_after: Some(hint),
            } => backoff.max(*hint).min(self.max_delay),
            _ => backoff,
        }
    }
}

/// 推理客户端
///
/// 职责：
/// - 给每次调用加超时
/// - 对瞬时错误做指数退避重试
/// - 可被多个请求并发使用（内部只有只读状态和共享的后端句柄）
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
    call_timeout: Duration,
    model_name: String,
    params: GenerationParams,
}

impl InferenceClient {
    /// 创建新的推理客户端
    pub fn new(config: &Config, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::from_config(config),
            call_timeout: config.request_timeout(),
            model_name: config.llm_model_name.clone(),
            params: GenerationParams::from_config(config),
        }
    }

    /// 替换重试策略
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 替换单次调用超时
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 使用配置中的模型和生成参数调用
    pub async fn infer(&self, prompt: &str) -> Result<String, LlmError> {
        self.infer_with(prompt, &self.model_name, &self.params).await
    }

    /// 指定模型和生成参数调用
    ///
    /// # 参数
    /// - `prompt`: 完整提示词
    /// - `model_id`: 模型名称
    /// - `params`: 温度、最大输出长度
    ///
    /// # 返回
    /// 返回模型的原始输出（可能为空字符串，由解析层判断）
    pub async fn infer_with(
        &self,
        prompt: &str,
        model_id: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: model_id.to_string(),
            system: Some(SYSTEM_MESSAGE.to_string()),
            prompt: prompt.to_string(),
            params: *params,
        };

        let mut retries = 0u32;
        loop {
            let result = match timeout(self.call_timeout, self.backend.complete(&request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    after: self.call_timeout,
                }),
            };

            match result {
                Ok(text) => {
                    debug!(
                        "推理成功 (模型: {}, 第 {} 次调用, 输出 {} 字符)",
                        model_id,
                        retries + 1,
                        text.len()
                    );
                    return Ok(text);
                }
                Err(e) if e.is_transient() && retries < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retries, &e);
                    retries += 1;
                    warn!(
                        "推理调用失败 (尝试 {}/{}): {}，等待 {:?} 后重试...",
                        retries,
                        self.retry.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!("推理失败，已重试 {} 次: {}", retries, e);
                    } else {
                        warn!("推理失败（不可重试）: {}", e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 按脚本依次返回结果的后端
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Auth { status: 401 }))
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl ChatBackend for SlowBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn client(backend: Arc<dyn ChatBackend>, max_retries: u32) -> InferenceClient {
        InferenceClient::new(&Config::default(), backend).with_retry_policy(fast_policy(max_retries))
    }

    fn transport() -> LlmError {
        LlmError::Transport {
            message: "connection reset".to_string(),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let backend = ScriptedBackend::new(vec![
            Err(transport()),
            Err(LlmError::RateLimited { retry_after: None }),
            Ok("fine".to_string()),
        ]);
        let result = client(backend.clone(), 3).infer("prompt").await;
        assert_eq!(result.unwrap(), "fine");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![
            Err(LlmError::Auth { status: 401 }),
            Ok("never".to_string()),
        ]);
        let err = client(backend.clone(), 3).infer("prompt").await.unwrap_err();
        assert_eq!(err, LlmError::Auth { status: 401 });
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let backend = ScriptedBackend::new(vec![
            Err(transport()),
            Err(transport()),
            Err(transport()),
            Ok("too late".to_string()),
        ]);
        let err = client(backend.clone(), 2).infer("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::Transport { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_call_timeout_is_enforced() {
        let client = client(Arc::new(SlowBackend), 3).with_call_timeout(Duration::from_millis(20));
        let err = client.infer("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        let err = transport();
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2, &err), Duration::from_millis(350));
        assert_eq!(policy.delay_for(30, &err), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_after_hint_is_respected() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(5),
        };
        let err = LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(2));
    }
}

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult, ConfigError};

/// 程序配置
///
/// 所有可调参数都集中在这里，业务代码不写死任何常量
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    /// API 凭证（只从环境或配置文件读取，不写入日志）
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 单次调用超时（秒）
    pub request_timeout_secs: u64,
    /// 瞬时错误的最大重试次数（不含首次调用）
    pub max_retries: u32,
    /// 指数退避的初始等待（毫秒）
    pub retry_base_delay_ms: u64,
    /// 退避等待上限（毫秒）
    pub retry_max_delay_ms: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
    // --- 提示词配置 ---
    /// 文档字符预算，超出部分截断
    pub document_char_budget: usize,
    /// 每批挑战题目数量
    pub challenge_batch_size: usize,
    pub summary_max_words: usize,
    // --- 服务配置 ---
    /// serve 模式下同时处理的请求数量
    pub max_concurrent_requests: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_api_base_url: "https://api.groq.com/openai/v1".to_string(),
            llm_model_name: "llama3-8b-8192".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            temperature: 0.7,
            max_output_tokens: 1024,
            document_char_budget: 8_000,
            challenge_batch_size: 3,
            summary_max_words: 150,
            max_concurrent_requests: 16,
            verbose_logging: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_api_base_url", &self.llm_api_base_url)
            .field("llm_model_name", &self.llm_model_name)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("document_char_budget", &self.document_char_budget)
            .field("challenge_batch_size", &self.challenge_batch_size)
            .field("summary_max_words", &self.summary_max_words)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("verbose_logging", &self.verbose_logging)
            .finish()
    }
}

impl Config {
    /// 默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 读取 TOML 配置文件（可选），再叠加环境变量
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    ConfigError::FileLoadFailed {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Self::from_toml_str(&content).map_err(|e| match e {
                    AppError::Config(ConfigError::FileLoadFailed { reason, .. }) => {
                        AppError::Config(ConfigError::FileLoadFailed {
                            path: path.display().to_string(),
                            reason,
                        })
                    }
                    other => other,
                })?
            }
            None => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文本解析，未给出的字段取默认值
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| {
            AppError::Config(ConfigError::FileLoadFailed {
                path: String::new(),
                reason: e.to_string(),
            })
        })
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("GROQ_API_KEY"))
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            request_timeout_secs: env_parse("LLM_REQUEST_TIMEOUT_SECS").unwrap_or(default.request_timeout_secs),
            max_retries: env_parse("LLM_MAX_RETRIES").unwrap_or(default.max_retries),
            retry_base_delay_ms: env_parse("LLM_RETRY_BASE_DELAY_MS").unwrap_or(default.retry_base_delay_ms),
            retry_max_delay_ms: env_parse("LLM_RETRY_MAX_DELAY_MS").unwrap_or(default.retry_max_delay_ms),
            temperature: env_parse("LLM_TEMPERATURE").unwrap_or(default.temperature),
            max_output_tokens: env_parse("LLM_MAX_OUTPUT_TOKENS").unwrap_or(default.max_output_tokens),
            document_char_budget: env_parse("DOCUMENT_CHAR_BUDGET").unwrap_or(default.document_char_budget),
            challenge_batch_size: env_parse("CHALLENGE_BATCH_SIZE").unwrap_or(default.challenge_batch_size),
            summary_max_words: env_parse("SUMMARY_MAX_WORDS").unwrap_or(default.summary_max_words),
            max_concurrent_requests: env_parse("MAX_CONCURRENT_REQUESTS").unwrap_or(default.max_concurrent_requests),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    /// 校验配置值
    pub fn validate(&self) -> AppResult<()> {
        if self.challenge_batch_size == 0 {
            return Err(AppError::invalid_config("challenge_batch_size", "must be at least 1"));
        }
        if self.document_char_budget == 0 {
            return Err(AppError::invalid_config("document_char_budget", "must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::invalid_config("request_timeout_secs", "must be at least 1"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(AppError::invalid_config("max_concurrent_requests", "must be at least 1"));
        }
        if self.llm_api_base_url.trim().is_empty() {
            return Err(AppError::invalid_config("llm_api_base_url", "must not be empty"));
        }
        Ok(())
    }

    /// 取出凭证，没有配置时报错
    pub fn require_api_key(&self) -> AppResult<&str> {
        self.llm_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AppError::Config(ConfigError::MissingApiKey))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overrides_only_given_fields() {
        let config = Config::from_toml_str(
            r#"
            llm_model_name = "mixtral-8x7b-32768"
            challenge_batch_size = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.llm_model_name, "mixtral-8x7b-32768");
        assert_eq!(config.challenge_batch_size, 5);
        assert_eq!(config.document_char_budget, 8_000);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = Config::from_toml_str("challenge_batch_size = \"three\"").unwrap_err();
        assert_eq!(err.kind(), "config_error");
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = Config {
            challenge_batch_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config {
            llm_api_key: Some("sk-secret-value".to_string()),
            ..Config::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("sk-secret-value"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_missing_key_is_reported() {
        let config = Config::default();
        assert_eq!(config.require_api_key().unwrap_err().kind(), "config_error");
    }
}

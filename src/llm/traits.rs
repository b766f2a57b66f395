//! LLM 客户端抽象
//!
//! 补全服务对核心而言是不透明的：输入 system 提示、消息历史与可用工具定义，输出文本块与工具调用块。
//! 具体厂商协议不在本 crate 范围内，测试与演示使用 MockLlmClient。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Message;
use crate::tools::{ToolDefinition, ToolUseRequest};

/// 补全服务错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// 限流与超时可重试，其余直接上抛
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Timeout)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// 响应内容块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolUseRequest),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub blocks: Vec<ContentBlock>,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![ContentBlock::Text { text: text.into() }],
            usage: Usage::default(),
        }
    }

    pub fn with_tool_use(mut self, request: ToolUseRequest) -> Self {
        self.blocks.push(ContentBlock::ToolUse(request));
        self
    }

    /// 全部文本块按换行拼接
    pub fn text_content(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_uses(&self) -> Vec<ToolUseRequest> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(req) => Some(req.clone()),
                ContentBlock::Text { .. } => None,
            })
            .collect()
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略：指数退避，限流时优先使用服务端给出的等待时间
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// 对可重试错误自动重试的包装客户端
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request).await {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = match &e {
                        LlmError::RateLimited { retry_after_ms } => {
                            Duration::from_millis(*retry_after_ms)
                        }
                        _ => self.config.base_delay * 2u32.pow(attempt),
                    };
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "LLM call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RateLimitedOnce {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for RateLimitedOnce {
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LlmError::RateLimited { retry_after_ms: 1 })
            } else {
                Ok(CompletionResponse::text("ok"))
            }
        }
    }

    #[test]
    fn test_response_accessors() {
        let response = CompletionResponse::text("thinking")
            .with_tool_use(ToolUseRequest::new("echo", json!({"text": "hi"})));
        assert_eq!(response.text_content(), "thinking");
        assert_eq!(response.tool_uses().len(), 1);
        assert_eq!(response.tool_uses()[0].name, "echo");
    }

    #[test]
    fn test_retryable() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(!LlmError::Request("bad request".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_retrying_client_recovers() {
        let inner = Arc::new(RateLimitedOnce {
            calls: AtomicU32::new(0),
        });
        let client = RetryingLlmClient::new(inner.clone(), RetryConfig::default());
        let response = client.complete(&CompletionRequest::default()).await.unwrap();
        assert_eq!(response.text_content(), "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}

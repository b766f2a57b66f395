//! LLM 层：补全服务抽象、重试包装与 Mock 实现

pub mod mock;
pub mod traits;

pub use mock::MockLlmClient;
pub use traits::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, RetryConfig,
    RetryingLlmClient, Usage,
};

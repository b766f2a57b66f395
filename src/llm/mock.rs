//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预设响应；脚本耗尽后回显最后一条 User 消息并调用完成工具，便于本地跑通回合流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Usage};
use crate::memory::{Role, TokenEstimator};
use crate::tools::{ToolUseRequest, COMPLETION_TOOL};

/// Mock 客户端：脚本化响应 + 累计 token 统计
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    usage: Mutex<Usage>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: impl IntoIterator<Item = CompletionResponse>) -> Self {
        let client = Self::new();
        for r in responses {
            client.push(Ok(r));
        }
        client
    }

    pub fn push(&self, response: Result<CompletionResponse, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    /// 已收到的请求数
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 最近一次请求的 system 提示
    pub fn last_system_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .ok()
            .and_then(|r| r.last().map(|req| req.system.clone()))
    }

    fn fallback(request: &CompletionRequest) -> CompletionResponse {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        CompletionResponse::text(format!("Echo from Mock: {}", last_user)).with_tool_use(
            ToolUseRequest::new(COMPLETION_TOOL, json!({ "result": last_user })),
        )
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut response = match scripted {
            Some(r) => r?,
            None => Self::fallback(request),
        };

        response.usage = Usage {
            prompt_tokens: (TokenEstimator::estimate(&request.system)
                + TokenEstimator::estimate_messages(&request.messages)) as u64,
            completion_tokens: TokenEstimator::estimate(&response.text_content()) as u64,
        };
        if let Ok(mut total) = self.usage.lock() {
            total.prompt_tokens += response.usage.prompt_tokens;
            total.completion_tokens += response.usage.completion_tokens;
        }
        Ok(response)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage
            .lock()
            .map(|u| (u.prompt_tokens, u.completion_tokens, u.total()))
            .unwrap_or((0, 0, 0))
    }
}

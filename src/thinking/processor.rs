//! 思考阶段处理器
//!
//! 每次运行：按需压缩历史 → 从上一轮工具结果提取洞察 → 给出下一步建议 →
//! 写入一个 ContextSnapshot 及其 Summary。存储错误直接上抛，不吞掉。
//! 配置了 LlmClient 且 max_rounds > 1 时，追加若干反思轮，受超时与会话取消令牌约束。

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::memory::{
    ContextMemoryStore, ContextSnapshot, Message, Summary, ThinkingRound, TokenEstimator,
    ToolCallResult,
};
use crate::thinking::insights::{extract_insights, next_action_text, TASK_COMPLETED};
use crate::thinking::strategy::{
    self, CompressionOutcome, CompressionStrategy, SemanticCompressor,
};
use crate::tools::COMPLETION_TOOL;

/// 反思轮结束标记
pub const DONE_MARKER: &str = "[DONE]";

const REFLECTION_PROMPT: &str = "Reflect briefly on the progress of the task so far. \
Point out anything the next action should take into account. \
Reply with [DONE] once nothing further needs consideration.";

/// 思考阶段配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThinkingConfig {
    pub strategy: CompressionStrategy,
    /// 滑动窗口保留的最近消息数
    pub window_size: usize,
    /// token-budget 策略的目标预算
    pub token_budget: usize,
    /// 历史估算超过该值才压缩
    pub compression_threshold: usize,
    /// 每个思考阶段的最大轮数（第 1 轮为本地分析）
    pub max_rounds: u32,
    pub reflection_timeout_secs: u64,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            strategy: CompressionStrategy::SlidingWindow,
            window_size: 10,
            token_budget: 4000,
            compression_threshold: 6000,
            max_rounds: 1,
            reflection_timeout_secs: 30,
        }
    }
}

/// 思考阶段产出
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingPhaseResult {
    pub turn_id: String,
    pub rounds: Vec<ThinkingRound>,
    pub tokens_used: usize,
    /// 下一步建议为 "Task completed." 时为 false
    pub should_proceed_to_action: bool,
    pub next_action: String,
    pub insights: Vec<String>,
    pub summary: Option<Summary>,
    pub context_snapshot: Option<ContextSnapshot>,
    /// 未触发压缩时为 None
    pub compression: Option<CompressionOutcome>,
}

impl ThinkingPhaseResult {
    /// 压缩后的历史；未压缩时返回 None，调用方沿用原历史
    pub fn compressed_history(&self) -> Option<&[Message]> {
        self.compression.as_ref().map(|c| c.messages.as_slice())
    }
}

pub struct ThinkingProcessor {
    config: ThinkingConfig,
    compressor: Option<Arc<dyn SemanticCompressor>>,
    llm: Option<Arc<dyn LlmClient>>,
    completion_tool: String,
}

impl ThinkingProcessor {
    pub fn new(config: ThinkingConfig) -> Self {
        Self {
            config,
            compressor: None,
            llm: None,
            completion_tool: COMPLETION_TOOL.to_string(),
        }
    }

    pub fn with_semantic_compressor(mut self, compressor: Arc<dyn SemanticCompressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_completion_tool(mut self, name: impl Into<String>) -> Self {
        self.completion_tool = name.into();
        self
    }

    pub fn config(&self) -> &ThinkingConfig {
        &self.config
    }

    /// 历史估算超过阈值时按配置的策略压缩
    pub fn compress_if_needed(&self, history: &[Message]) -> Option<CompressionOutcome> {
        let tokens = TokenEstimator::estimate_messages(history);
        if tokens <= self.config.compression_threshold {
            return None;
        }
        let outcome = match self.config.strategy {
            CompressionStrategy::SlidingWindow => {
                strategy::sliding_window(history, self.config.window_size)
            }
            CompressionStrategy::TokenBudget => {
                strategy::token_budget(history, self.config.token_budget)
            }
            CompressionStrategy::Semantic => strategy::semantic(
                history,
                self.compressor.as_deref(),
                self.config.window_size,
                self.config.token_budget,
            ),
        };
        tracing::debug!(
            strategy = ?outcome.applied,
            removed = outcome.removed,
            tokens_before = outcome.tokens_before,
            tokens_after = outcome.tokens_after,
            "history compressed"
        );
        Some(outcome)
    }

    pub async fn perform_thinking(
        &self,
        turn_id: &str,
        history: &[Message],
        workspace_context: &str,
        tool_results: &[ToolCallResult],
        store: &mut ContextMemoryStore,
        cancel: &CancellationToken,
    ) -> Result<ThinkingPhaseResult, AgentError> {
        let compression = self.compress_if_needed(history);
        let insights = extract_insights(tool_results);
        let next_action =
            next_action_text(history, tool_results, &insights, &self.completion_tool);
        let completed = next_action == TASK_COMPLETED;

        let analysis = analysis_text(&next_action, &insights, compression.as_ref());
        let reflect = !completed && self.llm.is_some() && self.config.max_rounds > 1;
        let mut rounds = vec![ThinkingRound {
            round: 1,
            tokens_used: TokenEstimator::estimate(&analysis),
            content: analysis,
            should_continue: reflect,
        }];

        if reflect {
            let working_history = compression
                .as_ref()
                .map(|c| c.messages.as_slice())
                .unwrap_or(history);
            self.reflect(working_history, workspace_context, &insights, cancel, &mut rounds)
                .await;
        }

        let mut tool_names: Vec<String> = Vec::new();
        for r in tool_results {
            if !tool_names.contains(&r.tool_name) {
                tool_names.push(r.tool_name.clone());
            }
        }
        let snapshot = store.store_context(workspace_context, Some(tool_names));
        store.tag_turn(&snapshot.id, turn_id)?;

        let mut summary_text = String::new();
        if let Some(c) = &compression {
            summary_text.push_str(&c.summary);
            summary_text.push('\n');
        }
        summary_text.push_str(&next_action);
        let summary = store.store_summary(&snapshot.id, summary_text, insights.clone())?;
        let snapshot = store.get_context(&snapshot.id).cloned().unwrap_or(snapshot);

        let tokens_used: usize = rounds.iter().map(|r| r.tokens_used).sum();
        tracing::info!(
            turn_id,
            rounds = rounds.len(),
            tokens_used,
            compressed = compression.is_some(),
            "thinking phase done"
        );

        Ok(ThinkingPhaseResult {
            turn_id: turn_id.to_string(),
            rounds,
            tokens_used,
            should_proceed_to_action: !completed,
            next_action,
            insights,
            summary: Some(summary),
            context_snapshot: Some(snapshot),
            compression,
        })
    }

    /// 第 2..=max_rounds 轮；遇到 [DONE]、调用失败、超时或取消即停止。失败只记录为该轮文本
    async fn reflect(
        &self,
        history: &[Message],
        workspace_context: &str,
        insights: &[String],
        cancel: &CancellationToken,
        rounds: &mut Vec<ThinkingRound>,
    ) {
        let Some(llm) = &self.llm else {
            return;
        };
        let timeout = Duration::from_secs(self.config.reflection_timeout_secs.max(1));
        let mut messages = history.to_vec();
        let mut system = format!("{}\n\n## Workspace\n{}", REFLECTION_PROMPT, workspace_context);
        if !insights.is_empty() {
            system.push_str(&format!("\n\n## Insights\n- {}", insights.join("\n- ")));
        }

        for round in 2..=self.config.max_rounds {
            let request = CompletionRequest {
                system: system.clone(),
                messages: messages.clone(),
                tools: Vec::new(),
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(LlmError::Cancelled),
                r = tokio::time::timeout(timeout, llm.complete(&request)) => {
                    r.unwrap_or(Err(LlmError::Timeout))
                }
            };

            let (content, tokens_used, should_continue) = match result {
                Ok(response) => {
                    let text = response.text_content();
                    let done = text.contains(DONE_MARKER);
                    let tokens = match response.usage.completion_tokens {
                        0 => TokenEstimator::estimate(&text),
                        n => n as usize,
                    };
                    (text, tokens, !done && round < self.config.max_rounds)
                }
                Err(e) => {
                    tracing::warn!(round, error = %e, "reflection round failed");
                    (format!("Reflection stopped: {}", e), 0, false)
                }
            };

            messages.push(Message::assistant(content.clone()));
            rounds.push(ThinkingRound {
                round,
                content,
                should_continue,
                tokens_used,
            });
            if !should_continue {
                break;
            }
        }
    }
}

fn analysis_text(
    next_action: &str,
    insights: &[String],
    compression: Option<&CompressionOutcome>,
) -> String {
    let mut lines = Vec::new();
    if let Some(c) = compression {
        lines.push(c.summary.clone());
    }
    lines.extend(insights.iter().cloned());
    lines.push(format!("Next: {}", next_action));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionResponse, MockLlmClient};
    use crate::tools::ToolUseRequest;
    use serde_json::json;

    fn long_history(n: usize) -> Vec<Message> {
        let mut messages = vec![Message::user("Investigate the failing nightly build")];
        for i in 1..n {
            messages.push(Message::assistant(format!(
                "round {} produced a fairly long chunk of reasoning text to inflate tokens",
                i
            )));
        }
        messages
    }

    fn low_threshold() -> ThinkingConfig {
        ThinkingConfig {
            compression_threshold: 10,
            ..ThinkingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_thinking_persists_snapshot_and_summary() {
        let processor = ThinkingProcessor::new(ThinkingConfig::default());
        let mut store = ContextMemoryStore::new();
        let results = vec![
            ToolCallResult::ok("search", json!("found")),
            ToolCallResult::failed("fetch", json!({"error": "timeout"})),
        ];
        let result = processor
            .perform_thinking(
                "turn-1",
                &[Message::user("task")],
                "cwd: /tmp",
                &results,
                &mut store,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.compression.is_none());
        assert!(result.should_proceed_to_action);
        assert_eq!(result.rounds.len(), 1);
        let snapshot = result.context_snapshot.unwrap();
        assert_eq!(snapshot.turn_number, 1);
        assert_eq!(snapshot.tool_calls, vec!["search".to_string(), "fetch".to_string()]);
        assert_eq!(snapshot.full_context, "cwd: /tmp");
        assert_eq!(snapshot.turn_id.as_deref(), Some("turn-1"));
        let summary = result.summary.unwrap();
        assert_eq!(snapshot.summary.as_deref(), Some(summary.id.as_str()));
        assert!(summary.insights.contains(&"Failed tool calls: 1".to_string()));
        assert_eq!(store.get_all_summaries().len(), 1);
    }

    #[tokio::test]
    async fn test_compression_over_threshold() {
        let processor = ThinkingProcessor::new(low_threshold());
        let mut store = ContextMemoryStore::new();
        let history = long_history(15);
        let result = processor
            .perform_thinking("t", &history, "", &[], &mut store, &CancellationToken::new())
            .await
            .unwrap();
        let compressed = result.compressed_history().unwrap();
        assert_eq!(compressed.len(), 11);
        assert_eq!(compressed[0], history[0]);
        assert!(result.summary.unwrap().summary.contains("removed 4 older messages"));
    }

    #[tokio::test]
    async fn test_completion_stops_action() {
        let processor = ThinkingProcessor::new(ThinkingConfig::default());
        let mut store = ContextMemoryStore::new();
        let history = vec![
            Message::user("task"),
            Message::assistant("done").with_tool_uses(vec![ToolUseRequest::new(
                COMPLETION_TOOL,
                json!({"result": "ok"}),
            )]),
        ];
        let accepted = vec![ToolCallResult::ok(COMPLETION_TOOL, json!("ok"))];
        let result = processor
            .perform_thinking("t", &history, "", &accepted, &mut store, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.should_proceed_to_action);
        assert_eq!(result.next_action, TASK_COMPLETED);
    }

    #[tokio::test]
    async fn test_failed_completion_keeps_acting() {
        let processor = ThinkingProcessor::new(ThinkingConfig::default());
        let mut store = ContextMemoryStore::new();
        let history = vec![
            Message::user("task"),
            Message::assistant("done")
                .with_tool_uses(vec![ToolUseRequest::new(COMPLETION_TOOL, json!({}))]),
        ];
        let rejected = vec![ToolCallResult::failed(
            COMPLETION_TOOL,
            json!({"errors": ["result is required"]}),
        )];
        let result = processor
            .perform_thinking("t", &history, "", &rejected, &mut store, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.should_proceed_to_action);
        assert_ne!(result.next_action, TASK_COMPLETED);
    }

    #[tokio::test]
    async fn test_reflection_rounds_stop_on_done() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![
            CompletionResponse::text("Check the CI logs first."),
            CompletionResponse::text("Nothing else. [DONE]"),
            CompletionResponse::text("never requested"),
        ]));
        let processor = ThinkingProcessor::new(ThinkingConfig {
            max_rounds: 5,
            ..ThinkingConfig::default()
        })
        .with_llm(llm.clone());
        let mut store = ContextMemoryStore::new();
        let result = processor
            .perform_thinking(
                "t",
                &[Message::user("task")],
                "",
                &[],
                &mut store,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.rounds.len(), 3);
        assert!(result.rounds[0].should_continue);
        assert!(result.rounds[1].should_continue);
        assert!(!result.rounds[2].should_continue);
        assert_eq!(llm.request_count(), 2);
        assert!(result.tokens_used > 0);
    }

    #[tokio::test]
    async fn test_reflection_cancelled() {
        let llm = Arc::new(MockLlmClient::new());
        let processor = ThinkingProcessor::new(ThinkingConfig {
            max_rounds: 3,
            ..ThinkingConfig::default()
        })
        .with_llm(llm);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut store = ContextMemoryStore::new();
        let result = processor
            .perform_thinking("t", &[Message::user("task")], "", &[], &mut store, &cancel)
            .await
            .unwrap();
        assert_eq!(result.rounds.len(), 2);
        assert!(result.rounds[1].content.contains("cancelled"));
        assert_eq!(store.len(), 1);
    }
}

//! 上下文压缩策略
//!
//! 三种策略都保留第一条消息（任务锚点）：
//! - SlidingWindow：锚点 + 最近 W 条
//! - TokenBudget：反复删除第二条，直到总量不超过预算或只剩锚点
//! - Semantic：交给 SemanticCompressor；未提供时显式退化为 SlidingWindow，并在摘要中说明

use serde::{Deserialize, Serialize};

use crate::memory::{Message, TokenEstimator};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    #[default]
    SlidingWindow,
    TokenBudget,
    Semantic,
}

/// 语义压缩器（如基于向量相似度挑选相关消息）；实现可能丢掉锚点，调用方会补回
pub trait SemanticCompressor: Send + Sync {
    fn compress(&self, messages: &[Message], target_tokens: usize) -> Vec<Message>;
}

/// 一次压缩的结果
#[derive(Clone, Debug, PartialEq)]
pub struct CompressionOutcome {
    /// 实际生效的策略（语义压缩退化时为 SlidingWindow）
    pub applied: CompressionStrategy,
    pub messages: Vec<Message>,
    pub removed: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub summary: String,
}

impl CompressionOutcome {
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// 锚点 + 最近 window 条
pub fn sliding_window(messages: &[Message], window: usize) -> CompressionOutcome {
    let tokens_before = TokenEstimator::estimate_messages(messages);
    let kept: Vec<Message> = if messages.len() > window + 1 {
        let mut kept = Vec::with_capacity(window + 1);
        kept.push(messages[0].clone());
        kept.extend_from_slice(&messages[messages.len() - window..]);
        kept
    } else {
        messages.to_vec()
    };
    let removed = messages.len() - kept.len();
    let tokens_after = TokenEstimator::estimate_messages(&kept);
    CompressionOutcome {
        applied: CompressionStrategy::SlidingWindow,
        summary: format!(
            "Sliding window: removed {} older messages, kept the first message and the {} most recent",
            removed,
            kept.len().saturating_sub(1)
        ),
        messages: kept,
        removed,
        tokens_before,
        tokens_after,
    }
}

/// 反复删除下标 1 的消息；维护累计总量而不是每次重算
pub fn token_budget(messages: &[Message], budget: usize) -> CompressionOutcome {
    let tokens_before = TokenEstimator::estimate_messages(messages);
    let mut kept = messages.to_vec();
    let mut total = tokens_before;
    while total > budget && kept.len() > 1 {
        let dropped = kept.remove(1);
        total -= TokenEstimator::estimate_message(&dropped);
    }
    let removed = messages.len() - kept.len();
    CompressionOutcome {
        applied: CompressionStrategy::TokenBudget,
        summary: format!(
            "Token budget: {} -> {} tokens (saved {}), removed {} messages",
            tokens_before,
            total,
            tokens_before - total,
            removed
        ),
        messages: kept,
        removed,
        tokens_before,
        tokens_after: total,
    }
}

/// 语义压缩；没有压缩器时退化为滑动窗口
pub fn semantic(
    messages: &[Message],
    compressor: Option<&dyn SemanticCompressor>,
    window: usize,
    budget: usize,
) -> CompressionOutcome {
    let Some(compressor) = compressor else {
        let mut outcome = sliding_window(messages, window);
        outcome.summary = format!(
            "Semantic compressor unavailable, fell back to sliding window. {}",
            outcome.summary
        );
        return outcome;
    };

    let tokens_before = TokenEstimator::estimate_messages(messages);
    let mut kept = compressor.compress(messages, budget);
    if let Some(anchor) = messages.first() {
        if kept.first() != Some(anchor) {
            kept.retain(|m| m != anchor);
            kept.insert(0, anchor.clone());
        }
    }
    let removed = messages.len().saturating_sub(kept.len());
    let tokens_after = TokenEstimator::estimate_messages(&kept);
    CompressionOutcome {
        applied: CompressionStrategy::Semantic,
        summary: format!(
            "Semantic compression: kept {} of {} messages ({} -> {} tokens)",
            kept.len(),
            messages.len(),
            tokens_before,
            tokens_after
        ),
        messages: kept,
        removed,
        tokens_before,
        tokens_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<Message> {
        let mut messages = vec![Message::user("Task: summarize the quarterly report")];
        for i in 1..n {
            if i % 2 == 1 {
                messages.push(Message::assistant(format!("step {} reasoning text", i)));
            } else {
                messages.push(Message::tool_result(format!("[echo:ok] observation {}", i)));
            }
        }
        messages
    }

    /// 只保留最后一条
    struct LastOnly;

    impl SemanticCompressor for LastOnly {
        fn compress(&self, messages: &[Message], _target_tokens: usize) -> Vec<Message> {
            messages.last().cloned().into_iter().collect()
        }
    }

    #[test]
    fn test_sliding_window_fifteen_of_ten() {
        let messages = history(15);
        let outcome = sliding_window(&messages, 10);
        assert_eq!(outcome.messages.len(), 11);
        assert_eq!(outcome.removed, 4);
        assert!(outcome.summary.contains("removed 4 older messages"));
        assert_eq!(outcome.messages[0], messages[0]);
        assert_eq!(outcome.messages[10], messages[14]);
    }

    #[test]
    fn test_sliding_window_short_history_untouched() {
        let messages = history(5);
        let outcome = sliding_window(&messages, 10);
        assert_eq!(outcome.messages, messages);
        assert!(outcome.summary.contains("removed 0 older messages"));
    }

    #[test]
    fn test_token_budget_converges() {
        let messages = history(20);
        let budget = TokenEstimator::estimate_messages(&messages) / 2;
        let outcome = token_budget(&messages, budget);
        assert!(outcome.tokens_after <= budget);
        assert_eq!(outcome.messages[0], messages[0]);
        assert_eq!(outcome.messages.last(), messages.last());
        assert_eq!(
            outcome.tokens_after,
            TokenEstimator::estimate_messages(&outcome.messages)
        );
        assert!(outcome.summary.contains(&format!("saved {}", outcome.tokens_saved())));
    }

    #[test]
    fn test_token_budget_unreachable_keeps_anchor() {
        let messages = history(6);
        let outcome = token_budget(&messages, 0);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0], messages[0]);
        assert_eq!(outcome.removed, 5);
    }

    #[test]
    fn test_semantic_fallback_is_explicit() {
        let messages = history(15);
        let outcome = semantic(&messages, None, 10, 100);
        assert_eq!(outcome.applied, CompressionStrategy::SlidingWindow);
        assert_eq!(outcome.messages.len(), 11);
        assert!(outcome.summary.contains("fell back to sliding window"));
    }

    #[test]
    fn test_semantic_reinserts_anchor() {
        let messages = history(8);
        let outcome = semantic(&messages, Some(&LastOnly), 10, 100);
        assert_eq!(outcome.applied, CompressionStrategy::Semantic);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0], messages[0]);
        assert_eq!(outcome.removed, 6);
    }
}

//! Token 估算
//!
//! 只要求同一会话内重复调用结果一致，不追求精确；估算永不失败。

use crate::memory::Message;

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 英文约 4 字符/token，中文约 1.5 字符/token；空文本为 0
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }

    pub fn estimate_message(message: &Message) -> usize {
        Self::estimate(&message.content)
    }

    pub fn estimate_messages(messages: &[Message]) -> usize {
        messages.iter().map(Self::estimate_message).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimator_english() {
        let text = "Hello, world! This is a test.";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens > 0);
        assert!(tokens < text.len());
    }

    #[test]
    fn test_token_estimator_chinese() {
        let text = "你好世界，这是一个测试。";
        let tokens = TokenEstimator::estimate(text);
        assert_eq!(tokens, 8);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(TokenEstimator::estimate(""), 0);
    }

    #[test]
    fn test_consistent_across_calls() {
        let msgs = vec![Message::user("a".repeat(40)), Message::assistant("b".repeat(80))];
        assert_eq!(TokenEstimator::estimate_messages(&msgs), 30);
        assert_eq!(
            TokenEstimator::estimate_messages(&msgs),
            TokenEstimator::estimate_messages(&msgs)
        );
    }
}

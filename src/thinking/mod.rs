//! 思考阶段：上下文压缩、洞察提取、下一步建议与可选的反思轮

pub mod insights;
pub mod processor;
pub mod strategy;

pub use insights::{extract_insights, next_action_text};
pub use processor::{ThinkingConfig, ThinkingPhaseResult, ThinkingProcessor};
pub use strategy::{CompressionOutcome, CompressionStrategy, SemanticCompressor};

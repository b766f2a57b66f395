//! 上下文快照与摘要存储
//!
//! 每次思考阶段写入一个 ContextSnapshot（自带回合计数 1, 2, 3 …），摘要与快照一一对应。
//! export / import 是唯一要求的持久化契约：import 总是先清空再加载，从不合并。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::TokenEstimator;

/// 某一时刻的工作区上下文快照；创建后只会回填 summary 字段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: String,
    pub turn_number: u32,
    /// 所属 Turn 的 id；上下文计数与回合编号在恢复会话后可能不一致，按 id 对应
    #[serde(default)]
    pub turn_id: Option<String>,
    pub full_context: String,
    pub tool_calls: Vec<String>,
    pub token_count: usize,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 快照的可读压缩
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub context_id: String,
    pub summary: String,
    pub insights: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Summary {
    fn token_estimate(&self) -> usize {
        TokenEstimator::estimate(&self.summary)
            + self
                .insights
                .iter()
                .map(|i| TokenEstimator::estimate(i))
                .sum::<usize>()
    }

    fn matches(&self, needle_lower: &str) -> bool {
        self.summary.to_lowercase().contains(needle_lower)
            || self
                .insights
                .iter()
                .any(|i| i.to_lowercase().contains(needle_lower))
    }
}

/// export / import 的数据格式
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMemoryExport {
    pub current_turn: u32,
    pub contexts: Vec<ContextSnapshot>,
    pub summaries: Vec<Summary>,
}

/// 追加式上下文存储（单会话独占）
#[derive(Clone, Debug, Default)]
pub struct ContextMemoryStore {
    current_turn: u32,
    contexts: Vec<ContextSnapshot>,
    summaries: Vec<Summary>,
}

impl ContextMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入快照；回合计数每次调用自增
    pub fn store_context(
        &mut self,
        full_context: impl Into<String>,
        tool_calls: Option<Vec<String>>,
    ) -> ContextSnapshot {
        self.current_turn += 1;
        let full_context = full_context.into();
        let snapshot = ContextSnapshot {
            id: format!("ctx_{}", uuid::Uuid::new_v4().simple()),
            turn_number: self.current_turn,
            turn_id: None,
            token_count: TokenEstimator::estimate(&full_context),
            full_context,
            tool_calls: tool_calls.unwrap_or_default(),
            summary: None,
            created_at: Utc::now(),
        };
        tracing::debug!(
            context_id = %snapshot.id,
            turn = snapshot.turn_number,
            tokens = snapshot.token_count,
            "context stored"
        );
        self.contexts.push(snapshot.clone());
        snapshot
    }

    /// 为已有快照写入摘要；快照不存在时返回 ContextNotFound。同一快照再次写入会替换旧摘要
    pub fn store_summary(
        &mut self,
        context_id: &str,
        summary: impl Into<String>,
        insights: Vec<String>,
    ) -> Result<Summary, AgentError> {
        let snapshot = self
            .contexts
            .iter_mut()
            .find(|c| c.id == context_id)
            .ok_or_else(|| AgentError::ContextNotFound(context_id.to_string()))?;

        let record = Summary {
            id: format!("sum_{}", context_id),
            context_id: context_id.to_string(),
            summary: summary.into(),
            insights,
            created_at: Utc::now(),
        };
        snapshot.summary = Some(record.id.clone());

        self.summaries.retain(|s| s.context_id != context_id);
        self.summaries.push(record.clone());
        Ok(record)
    }

    /// 记录快照所属的回合
    pub fn tag_turn(&mut self, context_id: &str, turn_id: &str) -> Result<(), AgentError> {
        let snapshot = self
            .contexts
            .iter_mut()
            .find(|c| c.id == context_id)
            .ok_or_else(|| AgentError::ContextNotFound(context_id.to_string()))?;
        snapshot.turn_id = Some(turn_id.to_string());
        Ok(())
    }

    pub fn get_context_for_turn(&self, turn_id: &str) -> Option<&ContextSnapshot> {
        self.contexts
            .iter()
            .find(|c| c.turn_id.as_deref() == Some(turn_id))
    }

    pub fn get_context(&self, context_id: &str) -> Option<&ContextSnapshot> {
        self.contexts.iter().find(|c| c.id == context_id)
    }

    pub fn get_context_by_turn(&self, turn_number: u32) -> Option<&ContextSnapshot> {
        self.contexts.iter().find(|c| c.turn_number == turn_number)
    }

    pub fn get_current_turn(&self) -> u32 {
        self.current_turn
    }

    /// 按所属快照的回合顺序返回全部摘要
    pub fn get_all_summaries(&self) -> Vec<Summary> {
        let mut summaries = self.summaries.clone();
        summaries.sort_by_key(|s| self.owner_turn(&s.context_id));
        summaries
    }

    /// 最近 k 条摘要（不足 k 条时返回全部）
    pub fn get_recent_summaries(&self, k: usize) -> Vec<Summary> {
        let all = self.get_all_summaries();
        let start = all.len().saturating_sub(k);
        all[start..].to_vec()
    }

    /// 对摘要正文与洞察做大小写不敏感的子串匹配
    pub fn search_summaries(&self, keyword: &str) -> Vec<Summary> {
        let needle = keyword.to_lowercase();
        self.get_all_summaries()
            .into_iter()
            .filter(|s| s.matches(&needle))
            .collect()
    }

    pub fn get_total_summary_tokens(&self) -> usize {
        self.summaries.iter().map(Summary::token_estimate).sum()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn clear(&mut self) {
        self.current_turn = 0;
        self.contexts.clear();
        self.summaries.clear();
    }

    pub fn export(&self) -> ContextMemoryExport {
        ContextMemoryExport {
            current_turn: self.current_turn,
            contexts: self.contexts.clone(),
            summaries: self.get_all_summaries(),
        }
    }

    /// 完全替换当前状态
    pub fn import(&mut self, blob: ContextMemoryExport) {
        self.clear();
        self.current_turn = blob.current_turn;
        self.contexts = blob.contexts;
        self.summaries = blob.summaries;
        tracing::info!(
            contexts = self.contexts.len(),
            summaries = self.summaries.len(),
            turn = self.current_turn,
            "context memory imported"
        );
    }

    pub fn to_json(&self) -> Result<String, AgentError> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    pub fn from_json(&mut self, data: &str) -> Result<(), AgentError> {
        let blob: ContextMemoryExport = serde_json::from_str(data)?;
        self.import(blob);
        Ok(())
    }

    fn owner_turn(&self, context_id: &str) -> u32 {
        self.get_context(context_id)
            .map(|c| c.turn_number)
            .unwrap_or(u32::MAX)
    }
}

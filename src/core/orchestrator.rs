//! 回合编排器
//!
//! MemoryModule 把 TurnMemoryStore、ThinkingProcessor、ToolExecutor 组合成外层循环使用的单回合生命周期：
//! start_turn → perform_thinking_phase（可选）→ execute_tool_calls → complete_turn。
//! 同时维护会话级工具用量累计；单批次用量由执行器返回后并入。

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::memory::{
    ContextMemoryStore, Message, SessionExport, ToolCallResult, Turn, TurnMemoryStore,
};
use crate::skills::SkillManager;
use crate::thinking::{ThinkingPhaseResult, ThinkingProcessor};
use crate::tools::{ToolBatchOutcome, ToolExecutor, ToolRegistry, ToolUseRequest};

pub struct MemoryModule {
    turns: TurnMemoryStore,
    thinking: ThinkingProcessor,
    executor: ToolExecutor,
    tool_usage: HashMap<String, u32>,
    /// 最近一次执行阶段的结果，作为下一次思考阶段的输入
    last_tool_results: Vec<ToolCallResult>,
}

impl MemoryModule {
    pub fn new(
        session_id: impl Into<String>,
        thinking: ThinkingProcessor,
        executor: ToolExecutor,
    ) -> Self {
        Self {
            turns: TurnMemoryStore::new(session_id),
            thinking,
            executor,
            tool_usage: HashMap::new(),
            last_tool_results: Vec::new(),
        }
    }

    pub fn start_turn(
        &mut self,
        workspace_context: impl Into<String>,
        task_context: Option<String>,
    ) -> Result<Turn, AgentError> {
        self.turns.start_turn(workspace_context, task_context)
    }

    pub fn add_message(&mut self, message: Message) -> Result<Message, AgentError> {
        self.turns.add_message(message)
    }

    /// 思考阶段：当前回合进入 thinking，快照与摘要写入会话的 ContextMemoryStore
    pub async fn perform_thinking_phase(
        &mut self,
        workspace_context: &str,
        cancel: &CancellationToken,
    ) -> Result<ThinkingPhaseResult, AgentError> {
        let turn_id = self
            .turns
            .current_turn()
            .map(|t| t.id.clone())
            .ok_or(AgentError::NoActiveTurn)?;
        self.turns.begin_thinking()?;

        let history = self.turns.get_all_messages();
        let result = self
            .thinking
            .perform_thinking(
                &turn_id,
                &history,
                workspace_context,
                &self.last_tool_results,
                self.turns.context_mut(),
                cancel,
            )
            .await?;
        self.turns.record_thinking_rounds(result.rounds.clone())?;
        Ok(result)
    }

    /// 执行阶段：当前回合进入 acting，结果写入回合并累计用量
    pub async fn execute_tool_calls(
        &mut self,
        requests: &[ToolUseRequest],
        registry: &ToolRegistry,
        skills: &SkillManager,
        is_aborted: &(dyn Fn() -> bool + Sync),
    ) -> Result<ToolBatchOutcome, AgentError> {
        self.turns.begin_acting()?;
        let outcome = self
            .executor
            .execute_tool_calls(requests, registry, skills, is_aborted)
            .await?;

        self.turns
            .record_tool_results(outcome.user_message_content.clone())?;
        for (name, count) in &outcome.tool_usage {
            *self.tool_usage.entry(name.clone()).or_insert(0) += count;
        }
        self.last_tool_results = outcome.user_message_content.clone();
        Ok(outcome)
    }

    pub fn complete_turn(&mut self, turn_id: &str) -> Result<(), AgentError> {
        self.turns.complete_turn(turn_id)
    }

    pub fn abort_turn(&mut self, turn_id: &str, reason: impl Into<String>) -> Result<(), AgentError> {
        self.turns.abort_turn(turn_id, reason)
    }

    /// 会话累计的工具调用次数
    pub fn tool_usage(&self) -> &HashMap<String, u32> {
        &self.tool_usage
    }

    pub fn turn_store(&self) -> &TurnMemoryStore {
        &self.turns
    }

    pub fn context(&self) -> &ContextMemoryStore {
        self.turns.context()
    }

    pub fn context_mut(&mut self) -> &mut ContextMemoryStore {
        self.turns.context_mut()
    }

    pub fn thinking(&self) -> &ThinkingProcessor {
        &self.thinking
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn export(&self) -> SessionExport {
        let mut blob = self.turns.export();
        blob.tool_usage = self.tool_usage.clone();
        blob
    }

    /// 恢复会话；用量累计取自导出本身
    pub fn import(&mut self, mut blob: SessionExport) {
        self.tool_usage = std::mem::take(&mut blob.tool_usage);
        self.turns.import(blob);
        self.last_tool_results = self
            .turns
            .turns()
            .iter()
            .rev()
            .find(|t| !t.tool_results.is_empty())
            .map(|t| t.tool_results.clone())
            .unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::TurnStatus;
    use crate::thinking::ThinkingConfig;
    use crate::tools::{AttemptCompletionTool, EchoTool, COMPLETION_TOOL};
    use serde_json::json;

    fn module() -> MemoryModule {
        MemoryModule::new(
            "session-test",
            ThinkingProcessor::new(ThinkingConfig::default()),
            ToolExecutor::new(5),
        )
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(AttemptCompletionTool);
        registry
    }

    fn never() -> bool {
        false
    }

    #[tokio::test]
    async fn test_full_turn_lifecycle() {
        let mut module = module();
        let registry = registry();
        let skills = SkillManager::new();
        let cancel = CancellationToken::new();

        let turn = module.start_turn("ws", Some("say hi".into())).unwrap();
        module.add_message(Message::user("say hi")).unwrap();
        let thinking = module.perform_thinking_phase("ws", &cancel).await.unwrap();
        assert_eq!(thinking.turn_id, turn.id);
        assert!(thinking.should_proceed_to_action);

        let outcome = module
            .execute_tool_calls(
                &[ToolUseRequest::new("echo", json!({"text": "hi"}))],
                &registry,
                &skills,
                &never,
            )
            .await
            .unwrap();
        assert_eq!(outcome.user_message_content.len(), 1);
        module.complete_turn(&turn.id).unwrap();

        let stored = module.turn_store().get_turn(1).unwrap();
        assert_eq!(stored.status, TurnStatus::Completed);
        assert_eq!(stored.thinking_rounds.len(), 1);
        assert_eq!(stored.tool_results.len(), 1);
        assert_eq!(module.turn_store().context().len(), 1);
    }

    #[tokio::test]
    async fn test_usage_accumulates_across_batches() {
        let mut module = module();
        let registry = registry();
        let skills = SkillManager::new();

        for n in 0..2 {
            let turn = module.start_turn("ws", None).unwrap();
            module
                .execute_tool_calls(
                    &[ToolUseRequest::new("echo", json!({"text": n.to_string()}))],
                    &registry,
                    &skills,
                    &never,
                )
                .await
                .unwrap();
            module.complete_turn(&turn.id).unwrap();
        }
        assert_eq!(module.tool_usage().get("echo"), Some(&2));
    }

    #[tokio::test]
    async fn test_thinking_sees_prior_tool_results() {
        let mut module = module();
        let registry = registry();
        let skills = SkillManager::new();
        let cancel = CancellationToken::new();

        let first = module.start_turn("ws", None).unwrap();
        module
            .execute_tool_calls(
                &[ToolUseRequest::new("echo", json!({"text": "x"}))],
                &registry,
                &skills,
                &never,
            )
            .await
            .unwrap();
        module.complete_turn(&first.id).unwrap();

        module.start_turn("ws", None).unwrap();
        let thinking = module.perform_thinking_phase("ws", &cancel).await.unwrap();
        assert!(thinking.insights.contains(&"Tools used: echo".to_string()));
        assert_eq!(
            thinking.context_snapshot.unwrap().tool_calls,
            vec!["echo".to_string()]
        );
    }

    #[tokio::test]
    async fn test_thinking_without_turn_fails() {
        let mut module = module();
        let err = module
            .perform_thinking_phase("ws", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoActiveTurn));
    }

    #[tokio::test]
    async fn test_unknown_tool_leaves_turn_without_results() {
        let mut module = module();
        let turn = module.start_turn("ws", None).unwrap();
        let err = module
            .execute_tool_calls(
                &[ToolUseRequest::new("nonexistent_tool", json!({}))],
                &registry(),
                &SkillManager::new(),
                &never,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nonexistent_tool"));
        module.abort_turn(&turn.id, "bad tool").unwrap();
        let stored = module.turn_store().get_turn(1).unwrap();
        assert!(stored.tool_results.is_empty());
        assert_eq!(stored.status, TurnStatus::Aborted);
    }

    #[tokio::test]
    async fn test_export_import_restores_usage() {
        let mut module = module();
        let turn = module.start_turn("ws", None).unwrap();
        module
            .execute_tool_calls(
                &[ToolUseRequest::new(COMPLETION_TOOL, json!({"result": "done"}))],
                &registry(),
                &SkillManager::new(),
                &never,
            )
            .await
            .unwrap();
        module.complete_turn(&turn.id).unwrap();

        let turn = module.start_turn("ws", None).unwrap();
        // 参数校验失败的调用会记录结果，但不计入用量
        module
            .execute_tool_calls(
                &[ToolUseRequest::new(COMPLETION_TOOL, json!({}))],
                &registry(),
                &SkillManager::new(),
                &never,
            )
            .await
            .unwrap();
        module.complete_turn(&turn.id).unwrap();
        assert_eq!(module.tool_usage().get(COMPLETION_TOOL), Some(&1));
        assert_eq!(module.turn_store().get_turn(2).unwrap().tool_results.len(), 1);

        let mut restored = self::module();
        restored.import(module.export());
        assert_eq!(restored.tool_usage(), module.tool_usage());
        assert_eq!(restored.turn_store().turns().len(), 2);
        assert!(restored.start_turn("ws", None).is_ok());
    }
}

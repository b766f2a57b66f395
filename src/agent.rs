//! Agent 会话运行时
//!
//! 每个 AgentSession 独占自己的 MemoryModule、SkillManager 与取消令牌；ToolRegistry 以 Arc 只读共享，
//! 多个会话可以并发运行而不会互相串改激活技能。
//! AgentSessionBuilder 从 AppConfig 组装 ThinkingProcessor / ToolExecutor / LlmClient，
//! run_task 交给 react::loop_ 驱动。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::{AgentError, MemoryModule, SessionSupervisor, TaskScheduler};
use crate::llm::{LlmClient, RetryConfig, RetryingLlmClient};
use crate::memory::ContextPersistence;
use crate::react::{self, ReactEvent, RunOutcome};
use crate::skills::{Skill, SkillActivation, SkillDeactivation, SkillManager};
use crate::thinking::{SemanticCompressor, ThinkingProcessor};
use crate::tools::{
    AttemptCompletionTool, DelegateTaskTool, EchoTool, MiddlewareStack, Tool, ToolExecutor,
    ToolRegistry, ToolSource,
};
use crate::workspace::{NoteWorkspace, Workspace};

/// 控制工具（完成 / 委派）+ 额外工具；额外工具按 middleware 包装后注册为常驻工具
pub fn build_tool_registry(extra: Vec<Arc<dyn Tool>>, middleware: &MiddlewareStack) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(AttemptCompletionTool);
    tools.register(DelegateTaskTool);
    for tool in extra {
        tools.register_with_source(middleware.wrap(tool), ToolSource::Component);
    }
    tools
}

pub struct AgentSession {
    pub(crate) id: String,
    pub(crate) config: AppConfig,
    pub(crate) memory: MemoryModule,
    pub(crate) skills: SkillManager,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) workspace: Arc<dyn Workspace>,
    pub(crate) supervisor: SessionSupervisor,
    pub(crate) event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
    persistence: Option<ContextPersistence>,
}

impl AgentSession {
    pub fn builder(config: AppConfig) -> AgentSessionBuilder {
        AgentSessionBuilder::new(config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryModule {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryModule {
        &mut self.memory
    }

    pub fn skills(&self) -> &SkillManager {
        &self.skills
    }

    pub fn skills_mut(&mut self) -> &mut SkillManager {
        &mut self.skills
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    /// 会话取消句柄，可交给其他任务调用 cancel()
    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub async fn activate_skill(&mut self, name: &str) -> SkillActivation {
        let activation = self.skills.activate_skill(name).await;
        if activation.success {
            react::send_event(
                &self.event_tx,
                ReactEvent::SkillActivated {
                    name: name.to_string(),
                },
            );
        }
        activation
    }

    pub async fn deactivate_skill(&mut self) -> SkillDeactivation {
        self.skills.deactivate_skill().await
    }

    /// 运行一个任务直到完成、委派、中止或达到回合上限；结束后按配置保存上下文
    pub async fn run_task(&mut self, task: &str) -> Result<RunOutcome, AgentError> {
        let outcome = react::run_task(self, task).await;
        if let Err(e) = self.save_context() {
            tracing::warn!(session = %self.id, error = %e, "failed to persist context");
        }
        outcome
    }

    /// 将上下文快照与摘要写入 memory.persist_path；未配置时什么也不做
    pub fn save_context(&self) -> anyhow::Result<()> {
        match &self.persistence {
            Some(p) => p.save(self.memory.context()),
            None => Ok(()),
        }
    }
}

pub struct AgentSessionBuilder {
    config: AppConfig,
    session_id: Option<String>,
    llm: Option<Arc<dyn LlmClient>>,
    workspace: Option<Arc<dyn Workspace>>,
    registry: Option<Arc<ToolRegistry>>,
    skills: Vec<Skill>,
    compressor: Option<Arc<dyn SemanticCompressor>>,
    event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
}

impl AgentSessionBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            session_id: None,
            llm: None,
            workspace: None,
            registry: None,
            skills: Vec::new(),
            compressor: None,
            event_tx: None,
        }
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// 共享的工具注册表；未设置时为控制工具 + echo
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn skills(mut self, skills: impl IntoIterator<Item = Skill>) -> Self {
        self.skills.extend(skills);
        self
    }

    pub fn semantic_compressor(mut self, compressor: Arc<dyn SemanticCompressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn events(mut self, tx: mpsc::UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn build(self) -> Result<AgentSession, AgentError> {
        let cfg = self.config;
        let inner = self
            .llm
            .ok_or_else(|| AgentError::ConfigError("no LLM client configured".to_string()))?;
        let llm: Arc<dyn LlmClient> = Arc::new(RetryingLlmClient::new(
            inner,
            RetryConfig {
                max_retries: cfg.llm.max_retries,
                ..RetryConfig::default()
            },
        ));
        let workspace: Arc<dyn Workspace> = match self.workspace {
            Some(ws) => ws,
            None => Arc::new(NoteWorkspace::new()),
        };
        let registry = self
            .registry
            .unwrap_or_else(|| {
                Arc::new(build_tool_registry(vec![Arc::new(EchoTool)], &MiddlewareStack::new()))
            });

        let mut thinking = ThinkingProcessor::new(cfg.thinking.clone())
            .with_llm(llm.clone())
            .with_completion_tool(cfg.tools.completion_tool.clone());
        if let Some(compressor) = self.compressor {
            thinking = thinking.with_semantic_compressor(compressor);
        }

        let mut executor = ToolExecutor::new(cfg.tools.tool_timeout_secs)
            .with_workspace(workspace.clone())
            .with_completion_tool(cfg.tools.completion_tool.clone());
        if cfg.tools.parallel_independent_tools {
            executor =
                executor.with_parallel_tools(TaskScheduler::new(cfg.tools.max_concurrent_tools));
        }

        let id = self
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut memory = MemoryModule::new(id.clone(), thinking, executor);

        let persistence = cfg.memory.persist_path.as_ref().map(ContextPersistence::new);
        if let Some(p) = &persistence {
            match p.restore_into(memory.context_mut()) {
                Ok(true) => tracing::info!(path = %p.path().display(), "context restored"),
                Ok(false) => {}
                Err(e) => return Err(AgentError::Persistence(e.to_string())),
            }
        }

        let mut skills = SkillManager::new();
        skills.register_all(self.skills);

        tracing::info!(session = %id, tools = registry.tool_names().len(), "agent session ready");
        Ok(AgentSession {
            id,
            config: cfg,
            memory,
            skills,
            registry,
            llm,
            workspace,
            supervisor: SessionSupervisor::new(),
            event_tx: self.event_tx,
            persistence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::{Middleware, DELEGATE_TOOL};
    use std::time::Duration;

    #[test]
    fn test_build_requires_llm() {
        let err = AgentSession::builder(AppConfig::default()).build().err().unwrap();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    fn test_default_registry() {
        let middleware = MiddlewareStack::new().with(Middleware::Retry {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        });
        let registry = build_tool_registry(vec![Arc::new(EchoTool)], &middleware);
        let names = registry.tool_names();
        assert!(names.contains(&"attempt_completion".to_string()));
        assert!(names.contains(&DELEGATE_TOOL.to_string()));
        assert!(names.contains(&"echo".to_string()));
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_active_skill() {
        let registry = Arc::new(build_tool_registry(Vec::new(), &MiddlewareStack::new()));
        let skills = vec![Skill::new("ResearchAgent", "research")];
        let build = || {
            AgentSession::builder(AppConfig::default())
                .llm(Arc::new(MockLlmClient::new()))
                .registry(registry.clone())
                .skills(skills.clone())
                .build()
                .unwrap()
        };
        let mut a = build();
        let b = build();
        assert!(a.activate_skill("ResearchAgent").await.success);
        assert_eq!(a.skills().get_active_skill().map(|s| s.name.as_str()), Some("ResearchAgent"));
        assert!(b.skills().get_active_skill().is_none());
    }

    #[tokio::test]
    async fn test_restore_context_on_build() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("context.json");
        let mut cfg = AppConfig::default();
        cfg.memory.persist_path = Some(path.clone());

        let mut first = AgentSession::builder(cfg.clone())
            .llm(Arc::new(MockLlmClient::new()))
            .build()
            .unwrap();
        let outcome = first.run_task("hello").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert!(path.exists());

        let mut second = AgentSession::builder(cfg)
            .llm(Arc::new(MockLlmClient::new()))
            .build()
            .unwrap();
        assert_eq!(
            second.memory().context().get_all_summaries(),
            first.memory().context().get_all_summaries()
        );

        // 回合编号从 1 重新开始，快照计数接着恢复的值递增；两者通过 turn_id 对应
        second.run_task("again").await.unwrap();
        let turn = second.memory().turn_store().get_turn(1).unwrap();
        let snapshot = second
            .memory()
            .context()
            .get_context_for_turn(&turn.id)
            .unwrap();
        assert_eq!(snapshot.turn_number, 2);
        assert_eq!(
            first
                .memory()
                .context()
                .get_context_by_turn(1)
                .and_then(|c| c.turn_id.clone()),
            first.memory().turn_store().get_turn(1).map(|t| t.id.clone())
        );
    }
}

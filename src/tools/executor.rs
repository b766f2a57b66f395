//! 工具执行器
//!
//! 按批次派发模型发出的工具调用：先把整批工具名解析到「常驻工具 ∪ 激活技能工具」，
//! 任一未知名称则整批失败（ToolNotFound，列出可用工具）；随后逐个派发，每次派发前检查 is_aborted。
//! handler 失败或超时记为 success=false 并继续；完成工具执行后截断本批次剩余调用。
//! 每次调用输出结构化审计日志（JSON）。执行器本身不保存跨批次状态。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::{AgentError, TaskScheduler};
use crate::memory::{Message, ToolCallResult};
use crate::skills::SkillManager;
use crate::tools::{ToolRegistration, ToolRegistry, ToolUseRequest, COMPLETION_TOOL};
use crate::workspace::Workspace;

/// 一个批次的执行结果
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ToolBatchOutcome {
    /// 按派发顺序排列的结果，回填给模型的 user 消息
    pub user_message_content: Vec<ToolCallResult>,
    /// 本批次各工具的派发次数，由调用方并入会话累计
    pub tool_usage: HashMap<String, u32>,
    pub did_attempt_completion: bool,
    /// 因 is_aborted() 提前停止
    pub aborted: bool,
}

impl ToolBatchOutcome {
    /// 将结果拼成一条 tool_result 消息
    pub fn to_message(&self) -> Message {
        let body = self
            .user_message_content
            .iter()
            .map(ToolCallResult::render)
            .collect::<Vec<_>>()
            .join("\n");
        Message::tool_result(body)
    }

    fn record(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Ran(result) => {
                *self.tool_usage.entry(result.tool_name.clone()).or_insert(0) += 1;
                self.user_message_content.push(result);
            }
            Dispatch::Rejected(result) => self.user_message_content.push(result),
        }
    }
}

/// 单次派发：Ran 表示 handler 被调用（计入用量），Rejected 表示参数校验失败或无 handler
enum Dispatch {
    Ran(ToolCallResult),
    Rejected(ToolCallResult),
}

pub struct ToolExecutor {
    timeout: Duration,
    completion_tool: String,
    workspace: Option<Arc<dyn Workspace>>,
    /// Some 时允许相邻的无副作用工具并发
    scheduler: Option<TaskScheduler>,
}

impl ToolExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs.max(1)),
            completion_tool: COMPLETION_TOOL.to_string(),
            workspace: None,
            scheduler: None,
        }
    }

    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_completion_tool(mut self, name: impl Into<String>) -> Self {
        self.completion_tool = name.into();
        self
    }

    pub fn with_parallel_tools(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn completion_tool(&self) -> &str {
        &self.completion_tool
    }

    /// 当前可用工具：常驻工具在前，激活技能的同名工具覆盖之
    pub fn active_tools(registry: &ToolRegistry, skills: &SkillManager) -> Vec<ToolRegistration> {
        let mut by_name: HashMap<String, ToolRegistration> = registry
            .always_available()
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        for tool in skills.get_active_tools().into_iter().filter(|t| t.enabled) {
            if by_name.insert(tool.name().to_string(), tool).is_some() {
                tracing::debug!("skill tool shadows an always-available tool of the same name");
            }
        }
        let mut tools: Vec<ToolRegistration> = by_name.into_values().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub async fn execute_tool_calls(
        &self,
        requests: &[ToolUseRequest],
        registry: &ToolRegistry,
        skills: &SkillManager,
        is_aborted: &(dyn Fn() -> bool + Sync),
    ) -> Result<ToolBatchOutcome, AgentError> {
        let available = Self::active_tools(registry, skills);
        let resolved = resolve_all(requests, &available)?;

        let mut outcome = ToolBatchOutcome::default();
        let mut i = 0;
        while i < resolved.len() {
            if is_aborted() {
                tracing::info!(remaining = resolved.len() - i, "tool batch aborted");
                outcome.aborted = true;
                break;
            }

            let group_end = self.independent_group_end(&resolved, i);
            if group_end - i > 1 {
                let dispatches = join_all(
                    resolved[i..group_end]
                        .iter()
                        .map(|(req, reg)| self.dispatch_with_permit(req, reg)),
                )
                .await;
                for d in dispatches {
                    outcome.record(d);
                }
                i = group_end;
                continue;
            }

            let (req, reg) = resolved[i];
            let dispatch = self.dispatch(req, reg).await;
            outcome.record(dispatch);
            if req.name == self.completion_tool {
                outcome.did_attempt_completion = true;
                let skipped = resolved.len() - i - 1;
                if skipped > 0 {
                    tracing::info!(skipped, "completion signalled, skipping remaining tool calls");
                }
                break;
            }
            i += 1;
        }
        Ok(outcome)
    }

    /// 从 start 开始的连续无副作用工具区间终点；未开启并发时为 start + 1
    fn independent_group_end(
        &self,
        resolved: &[(&ToolUseRequest, &ToolRegistration)],
        start: usize,
    ) -> usize {
        if self.scheduler.is_none() {
            return start + 1;
        }
        let is_independent = |(req, reg): &(&ToolUseRequest, &ToolRegistration)| {
            reg.is_side_effect_free() && req.name != self.completion_tool
        };
        let len = resolved[start..]
            .iter()
            .take_while(|pair| is_independent(pair))
            .count();
        start + len.max(1)
    }

    async fn dispatch_with_permit(&self, req: &ToolUseRequest, reg: &ToolRegistration) -> Dispatch {
        let _permit = match &self.scheduler {
            Some(s) => s.acquire_tool().await,
            None => None,
        };
        self.dispatch(req, reg).await
    }

    async fn dispatch(&self, req: &ToolUseRequest, reg: &ToolRegistration) -> Dispatch {
        if let Err(errors) = reg.definition.parameters.validate(&req.input) {
            tracing::warn!(tool = %req.name, errors = errors.len(), "tool arguments rejected");
            return Dispatch::Rejected(ToolCallResult::failed(
                &req.name,
                json!({ "validation_errors": errors }),
            ));
        }

        let start = Instant::now();
        let args_preview = args_preview(&req.input);
        let result = match (&reg.handler, &self.workspace) {
            (Some(handler), _) => timeout(self.timeout, handler.execute(req.input.clone())).await,
            (None, Some(ws)) => {
                timeout(self.timeout, ws.handle_tool_call(&req.name, req.input.clone())).await
            }
            (None, None) => {
                return Dispatch::Rejected(ToolCallResult::failed(
                    &req.name,
                    json!({ "error": format!("no handler available for tool '{}'", req.name) }),
                ));
            }
        };

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": req.name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let result = match result {
            Ok(Ok(content)) => ToolCallResult::ok(&req.name, Value::String(content)),
            Ok(Err(e)) => ToolCallResult::failed(
                &req.name,
                json!({ "error": AgentError::ToolExecutionFailed(e).to_string() }),
            ),
            Err(_) => ToolCallResult::failed(
                &req.name,
                json!({ "error": AgentError::ToolTimeout(req.name.clone()).to_string() }),
            ),
        };
        Dispatch::Ran(result)
    }
}

/// 整批解析工具名；遇到未知名称立即失败，不派发任何调用
fn resolve_all<'a>(
    requests: &'a [ToolUseRequest],
    available: &'a [ToolRegistration],
) -> Result<Vec<(&'a ToolUseRequest, &'a ToolRegistration)>, AgentError> {
    requests
        .iter()
        .map(|req| {
            available
                .iter()
                .find(|t| t.name() == req.name)
                .map(|reg| (req, reg))
                .ok_or_else(|| AgentError::ToolNotFound {
                    name: req.name.clone(),
                    available: available.iter().map(|t| t.name().to_string()).collect(),
                })
        })
        .collect()
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

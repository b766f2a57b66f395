//! 回合驱动循环
//!
//! 每个回合：开回合 → 思考阶段（压缩 / 洞察 / 摘要）→ 调用 LLM → 执行工具批次 → 回填结果 → 关回合。
//! run_turn 把下一步作为数据返回（NextAction），run_task 同步解释它：继续、委派或结束。
//! 可选 event_tx：向前端推送 TurnStarted / Thinking / ToolCall / Observation / Completed 等事件。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::AgentSession;
use crate::core::AgentError;
use crate::llm::{CompletionRequest, LlmError};
use crate::memory::{Message, Summary};
use crate::react::ReactEvent;
use crate::tools::{tool_call_schema_json, ToolBatchOutcome, ToolExecutor, ToolUseRequest};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 思考内容展示最大字符数
const THINKING_PREVIEW_CHARS: usize = 800;

/// 委派目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateTarget {
    pub agent: String,
    pub task: String,
}

/// 一个回合结束后驱动循环该做什么
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    Continue,
    Delegate(DelegateTarget),
    Finish(String),
}

/// 一个任务的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { result: String, turns: u32 },
    Delegated { target: DelegateTarget, turns: u32 },
    Aborted { reason: String, turns: u32 },
    TurnLimit { turns: u32 },
}

pub(crate) fn send_event(tx: &Option<mpsc::UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 动态 system：基础 prompt + 技能列表 + 激活技能段落 + 最近摘要 + 工具调用格式
pub fn build_system_prompt(
    base: &str,
    skills_overview: &str,
    active_prompt: &str,
    recent_summaries: &[Summary],
) -> String {
    let mut system = base.trim().to_string();
    if !skills_overview.trim().is_empty() {
        system.push_str("\n\n");
        system.push_str(skills_overview.trim());
    }
    if !active_prompt.trim().is_empty() {
        system.push_str("\n\n");
        system.push_str(active_prompt.trim());
    }
    if !recent_summaries.is_empty() {
        system.push_str("\n\n## Recent context summaries\n");
        for s in recent_summaries {
            system.push_str(&format!("- {}\n", s.summary.replace('\n', " ")));
            for insight in &s.insights {
                system.push_str(&format!("  - {}\n", insight));
            }
        }
    }
    system.push_str("\n\n## Tool call format\n");
    system.push_str(&tool_call_schema_json());
    system
}

/// 运行单个回合；input 只在任务的第一个回合给出
pub async fn run_turn(
    session: &mut AgentSession,
    input: Option<&str>,
) -> Result<NextAction, AgentError> {
    let workspace_context = session.workspace.render_context();
    let turn = session
        .memory
        .start_turn(workspace_context.clone(), input.map(str::to_string))?;
    send_event(
        &session.event_tx,
        ReactEvent::TurnStarted {
            turn_number: turn.turn_number,
            max_turns: session.config.app.max_turns,
        },
    );

    match drive_turn(session, &turn.id, input, &workspace_context).await {
        Ok(next) => {
            session.memory.complete_turn(&turn.id)?;
            Ok(next)
        }
        Err(e) => {
            session.memory.abort_turn(&turn.id, e.to_string())?;
            send_event(&session.event_tx, ReactEvent::Error { text: e.to_string() });
            Err(e)
        }
    }
}

async fn drive_turn(
    session: &mut AgentSession,
    turn_id: &str,
    input: Option<&str>,
    workspace_context: &str,
) -> Result<NextAction, AgentError> {
    if let Some(text) = input {
        session.memory.add_message(Message::user(text))?;
    }
    let cancel = session.supervisor.cancel_token();
    if cancel.is_cancelled() {
        return Err(AgentError::Cancelled);
    }

    let thinking = session
        .memory
        .perform_thinking_phase(workspace_context, &cancel)
        .await?;
    send_event(
        &session.event_tx,
        ReactEvent::Thinking {
            rounds: thinking.rounds.len(),
            compressed: thinking.compression.is_some(),
            next_action: thinking.next_action.clone(),
        },
    );
    if !thinking.should_proceed_to_action {
        tracing::info!(turn_id, "thinking reports the task as completed");
        return Ok(NextAction::Finish(thinking.next_action));
    }

    let history = match thinking.compressed_history() {
        Some(compressed) => compressed.to_vec(),
        None => session.memory.turn_store().get_all_messages(),
    };
    let recent = session
        .memory
        .context()
        .get_recent_summaries(session.config.memory.recent_summaries);
    let request = CompletionRequest {
        system: build_system_prompt(
            &session.config.app.system_prompt,
            &session.skills.skills_overview(),
            &session.skills.active_prompt(),
            &recent,
        ),
        messages: history,
        tools: ToolExecutor::active_tools(&session.registry, &session.skills)
            .into_iter()
            .map(|t| t.definition)
            .collect(),
    };

    let timeout = Duration::from_secs(session.config.llm.request_timeout_secs.max(1));
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        r = tokio::time::timeout(timeout, session.llm.complete(&request)) => {
            r.unwrap_or(Err(LlmError::Timeout))
        }
    };
    let response = match response {
        Ok(r) => r,
        Err(LlmError::Cancelled) => return Err(AgentError::Cancelled),
        Err(e) => return Err(e.into()),
    };

    let (cumulative_prompt, cumulative_completion, cumulative_total) = session.llm.token_usage();
    tracing::debug!(cumulative_prompt, cumulative_completion, "llm usage");
    send_event(
        &session.event_tx,
        ReactEvent::TokenUsage {
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
            cumulative_total,
        },
    );

    let text = response.text_content();
    let requests = response.tool_uses();
    if !text.is_empty() {
        send_event(
            &session.event_tx,
            ReactEvent::ThinkingContent {
                text: preview(&text, THINKING_PREVIEW_CHARS),
            },
        );
    }
    session
        .memory
        .add_message(Message::assistant(text.clone()).with_tool_uses(requests.clone()))?;

    if requests.is_empty() {
        // 没有工具调用的纯文本回复视为最终答案
        send_event(&session.event_tx, ReactEvent::Completed { result: text.clone() });
        return Ok(NextAction::Finish(text));
    }

    for req in &requests {
        send_event(
            &session.event_tx,
            ReactEvent::ToolCall {
                tool: req.name.clone(),
                args: req.input.clone(),
            },
        );
    }

    let supervisor = session.supervisor.clone();
    let is_aborted = move || supervisor.is_aborted();
    let outcome = match session
        .memory
        .execute_tool_calls(&requests, &session.registry, &session.skills, &is_aborted)
        .await
    {
        Ok(outcome) => outcome,
        Err(e @ AgentError::ToolNotFound { .. }) => {
            // 整批作废；把可用工具列表回给模型，由它在下一回合纠正
            tracing::warn!(turn_id, error = %e, "tool batch rejected");
            session
                .memory
                .add_message(Message::tool_result(e.to_string()))?;
            send_event(&session.event_tx, ReactEvent::Error { text: e.to_string() });
            return Ok(NextAction::Continue);
        }
        Err(e) => return Err(e),
    };

    for r in &outcome.user_message_content {
        send_event(
            &session.event_tx,
            ReactEvent::Observation {
                tool: r.tool_name.clone(),
                success: r.success,
                preview: preview(&r.render(), OBSERVATION_PREVIEW_CHARS),
            },
        );
    }
    session.memory.add_message(outcome.to_message())?;

    if outcome.aborted {
        return Err(AgentError::Cancelled);
    }
    Ok(next_action(session, &requests, &outcome))
}

/// 完成工具成功 → Finish；委派工具成功 → Delegate；否则继续
fn next_action(
    session: &AgentSession,
    requests: &[ToolUseRequest],
    outcome: &ToolBatchOutcome,
) -> NextAction {
    let completion_tool = session.config.tools.completion_tool.as_str();
    let delegate_tool = session.config.tools.delegate_tool.as_str();

    if outcome.did_attempt_completion {
        let result = outcome
            .user_message_content
            .iter()
            .rev()
            .find(|r| r.tool_name == completion_tool && r.success)
            .map(|r| match &r.result {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        if let Some(result) = result {
            send_event(&session.event_tx, ReactEvent::Completed { result: result.clone() });
            return NextAction::Finish(result);
        }
    }

    let delegated = outcome
        .user_message_content
        .iter()
        .any(|r| r.tool_name == delegate_tool && r.success);
    if delegated {
        let target = requests
            .iter()
            .find(|r| r.name == delegate_tool)
            .and_then(|r| serde_json::from_value::<DelegateTarget>(r.input.clone()).ok());
        if let Some(target) = target {
            send_event(
                &session.event_tx,
                ReactEvent::Delegated {
                    agent: target.agent.clone(),
                    task: target.task.clone(),
                },
            );
            return NextAction::Delegate(target);
        }
    }
    NextAction::Continue
}

/// 运行任务：按需自动激活技能，然后逐回合推进直到结束或达到回合上限
pub async fn run_task(session: &mut AgentSession, task: &str) -> Result<RunOutcome, AgentError> {
    if session.config.skills.auto_activate && session.skills.get_active_skill().is_none() {
        if let Some(name) = session.skills.match_triggers(task).into_iter().next() {
            let activation = session.activate_skill(&name).await;
            for e in &activation.hook_errors {
                tracing::warn!(skill = %name, error = %e, "skill hook failed");
            }
        }
    }

    let max_turns = session.config.app.max_turns.max(1);
    let mut input = Some(task);
    for turns in 1..=max_turns {
        match run_turn(session, input.take()).await {
            Ok(NextAction::Continue) => continue,
            Ok(NextAction::Finish(result)) => {
                tracing::info!(session = %session.id, turns, "task completed");
                return Ok(RunOutcome::Completed { result, turns });
            }
            Ok(NextAction::Delegate(target)) => {
                tracing::info!(session = %session.id, agent = %target.agent, "task delegated");
                return Ok(RunOutcome::Delegated { target, turns });
            }
            Err(AgentError::Cancelled) => {
                return Ok(RunOutcome::Aborted {
                    reason: AgentError::Cancelled.to_string(),
                    turns,
                });
            }
            Err(e) => return Err(e),
        }
    }
    tracing::warn!(session = %session.id, max_turns, "turn limit reached");
    Ok(RunOutcome::TurnLimit { turns: max_turns })
}

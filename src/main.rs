//! Cortex 演示入口
//!
//! 初始化日志、加载配置与技能，用 Mock LLM + 内存笔记工作区跑一个任务并打印过程事件与结果。
//! 用法：cortex [任务文本] [--config path]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cortex::config::{load_config, AppConfig};
use cortex::llm::MockLlmClient;
use cortex::react::ReactEvent;
use cortex::skills::SkillLoader;
use cortex::tools::{EchoTool, Middleware, MiddlewareStack};
use cortex::workspace::NoteWorkspace;
use cortex::{build_tool_registry, AgentSession, RunOutcome};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cortex::observability::init();

    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut task_words = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = args.next().map(PathBuf::from);
        } else {
            task_words.push(arg);
        }
    }
    let task = if task_words.is_empty() {
        "Research the difference between a mutex and a semaphore".to_string()
    } else {
        task_words.join(" ")
    };

    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let loader = match &cfg.skills.dir {
        Some(dir) => SkillLoader::new(dir),
        None => SkillLoader::from_default(),
    };
    let skills = loader.load_all().context("Failed to load skills")?;

    let middleware = MiddlewareStack::new()
        .with(Middleware::Retry {
            max_attempts: 2,
            backoff: Duration::from_millis(200),
        })
        .with(Middleware::Cache { max_entries: 64 });
    let registry = Arc::new(build_tool_registry(vec![Arc::new(EchoTool)], &middleware));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = AgentSession::builder(cfg)
        .llm(Arc::new(MockLlmClient::new()))
        .workspace(Arc::new(NoteWorkspace::new()))
        .registry(registry)
        .skills(skills)
        .events(event_tx)
        .build()
        .context("Failed to build agent session")?;

    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            if let ReactEvent::TokenUsage { .. } = ev {
                continue;
            }
            match serde_json::to_string(&ev) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("failed to encode event: {}", e),
            }
        }
    });

    let outcome = session.run_task(&task).await;
    drop(session);
    let _ = printer.await;

    match outcome.context("Task failed")? {
        RunOutcome::Completed { result, turns } => {
            println!("Completed after {} turn(s): {}", turns, result)
        }
        RunOutcome::Delegated { target, turns } => println!(
            "Delegated to {} after {} turn(s): {}",
            target.agent, turns, target.task
        ),
        RunOutcome::Aborted { reason, turns } => {
            println!("Aborted after {} turn(s): {}", turns, reason)
        }
        RunOutcome::TurnLimit { turns } => println!("Stopped at the {} turn limit", turns),
    }
    Ok(())
}

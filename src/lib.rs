//! Cortex - Agent 回合编排与上下文压缩核心
//!
//! 模块划分：
//! - **agent**: AgentSession 会话运行时与构建器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、MemoryModule 回合编排、会话监管、任务调度
//! - **llm**: 补全服务抽象、重试包装与 Mock
//! - **memory**: 消息、回合状态机、上下文快照 / 摘要存储、Token 估算与持久化
//! - **observability**: 日志初始化
//! - **react**: 回合驱动循环与过程事件
//! - **skills**: 技能定义、单激活管理器与目录加载器
//! - **thinking**: 思考阶段（压缩策略、洞察、反思轮）
//! - **tools**: 工具注册表、参数校验、中间件与批次执行器
//! - **workspace**: 工作区协作者

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod skills;
pub mod thinking;
pub mod tools;
pub mod workspace;

pub use agent::{build_tool_registry, AgentSession, AgentSessionBuilder};
pub use core::{AgentError, MemoryModule};
pub use react::{NextAction, RunOutcome};

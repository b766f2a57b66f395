//! 核心编排层：错误类型、回合编排、会话监管、任务调度

pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod task_scheduler;

pub use error::AgentError;
pub use orchestrator::MemoryModule;
pub use session_supervisor::SessionSupervisor;
pub use task_scheduler::TaskScheduler;

//! 工具箱：注册表、参数校验、控制工具、中间件与批次执行器

pub mod control;
pub mod echo;
pub mod executor;
pub mod middleware;
pub mod params;
pub mod registry;
pub mod schema;

pub use control::{AttemptCompletionTool, DelegateTaskTool, COMPLETION_TOOL, DELEGATE_TOOL};
pub use echo::EchoTool;
pub use executor::{ToolBatchOutcome, ToolExecutor};
pub use middleware::{Middleware, MiddlewareStack};
pub use params::{ParamSchema, ParamSpec, ParamType, ValidationError};
pub use registry::{Tool, ToolDefinition, ToolRegistration, ToolRegistry, ToolSource};
pub use schema::{tool_call_schema_json, ToolUseRequest};

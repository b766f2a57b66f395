//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CORTEX__*` 覆盖（双下划线表示嵌套，如 `CORTEX__THINKING__WINDOW_SIZE=20`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::thinking::ThinkingConfig;
use crate::tools::{COMPLETION_TOOL, DELEGATE_TOOL};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub thinking: ThinkingConfig,
    pub tools: ToolsSection,
    pub skills: SkillsSection,
    pub memory: MemorySection,
}

/// [app] 段：应用名、单个任务的回合上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 基础 system prompt
    pub system_prompt: String,
    /// 单个任务最多运行的回合数，超过后中止当前回合
    pub max_turns: u32,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "cortex".to_string(),
            system_prompt: "You are a careful assistant. Work in small steps, use the available \
                            tools, and call attempt_completion with the final answer when done."
                .to_string(),
            max_turns: 20,
        }
    }
}

/// [llm] 段：补全调用的超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            max_retries: 2,
        }
    }
}

/// [tools] 段：工具超时、并发与控制工具名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 相邻的无副作用工具是否并发执行
    pub parallel_independent_tools: bool,
    pub max_concurrent_tools: usize,
    pub completion_tool: String,
    pub delegate_tool: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            parallel_independent_tools: false,
            max_concurrent_tools: 3,
            completion_tool: COMPLETION_TOOL.to_string(),
            delegate_tool: DELEGATE_TOOL.to_string(),
        }
    }
}

/// [skills] 段：技能目录，未设置时按 config/skills、../config/skills 查找
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkillsSection {
    pub dir: Option<PathBuf>,
    /// 任务文本命中触发词时自动激活技能
    pub auto_activate: bool,
}

impl Default for SkillsSection {
    fn default() -> Self {
        Self {
            dir: None,
            auto_activate: true,
        }
    }
}

/// [memory] 段：上下文持久化与提示中引用的摘要数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// 上下文导出文件；未设置时不落盘
    pub persist_path: Option<PathBuf>,
    /// 拼入 system prompt 的最近摘要条数
    pub recent_summaries: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            persist_path: None,
            recent_summaries: 3,
        }
    }
}

/// 从 config 目录加载配置，环境变量 CORTEX__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CORTEX__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipping");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CORTEX")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thinking::CompressionStrategy;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.thinking.window_size, 10);
        assert_eq!(cfg.tools.completion_tool, "attempt_completion");
        assert_eq!(cfg.tools.delegate_tool, "delegate_task");
        assert!(!cfg.tools.parallel_independent_tools);
        assert_eq!(cfg.memory.recent_summaries, 3);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[thinking]
strategy = "token_budget"
token_budget = 1200

[tools]
parallel_independent_tools = true
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.thinking.strategy, CompressionStrategy::TokenBudget);
        assert_eq!(cfg.thinking.token_budget, 1200);
        assert_eq!(cfg.thinking.window_size, 10);
        assert!(cfg.tools.parallel_independent_tools);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
    }
}

//! 工作区协作者
//!
//! 核心只依赖两件事：render_context() 作为思考阶段的 workspace_context 输入，
//! handle_tool_call() 处理没有自带 handler 的工具（例如从 skill.toml 加载的技能工具）。

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Workspace: Send + Sync {
    fn render_context(&self) -> String;

    async fn handle_tool_call(&self, name: &str, params: Value) -> Result<String, String>;
}

/// 内存笔记工作区：write_note / read_note / list_notes，供二进制演示与测试
#[derive(Debug, Default)]
pub struct NoteWorkspace {
    notes: RwLock<BTreeMap<String, String>>,
}

impl NoteWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&self, key: &str) -> Option<String> {
        self.notes.read().ok()?.get(key).cloned()
    }
}

fn str_arg<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing string argument '{key}'"))
}

#[async_trait]
impl Workspace for NoteWorkspace {
    fn render_context(&self) -> String {
        let Ok(notes) = self.notes.read() else {
            return "## Workspace\n(unavailable)".to_string();
        };
        if notes.is_empty() {
            return "## Workspace\n(no notes)".to_string();
        }
        let mut s = String::from("## Workspace notes\n");
        for (key, value) in notes.iter() {
            s.push_str(&format!("- {}: {}\n", key, value));
        }
        s
    }

    async fn handle_tool_call(&self, name: &str, params: Value) -> Result<String, String> {
        match name {
            "write_note" => {
                let key = str_arg(&params, "key")?;
                let content = str_arg(&params, "content")?;
                self.notes
                    .write()
                    .map_err(|e| e.to_string())?
                    .insert(key.to_string(), content.to_string());
                Ok(format!("Saved note '{key}'"))
            }
            "read_note" => {
                let key = str_arg(&params, "key")?;
                self.note(key)
                    .ok_or_else(|| format!("note '{key}' not found"))
            }
            "list_notes" => {
                let notes = self.notes.read().map_err(|e| e.to_string())?;
                Ok(notes.keys().cloned().collect::<Vec<_>>().join(", "))
            }
            other => Err(format!("workspace does not handle tool '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_then_read() {
        let ws = NoteWorkspace::new();
        ws.handle_tool_call("write_note", json!({"key": "plan", "content": "outline"}))
            .await
            .unwrap();
        assert_eq!(
            ws.handle_tool_call("read_note", json!({"key": "plan"})).await.unwrap(),
            "outline"
        );
        assert!(ws.render_context().contains("- plan: outline"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_args() {
        let ws = NoteWorkspace::new();
        assert!(ws.handle_tool_call("format_disk", json!({})).await.is_err());
        let err = ws.handle_tool_call("write_note", json!({"key": "k"})).await.unwrap_err();
        assert!(err.contains("content"));
        assert_eq!(ws.render_context(), "## Workspace\n(no notes)");
    }
}

//! 上下文持久化
//!
//! 将 ContextMemoryStore 的导出写入 / 从 JSON 文件加载，用于跨进程恢复会话（可选使用）。

use std::path::{Path, PathBuf};

use crate::memory::{ContextMemoryExport, ContextMemoryStore};

/// 单文件 JSON 持久化
#[derive(Debug)]
pub struct ContextPersistence {
    path: PathBuf,
}

impl ContextPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取导出；文件不存在时返回 None
    pub fn load(&self) -> anyhow::Result<Option<ContextMemoryExport>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// 加载到给定 store（整体替换）；返回是否找到文件
    pub fn restore_into(&self, store: &mut ContextMemoryStore) -> anyhow::Result<bool> {
        match self.load()? {
            Some(blob) => {
                store.import(blob);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 写入导出；父目录不存在时自动创建
    pub fn save(&self, store: &ContextMemoryStore) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, store.to_json()?)?;
        tracing::info!(path = %self.path.display(), contexts = store.len(), "context memory saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_restore() {
        let dir = TempDir::new().unwrap();
        let persistence = ContextPersistence::new(dir.path().join("nested/memory.json"));

        let mut store = ContextMemoryStore::new();
        let snap = store.store_context("ws state", Some(vec!["echo".into()]));
        store.store_summary(&snap.id, "echoed", vec!["Tools used: echo".into()]).unwrap();
        persistence.save(&store).unwrap();

        let mut restored = ContextMemoryStore::new();
        assert!(persistence.restore_into(&mut restored).unwrap());
        assert_eq!(restored.export(), store.export());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let persistence = ContextPersistence::new(dir.path().join("absent.json"));
        let mut store = ContextMemoryStore::new();
        assert!(!persistence.restore_into(&mut store).unwrap());
        assert!(persistence.load().unwrap().is_none());
    }
}

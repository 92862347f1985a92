//! 脚本源码定位
//!
//! 按配置的搜索路径与扩展名把脚本名解析为文件。
//! `require("ai/patrol")` 风格的名称会在每个搜索路径下查找 `ai/patrol.js`。

use crate::config::ScriptingConfig;
use crate::core::error::{ScriptError, ScriptResult};
use std::fs;
use std::path::{Path, PathBuf};

/// 已读取的脚本源码
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSource {
    /// 脚本名（用于日志与错误信息）
    pub name: String,
    pub path: PathBuf,
    pub code: String,
}

/// 脚本加载器
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    search_paths: Vec<PathBuf>,
    extension: String,
}

impl ScriptLoader {
    pub fn new(search_paths: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            search_paths,
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &ScriptingConfig) -> Self {
        Self::new(config.search_paths.clone(), config.script_extension.clone())
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// 解析脚本路径
    ///
    /// 已存在的路径直接使用；否则在各搜索路径下依次查找，缺少扩展名时自动补全。
    pub fn resolve(&self, script: &str) -> ScriptResult<PathBuf> {
        let direct = Path::new(script);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        let file_name = if script.ends_with(&self.extension) {
            script.to_string()
        } else {
            format!("{}{}", script, self.extension)
        };

        self.search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ScriptError::NotFound(script.to_string()))
    }

    /// 解析并读取脚本源码
    pub fn load(&self, script: &str) -> ScriptResult<ScriptSource> {
        let path = self.resolve(script)?;
        let code = fs::read_to_string(&path)?;
        tracing::debug!(target: "bridge.js", script, path = %path.display(), "script source read");
        Ok(ScriptSource {
            name: script.to_string(),
            path,
            code,
        })
    }
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::from_config(&ScriptingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_through_search_paths() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(second.path().join("ai")).unwrap();
        fs::write(second.path().join("ai").join("patrol.js"), "// patrol").unwrap();

        let loader = ScriptLoader::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            ".js",
        );

        let source = loader.load("ai/patrol").unwrap();
        assert_eq!(source.path, second.path().join("ai").join("patrol.js"));
        assert_eq!(source.code, "// patrol");
        assert_eq!(loader.resolve("ai/patrol.js").unwrap(), source.path);
    }

    #[test]
    fn test_earlier_search_path_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("main.js"), "1").unwrap();
        fs::write(second.path().join("main.js"), "2").unwrap();

        let mut loader = ScriptLoader::new(vec![first.path().to_path_buf()], ".js");
        loader.add_search_path(second.path());

        assert_eq!(loader.load("main").unwrap().code, "1");
    }

    #[test]
    fn test_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ScriptLoader::new(vec![dir.path().to_path_buf()], ".js");
        assert!(matches!(
            loader.load("nowhere"),
            Err(ScriptError::NotFound(name)) if name == "nowhere"
        ));
    }
}

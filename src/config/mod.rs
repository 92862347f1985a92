/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量和启动期校验
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::impl_default;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 桥接层主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 脚本配置
    #[serde(default)]
    pub scripting: ScriptingConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 按扩展名加载（`.json` 为JSON，其余为TOML）
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("BRIDGE_UPDATE_ENTRY_POINT") {
            if !val.is_empty() {
                self.scripting.update_entry_point = val;
            }
        }
        if let Ok(val) = env::var("BRIDGE_HANDLE_SHARING") {
            if let Ok(sharing) = val.parse() {
                self.scripting.handle_sharing = sharing;
            }
        }
        if let Ok(val) = env::var("BRIDGE_LOG_LEVEL") {
            if let Ok(level) = val.parse() {
                self.logging.level = level;
            }
        }
        if let Some(path) = env::var_os("BRIDGE_SCRIPT_PATH") {
            self.scripting.search_paths.push(PathBuf::from(path));
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.scripting.validate()
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./bridge.toml
    /// 2. ./bridge.json
    /// 3. <用户配置目录>/script_bridge/bridge.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        for candidate in ["bridge.toml", "bridge.json"] {
            if let Ok(config) = Self::from_file(candidate) {
                tracing::info!(target: "bridge", path = candidate, "Loaded bridge config");
                return config;
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("script_bridge").join("bridge.toml");

            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "bridge", path = ?config_path, "Loaded bridge config");
                return config;
            }
        }

        tracing::info!(target: "bridge", "Using default bridge configuration");
        Self::default()
    }
}

/// 句柄表共享策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleSharing {
    /// 每个脚本环境独占一张句柄表，句柄对其他脚本不可见
    PerScript,
    /// 所有脚本环境共用一张句柄表
    Shared,
}

impl fmt::Display for HandleSharing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleSharing::PerScript => f.write_str("PerScript"),
            HandleSharing::Shared => f.write_str("Shared"),
        }
    }
}

impl FromStr for HandleSharing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "perscript" => Ok(HandleSharing::PerScript),
            "shared" => Ok(HandleSharing::Shared),
            _ => Err(ConfigError::ParseError(format!(
                "unknown handle sharing mode '{}'",
                s
            ))),
        }
    }
}

/// 脚本配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// 每帧调用的入口点名称
    pub update_entry_point: String,

    /// 句柄表共享策略
    pub handle_sharing: HandleSharing,

    /// 缺少入口点的脚本在剩余会话中跳过
    pub skip_missing_entry_point: bool,

    /// 连续失败多少次后停用脚本（None 表示从不停用）
    pub disable_after_failures: Option<u32>,

    /// 脚本搜索路径
    pub search_paths: Vec<PathBuf>,

    /// 脚本文件扩展名
    pub script_extension: String,

    /// 编写期声明文件；设置后启动时与注册表核对
    pub declarations: Option<PathBuf>,
}

impl_default!(ScriptingConfig {
    update_entry_point: "globalFunction".to_string(),
    handle_sharing: HandleSharing::PerScript,
    skip_missing_entry_point: true,
    disable_after_failures: None,
    search_paths: vec![PathBuf::from("scripts")],
    script_extension: ".js".to_string(),
    declarations: None,
});

impl ScriptingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.update_entry_point.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "update_entry_point must not be empty".to_string(),
            ));
        }
        if !self.script_extension.starts_with('.') || self.script_extension.len() < 2 {
            return Err(ConfigError::ValidationError(format!(
                "script_extension '{}' must look like '.js'",
                self.script_extension
            )));
        }
        if self.disable_after_failures == Some(0) {
            return Err(ConfigError::ValidationError(
                "disable_after_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出日志 target
    pub with_target: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    with_target: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::ParseError(format!("unknown log level '{}'", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scripting.update_entry_point, "globalFunction");
        assert_eq!(config.scripting.handle_sharing, HandleSharing::PerScript);
        assert_eq!(config.scripting.script_extension, ".js");
    }

    #[test]
    fn test_partial_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [scripting]
            handle_sharing = "Shared"
            disable_after_failures = 3

            [logging]
            level = "Debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.scripting.handle_sharing, HandleSharing::Shared);
        assert_eq!(config.scripting.disable_after_failures, Some(3));
        assert_eq!(config.scripting.update_entry_point, "globalFunction");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.with_target);
    }

    #[test]
    fn test_toml_serialization() {
        let config = BridgeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_json_serialization() {
        let config = BridgeConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed: BridgeConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.scripting.search_paths.push(PathBuf::from("mods"));

        let toml_path = dir.path().join("bridge.toml");
        config.save_toml(&toml_path).unwrap();
        assert_eq!(BridgeConfig::from_file(&toml_path).unwrap(), config);

        let json_path = dir.path().join("bridge.json");
        config.save_json(&json_path).unwrap();
        assert_eq!(BridgeConfig::from_file(&json_path).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let mut config = BridgeConfig::default();
        config.scripting.update_entry_point = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = BridgeConfig::default();
        config.scripting.script_extension = "js".to_string();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.scripting.disable_after_failures = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("per_script".parse::<HandleSharing>().unwrap(), HandleSharing::PerScript);
        assert_eq!("SHARED".parse::<HandleSharing>().unwrap(), HandleSharing::Shared);
        assert!("global".parse::<HandleSharing>().is_err());
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            BridgeConfig::from_toml_file("/nonexistent/bridge.toml"),
            Err(ConfigError::FileError(_))
        ));
    }
}

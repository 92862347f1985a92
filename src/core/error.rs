//! 统一错误处理模块
//!
//! 提供桥接层范围内的错误类型定义
//!
//! ## 错误类型分层
//!
//! - **编组错误** (`MarshalError`): 单个值跨边界转换失败
//! - **注册错误** (`RegistryError`): 启动阶段的配置错误，必须在任何 tick 之前失败
//! - **分派错误** (`DispatchError`): 单次调用失败，按脚本环境隔离，总是以值的形式返回
//! - **脚本错误** (`ScriptError`): 脚本加载、编译阶段的错误
//!
//! `BridgeError` 汇总以上所有错误，供宿主入口使用。

use crate::bindings::types::{Handle, Scope, ValueType};
use crate::config::ConfigError;
use thiserror::Error;

/// 桥接层顶层错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// 值编组错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueType, found: String },

    #[error("integer {value} cannot be represented as a number without precision loss")]
    PrecisionLoss { value: i64 },

    #[error("unsupported script value of kind {kind}")]
    Unsupported { kind: String },

    #[error("native objects can only cross the boundary as the result of a static factory")]
    UnboundObject,
}

/// 句柄已失效或从未存在
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stale handle {0}")]
pub struct StaleHandleError(pub Handle);

/// 注册表配置错误（启动期致命）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("duplicate symbol '{name}' in {scope} scope")]
    DuplicateSymbol { scope: Scope, name: String },

    #[error("invalid symbol {symbol}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    #[error("signature mismatch: declared {declared}, registered {registered}")]
    SignatureMismatch { declared: String, registered: String },

    #[error("registered symbol {symbol} is not declared")]
    Undeclared { symbol: String },

    #[error("declared symbol {symbol} has no native implementation")]
    Unimplemented { symbol: String },

    #[error("process-wide registry is already installed")]
    AlreadyInstalled,
}

/// 调用分派错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("symbol '{name}' not found in {scope} scope")]
    NotFound { scope: Scope, name: String },

    #[error("'{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("'{name}' argument {index}: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        index: usize,
        expected: ValueType,
        found: String,
    },

    #[error("'{name}' argument {index}: integer {value} exceeds the safe number range")]
    PrecisionLoss {
        name: String,
        index: usize,
        value: i64,
    },

    #[error("stale handle {handle}")]
    StaleHandle { handle: Handle },

    #[error("'{name}' called on a {found} handle, expected {expected}")]
    ReceiverMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("script does not define entry point '{name}'")]
    MissingEntryPoint { name: String },

    #[error("'{name}' returned {found}, declared {expected}")]
    InvalidReturn {
        name: String,
        expected: ValueType,
        found: String,
    },

    #[error("native call '{symbol}' failed: {detail}")]
    NativeInvocation { symbol: String, detail: String },

    #[error("script error in '{name}': {detail}")]
    ScriptFailure { name: String, detail: String },
}

impl DispatchError {
    /// 将参数编组错误定位到具体的参数位置
    pub fn argument(name: &str, index: usize, expected: &ValueType, err: MarshalError) -> Self {
        match err {
            MarshalError::TypeMismatch { found, .. } | MarshalError::Unsupported { kind: found } => {
                DispatchError::TypeMismatch {
                    name: name.to_string(),
                    index,
                    expected: expected.clone(),
                    found,
                }
            }
            MarshalError::PrecisionLoss { value } => DispatchError::PrecisionLoss {
                name: name.to_string(),
                index,
                value,
            },
            MarshalError::UnboundObject => DispatchError::NativeInvocation {
                symbol: name.to_string(),
                detail: MarshalError::UnboundObject.to_string(),
            },
        }
    }

    /// 是否为缺失入口点错误
    pub fn is_missing_entry_point(&self) -> bool {
        matches!(self, DispatchError::MissingEntryPoint { .. })
    }
}

impl From<StaleHandleError> for DispatchError {
    fn from(err: StaleHandleError) -> Self {
        DispatchError::StaleHandle { handle: err.0 }
    }
}

/// 脚本加载错误
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script compilation error: {0}")]
    Compilation(String),

    #[error("Script runtime error: {0}")]
    Runtime(String),

    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Invalid script binding: {0}")]
    InvalidBinding(String),

    #[error("Script IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type MarshalResult<T> = Result<T, MarshalError>;
pub type RegistryResult<T> = Result<T, RegistryError>;
pub type DispatchResult<T> = Result<T, DispatchError>;
pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let stale: DispatchError = StaleHandleError(Handle::from_raw(7)).into();
        assert_eq!(
            stale,
            DispatchError::StaleHandle {
                handle: Handle::from_raw(7)
            }
        );

        let bridge: BridgeError = RegistryError::AlreadyInstalled.into();
        assert!(matches!(bridge, BridgeError::Registry(_)));
    }

    #[test]
    fn test_argument_error_keeps_index() {
        let err = DispatchError::argument(
            "spawn",
            2,
            &ValueType::Number,
            MarshalError::TypeMismatch {
                expected: ValueType::Number,
                found: "string".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "'spawn' argument 2: expected number, found string"
        );
    }
}

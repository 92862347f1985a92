//! 核心模块
//!
//! 包含桥接层的基础设施：
//! - `error` - 错误类型定义
//! - `logging` - 日志初始化
//! - `macros` - 通用宏

pub mod error;
pub mod logging;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{
    BridgeError, BridgeResult, DispatchError, DispatchResult, MarshalError, MarshalResult,
    RegistryError, RegistryResult, ScriptError, ScriptResult, StaleHandleError,
};

pub use logging::init_logging;

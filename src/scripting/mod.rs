//! 脚本子系统
//!
//! - `dispatcher` - 脚本 -> native 调用分派
//! - `environment` - 每脚本一个执行环境与后端接口
//! - `js` / `native_script` - QuickJS 与 Rust 脚本后端
//! - `frame` - 每帧调用脚本更新入口点
//! - `loader` / `runtime` - 脚本定位与环境加载
//! - `engine_api` - 暴露给脚本的引擎服务

pub mod dispatcher;
pub mod engine_api;
pub mod environment;
pub mod frame;
pub mod js;
pub mod loader;
pub mod native_script;
pub mod runtime;

pub use dispatcher::{CallDispatcher, CallFrame, CallSite};
pub use engine_api::{
    engine_declarations, register_engine_api, EngineCommand, EngineServices, InputState,
    MyNativeBinding, ENGINE_DECLARATIONS, SAMPLE_SCRIPT,
};
pub use environment::{EntryPointSignature, ScriptBackend, ScriptEnvironment, ScriptHost};
pub use frame::{FrameDriver, FrameReport, ScriptId, ScriptTick, TickResult};
pub use js::JsScript;
pub use loader::{ScriptLoader, ScriptSource};
pub use native_script::{NativeScript, NativeScriptFn};
pub use runtime::ScriptRuntime;

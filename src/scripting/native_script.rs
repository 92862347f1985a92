//! Rust 编写的脚本
//!
//! 入口点以闭包形式提供，通过 [`ScriptHost`] 调用 native 符号。
//! 与 JS 脚本走完全相同的分派路径，主要用于测试和引擎内置逻辑。

use crate::bindings::value::ScriptValue;
use crate::core::error::{DispatchError, DispatchResult};
use crate::scripting::environment::{ScriptBackend, ScriptHost};
use std::collections::HashMap;

/// 入口点闭包
pub type NativeScriptFn =
    Box<dyn FnMut(&ScriptHost, &[ScriptValue]) -> DispatchResult<ScriptValue> + 'static>;

/// Rust 脚本
#[derive(Default)]
pub struct NativeScript {
    name: String,
    entry_points: HashMap<String, NativeScriptFn>,
}

impl NativeScript {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_points: HashMap::new(),
        }
    }

    /// 定义入口点；同名入口点被替换
    pub fn define<F>(mut self, name: impl Into<String>, entry: F) -> Self
    where
        F: FnMut(&ScriptHost, &[ScriptValue]) -> DispatchResult<ScriptValue> + 'static,
    {
        self.entry_points.insert(name.into(), Box::new(entry));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ScriptBackend for NativeScript {
    fn backend_name(&self) -> &'static str {
        "native"
    }

    fn has_entry_point(&self, name: &str) -> bool {
        self.entry_points.contains_key(name)
    }

    fn call_entry_point(
        &mut self,
        host: &ScriptHost,
        name: &str,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue> {
        match self.entry_points.get_mut(name) {
            Some(entry) => entry(host, args),
            None => Err(DispatchError::MissingEntryPoint {
                name: name.to_string(),
            }),
        }
    }
}

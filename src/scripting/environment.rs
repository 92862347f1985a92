//! 脚本环境
//!
//! 每个已加载的脚本对应一个 [`ScriptEnvironment`]：持有脚本后端、
//! 该脚本可见的 native 符号（通过分派器）以及引擎期望的入口点签名。
//! 环境之间不共享任何脚本侧状态。

use crate::bindings::handles::HandleTable;
use crate::bindings::types::{Handle, PrimitiveType, Scope, ValueType};
use crate::bindings::value::{ScriptValue, ValueMarshaler};
use crate::core::error::{DispatchError, DispatchResult, StaleHandleError};
use crate::scripting::dispatcher::{CallDispatcher, CallSite};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 引擎调用脚本入口点时遵循的签名
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPointSignature {
    pub name: String,
    pub params: Vec<PrimitiveType>,
    pub returns: ValueType,
}

impl EntryPointSignature {
    pub fn new(name: impl Into<String>, params: Vec<PrimitiveType>, returns: ValueType) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
        }
    }

    /// 每帧更新入口点：`(dt: number) -> string`
    pub fn update(name: impl Into<String>) -> Self {
        Self::new(name, vec![PrimitiveType::Number], ValueType::String)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for EntryPointSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params.iter().map(PrimitiveType::as_str).collect();
        write!(f, "{}({}) -> {}", self.name, params.join(", "), self.returns)
    }
}

/// 脚本代码调用 native 符号的入口
///
/// 所有调用都经过分派器，并标记为来自所属脚本。
#[derive(Clone)]
pub struct ScriptHost {
    dispatcher: CallDispatcher,
    site: CallSite,
}

impl ScriptHost {
    pub fn new(dispatcher: CallDispatcher, script: impl Into<String>) -> Self {
        Self {
            dispatcher,
            site: CallSite::Script(script.into()),
        }
    }

    /// 调用全局函数
    pub fn call(&self, name: &str, args: &[ScriptValue]) -> DispatchResult<ScriptValue> {
        self.dispatcher
            .invoke_at(&self.site, name, &Scope::Global, None, args)
    }

    /// 调用静态工厂
    pub fn call_static(&self, class: &str, name: &str, args: &[ScriptValue]) -> DispatchResult<ScriptValue> {
        self.dispatcher
            .invoke_at(&self.site, name, &Scope::class(class), None, args)
    }

    /// 在句柄上调用实例方法
    pub fn call_method(
        &self,
        class: &str,
        receiver: Handle,
        name: &str,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue> {
        self.dispatcher
            .invoke_at(&self.site, name, &Scope::class(class), Some(receiver), args)
    }

    pub fn dispatcher(&self) -> &CallDispatcher {
        &self.dispatcher
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }
}

/// 脚本后端
///
/// 后端只负责执行；参数与返回值的签名校验由 [`ScriptEnvironment`] 完成。
pub trait ScriptBackend {
    /// 后端名称（用于日志）
    fn backend_name(&self) -> &'static str;

    /// 脚本是否定义了指定入口点
    fn has_entry_point(&self, name: &str) -> bool;

    /// 调用脚本定义的入口点
    fn call_entry_point(
        &mut self,
        host: &ScriptHost,
        name: &str,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue>;
}

/// 脚本环境
pub struct ScriptEnvironment {
    name: String,
    backend: Box<dyn ScriptBackend>,
    host: ScriptHost,
    signatures: HashMap<String, EntryPointSignature>,
}

impl ScriptEnvironment {
    pub fn new(name: impl Into<String>, backend: Box<dyn ScriptBackend>, dispatcher: CallDispatcher) -> Self {
        let name = name.into();
        tracing::debug!(
            target: "bridge.frame",
            script = %name,
            backend = backend.backend_name(),
            "script environment created"
        );
        Self {
            host: ScriptHost::new(dispatcher, name.clone()),
            name,
            backend,
            signatures: HashMap::new(),
        }
    }

    /// 声明引擎调用该入口点时遵循的签名
    pub fn declare_entry_point(&mut self, signature: EntryPointSignature) -> &mut Self {
        self.signatures.insert(signature.name.clone(), signature);
        self
    }

    pub fn entry_point_signature(&self, name: &str) -> Option<&EntryPointSignature> {
        self.signatures.get(name)
    }

    pub fn has_entry_point(&self, name: &str) -> bool {
        self.backend.has_entry_point(name)
    }

    /// 按名称调用入口点
    ///
    /// 若该入口点声明过签名则按签名校验，否则原样传递参数与返回值。
    pub fn call_entry_point(&mut self, name: &str, args: &[ScriptValue]) -> DispatchResult<ScriptValue> {
        match self.signatures.get(name).cloned() {
            Some(signature) => self.invoke(&signature, args),
            None => {
                if !self.backend.has_entry_point(name) {
                    return Err(DispatchError::MissingEntryPoint {
                        name: name.to_string(),
                    });
                }
                self.backend.call_entry_point(&self.host, name, args)
            }
        }
    }

    /// 按给定签名调用入口点（native -> 脚本方向）
    pub fn invoke(&mut self, signature: &EntryPointSignature, args: &[ScriptValue]) -> DispatchResult<ScriptValue> {
        let name = &signature.name;
        if !self.backend.has_entry_point(name) {
            return Err(DispatchError::MissingEntryPoint { name: name.clone() });
        }

        if args.len() != signature.arity() {
            return Err(DispatchError::Arity {
                name: name.clone(),
                expected: signature.arity(),
                found: args.len(),
            });
        }
        for (index, (param, arg)) in signature.params.iter().zip(args).enumerate() {
            let expected = ValueType::from(*param);
            ValueMarshaler::check(arg, &expected)
                .map_err(|err| DispatchError::argument(name, index, &expected, err))?;
        }

        let result = self.backend.call_entry_point(&self.host, name, args)?;
        if ValueMarshaler::check(&result, &signature.returns).is_err() {
            return Err(DispatchError::InvalidReturn {
                name: name.clone(),
                expected: signature.returns.clone(),
                found: result.kind().to_string(),
            });
        }
        Ok(result)
    }

    /// 退役句柄。仅供 native 引擎使用，脚本侧没有对应接口。
    pub fn retire_handle(&self, handle: Handle) -> Result<(), StaleHandleError> {
        self.handles().retire(handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    pub fn dispatcher(&self) -> &CallDispatcher {
        self.host.dispatcher()
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        self.host.dispatcher().handles()
    }
}

impl fmt::Debug for ScriptEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEnvironment")
            .field("name", &self.name)
            .field("backend", &self.backend.backend_name())
            .field("signatures", &self.signatures.keys().collect::<Vec<_>>())
            .finish()
    }
}

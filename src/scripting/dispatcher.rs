//! 调用分派器
//!
//! 脚本 -> native 的同步调用路径：
//! 1. 通过注册表解析符号
//! 2. 实例方法解析接收者句柄
//! 3. 校验参数个数
//! 4. 按声明顺序编组参数，遇到第一个不匹配立即失败
//! 5. 调用 native 入口点
//! 6. 编组返回值（静态工厂的结果登记为新句柄）
//!
//! native 侧失败（包括 panic）总是以 `DispatchError::NativeInvocation` 返回，不会越过边界。

use crate::bindings::handles::HandleTable;
use crate::bindings::registry::{BindingRegistry, NativeCall};
use crate::bindings::types::{Handle, NativeSymbol, Scope, SymbolKind, ValueType};
use crate::bindings::value::{NativeValue, ScriptValue, ValueMarshaler};
use crate::core::error::{DispatchError, DispatchResult};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// 调用发起位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSite {
    /// 宿主直接调用
    Host,
    /// 某个脚本环境内的调用
    Script(String),
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallSite::Host => f.write_str("host"),
            CallSite::Script(name) => write!(f, "script '{}'", name),
        }
    }
}

/// 一次分派期间存在的调用记录，不会被持久化
#[derive(Debug)]
pub struct CallFrame<'a> {
    pub symbol: &'a NativeSymbol,
    pub args: &'a [ScriptValue],
    pub site: &'a CallSite,
}

/// 调用分派器
///
/// 持有冻结的注册表与句柄表的共享引用；克隆代价很低。
#[derive(Clone)]
pub struct CallDispatcher {
    registry: Arc<BindingRegistry>,
    handles: Arc<HandleTable>,
}

impl CallDispatcher {
    pub fn new(registry: Arc<BindingRegistry>, handles: Arc<HandleTable>) -> Self {
        Self { registry, handles }
    }

    pub fn registry(&self) -> &Arc<BindingRegistry> {
        &self.registry
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    /// 从宿主发起调用
    pub fn invoke(
        &self,
        name: &str,
        scope: &Scope,
        receiver: Option<Handle>,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue> {
        self.invoke_at(&CallSite::Host, name, scope, receiver, args)
    }

    /// 从指定位置发起调用
    pub fn invoke_at(
        &self,
        site: &CallSite,
        name: &str,
        scope: &Scope,
        receiver: Option<Handle>,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue> {
        let registered = self.registry.resolve(name, scope)?;
        let symbol = registered.symbol();
        let frame = CallFrame { symbol, args, site };

        let receiver_object = match symbol.kind {
            SymbolKind::InstanceMethod => {
                let handle = receiver.unwrap_or(Handle::NULL);
                let (class, object) = self.handles.resolve_with_class(handle)?;
                if Some(class.as_str()) != symbol.scope.class_name() {
                    return Err(DispatchError::ReceiverMismatch {
                        name: symbol.to_string(),
                        expected: symbol.scope.class_name().unwrap_or_default().to_string(),
                        found: class,
                    });
                }
                Some(object)
            }
            _ => None,
        };

        let native_args = Self::marshal_args(&frame)?;

        tracing::trace!(
            target: "bridge.dispatch",
            symbol = %frame.symbol,
            site = %frame.site,
            argc = frame.args.len(),
            "dispatching native call"
        );

        let call = NativeCall {
            symbol,
            receiver: receiver_object.as_ref(),
            args: &native_args,
        };
        let entry = registered.entry();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (**entry)(&call)));

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(failure)) => {
                return Err(Self::native_failure(&frame, failure.to_string()));
            }
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "native entry point panicked".to_string());
                return Err(Self::native_failure(&frame, detail));
            }
        };

        self.marshal_result(&frame, value)
    }

    /// 校验参数个数并按声明类型编组
    fn marshal_args(frame: &CallFrame<'_>) -> DispatchResult<Vec<NativeValue>> {
        let symbol = frame.symbol;
        if frame.args.len() != symbol.arity() {
            return Err(DispatchError::Arity {
                name: symbol.name.clone(),
                expected: symbol.arity(),
                found: frame.args.len(),
            });
        }

        symbol
            .params
            .iter()
            .zip(frame.args)
            .enumerate()
            .map(|(index, (param, arg))| {
                let expected = ValueType::from(*param);
                ValueMarshaler::to_native(arg, &expected)
                    .map_err(|err| DispatchError::argument(&symbol.name, index, &expected, err))
            })
            .collect()
    }

    fn marshal_result(&self, frame: &CallFrame<'_>, value: NativeValue) -> DispatchResult<ScriptValue> {
        let symbol = frame.symbol;
        if !value.conforms_to(&symbol.returns) {
            return Err(Self::native_failure(
                frame,
                format!("returned {}, declared {}", value.kind(), symbol.returns),
            ));
        }

        match (symbol.kind, value) {
            (SymbolKind::StaticFactory, NativeValue::Object(object)) => {
                let class = symbol.scope.class_name().unwrap_or_default();
                Ok(ScriptValue::Handle(self.handles.create(class, object)))
            }
            (_, value) => {
                ValueMarshaler::to_script(value).map_err(|err| Self::native_failure(frame, err.to_string()))
            }
        }
    }

    fn native_failure(frame: &CallFrame<'_>, detail: String) -> DispatchError {
        tracing::warn!(
            target: "bridge.dispatch",
            symbol = %frame.symbol,
            site = %frame.site,
            %detail,
            "native call failed"
        );
        DispatchError::NativeInvocation {
            symbol: frame.symbol.to_string(),
            detail,
        }
    }
}

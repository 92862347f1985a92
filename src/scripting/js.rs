// ============================================================================
// QuickJS 脚本后端
// 每个脚本独占一个 Runtime/Context，native 符号以全局函数和类对象的形式安装
// ============================================================================

use crate::bindings::types::{Handle, Scope, SymbolKind, ValueType};
use crate::bindings::value::{ScriptValue, ValueMarshaler};
use crate::core::error::{DispatchError, DispatchResult, MarshalError, ScriptError, ScriptResult};
use crate::scripting::dispatcher::CallDispatcher;
use crate::scripting::environment::{ScriptBackend, ScriptHost};
use crate::scripting::loader::ScriptLoader;
use parking_lot::Mutex;
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Context, Ctx, Exception, Function, Object, Runtime, Type, Value};
use std::sync::Arc;

/// 句柄对象上保存句柄标识的属性
const HANDLE_KEY: &str = "__handle";
/// 句柄对象上保存类名的属性
const CLASS_KEY: &str = "__class";
/// 桥接层抛出的异常上保存失败序号的属性
const FAILURE_KEY: &str = "__bridgeFailure";

/// 桥接层在 JS 异常中途记录的失败
enum Failure {
    Dispatch(DispatchError),
    Script(ScriptError),
}

/// 暂存的类型化失败
///
/// 只有携带相同序号的异常传播到宿主时才会取回；脚本自行捕获后另行抛出的异常不会取到它。
#[derive(Default)]
struct PendingFailure {
    sequence: u64,
    failure: Option<(u64, Failure)>,
}

impl PendingFailure {
    fn record(&mut self, failure: Failure) -> u64 {
        self.sequence += 1;
        self.failure = Some((self.sequence, failure));
        self.sequence
    }

    fn clear(&mut self) {
        self.failure = None;
    }

    fn take_matching(&mut self, marker: Option<u64>) -> Option<Failure> {
        let (sequence, failure) = self.failure.take()?;
        (marker == Some(sequence)).then_some(failure)
    }
}

#[derive(Clone)]
struct JsBridge {
    host: ScriptHost,
    pending: Arc<Mutex<PendingFailure>>,
}

impl JsBridge {
    fn dispatcher(&self) -> &CallDispatcher {
        self.host.dispatcher()
    }

    /// 记录失败并抛出带序号的 JS 异常
    fn fail(&self, ctx: &Ctx<'_>, failure: Failure) -> rquickjs::Error {
        let message = match &failure {
            Failure::Dispatch(err) => err.to_string(),
            Failure::Script(err) => err.to_string(),
        };
        let marker = self.pending.lock().record(failure);

        let exception = match Exception::from_message(ctx.clone(), &message) {
            Ok(exception) => exception.as_object().clone(),
            Err(e) => return e,
        };
        if let Err(e) = exception.set(FAILURE_KEY, marker as f64) {
            return e;
        }
        ctx.throw(exception.into_value())
    }

    /// 脚本 -> native 调用
    fn call<'js>(
        &self,
        ctx: &Ctx<'js>,
        scope: &Scope,
        name: &str,
        receiver: Option<Handle>,
        args: &[Value<'js>],
    ) -> rquickjs::Result<Value<'js>> {
        let outcome = self.script_args(scope, name, receiver, args).and_then(|args| {
            self.dispatcher()
                .invoke_at(self.host.site(), name, scope, receiver, &args)
        });
        match outcome {
            Ok(value) => to_js(ctx, self, value),
            Err(err) => Err(self.fail(ctx, Failure::Dispatch(err))),
        }
    }

    /// 转换参数。出现无法表示的 JS 值时，按分派器的检查顺序报告错误。
    fn script_args(
        &self,
        scope: &Scope,
        name: &str,
        receiver: Option<Handle>,
        args: &[Value<'_>],
    ) -> DispatchResult<Vec<ScriptValue>> {
        let converted: Vec<Result<ScriptValue, MarshalError>> = args.iter().map(from_js).collect();
        if converted.iter().all(Result::is_ok) {
            return Ok(converted.into_iter().flatten().collect());
        }

        let dispatcher = self.dispatcher();
        let symbol = dispatcher.registry().resolve(name, scope)?.symbol();
        if symbol.kind == SymbolKind::InstanceMethod {
            dispatcher.handles().resolve(receiver.unwrap_or(Handle::NULL))?;
        }
        if converted.len() != symbol.arity() {
            return Err(DispatchError::Arity {
                name: symbol.name.clone(),
                expected: symbol.arity(),
                found: converted.len(),
            });
        }

        let mut checked = Vec::with_capacity(converted.len());
        for (index, (param, arg)) in symbol.params.iter().zip(converted).enumerate() {
            let expected = ValueType::from(*param);
            let value = arg
                .and_then(|value| ValueMarshaler::check(&value, &expected).map(|()| value))
                .map_err(|err| DispatchError::argument(&symbol.name, index, &expected, err))?;
            checked.push(value);
        }
        Ok(checked)
    }
}

/// JS 值 -> 脚本值
fn from_js(value: &Value<'_>) -> Result<ScriptValue, MarshalError> {
    let unsupported = |kind: &str| MarshalError::Unsupported {
        kind: kind.to_string(),
    };

    match value.type_of() {
        Type::Undefined => Ok(ScriptValue::Undefined),
        Type::Bool => value
            .as_bool()
            .map(ScriptValue::Bool)
            .ok_or_else(|| unsupported("boolean")),
        Type::Int => value
            .as_int()
            .map(|i| ScriptValue::Integer(i64::from(i)))
            .ok_or_else(|| unsupported("int")),
        Type::Float => value
            .as_float()
            .map(ScriptValue::Number)
            .ok_or_else(|| unsupported("float")),
        Type::String => value
            .as_string()
            .and_then(|s| s.to_string().ok())
            .map(ScriptValue::String)
            .ok_or_else(|| unsupported("string")),
        Type::Object => {
            let object = value.as_object().ok_or_else(|| unsupported("object"))?;
            match object.get::<_, Option<f64>>(HANDLE_KEY) {
                Ok(Some(id)) if id >= 1.0 && id.fract() == 0.0 => {
                    Ok(ScriptValue::Handle(Handle::from_raw(id as u64)))
                }
                _ => Err(unsupported("object")),
            }
        }
        other => Err(unsupported(&format!("{:?}", other).to_lowercase())),
    }
}

/// 脚本值 -> JS 值
fn to_js<'js>(ctx: &Ctx<'js>, bridge: &JsBridge, value: ScriptValue) -> rquickjs::Result<Value<'js>> {
    let value = match value {
        ScriptValue::Undefined => Value::new_undefined(ctx.clone()),
        ScriptValue::Bool(b) => Value::new_bool(ctx.clone(), b),
        ScriptValue::Integer(i) => match i32::try_from(i) {
            Ok(small) => Value::new_int(ctx.clone(), small),
            Err(_) => Value::new_number(ctx.clone(), i as f64),
        },
        ScriptValue::Number(n) => Value::new_number(ctx.clone(), n),
        ScriptValue::String(s) => rquickjs::String::from_str(ctx.clone(), &s)?.into_value(),
        ScriptValue::Handle(handle) => handle_object(ctx, bridge, handle)?.into_value(),
    };
    Ok(value)
}

/// 构造句柄对象：`{ __handle, __class }` 加上绑定到该句柄的实例方法
fn handle_object<'js>(ctx: &Ctx<'js>, bridge: &JsBridge, handle: Handle) -> rquickjs::Result<Object<'js>> {
    let object = Object::new(ctx.clone())?;
    object.set(HANDLE_KEY, handle.id() as f64)?;

    let class = match bridge.dispatcher().handles().resolve_with_class(handle) {
        Ok((class, _)) => class,
        Err(_) => return Ok(object),
    };
    object.set(CLASS_KEY, class.as_str())?;

    let methods: Vec<String> = bridge
        .dispatcher()
        .registry()
        .class_members(&class)
        .filter(|symbol| symbol.kind == SymbolKind::InstanceMethod)
        .map(|symbol| symbol.name.clone())
        .collect();

    for method in methods {
        let bridge = bridge.clone();
        let scope = Scope::class(class.as_str());
        let name = method.clone();
        let function = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                bridge.call(&ctx, &scope, &name, Some(handle), &args.0)
            },
        )?;
        object.set(method.as_str(), function)?;
    }
    Ok(object)
}

/// 安装注册表中的全局函数与类对象
fn install_bindings<'js>(ctx: &Ctx<'js>, bridge: &JsBridge) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    let registry = Arc::clone(bridge.dispatcher().registry());

    for symbol in registry.globals() {
        let bridge = bridge.clone();
        let name = symbol.name.clone();
        let function = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                bridge.call(&ctx, &Scope::Global, &name, None, &args.0)
            },
        )?;
        globals.set(symbol.name.as_str(), function)?;
    }

    for class in registry.classes() {
        let class_object = Object::new(ctx.clone())?;
        let factories = registry
            .class_members(class)
            .filter(|symbol| symbol.kind == SymbolKind::StaticFactory);
        for factory in factories {
            let bridge = bridge.clone();
            let scope = Scope::class(class);
            let name = factory.name.clone();
            let function = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                    bridge.call(&ctx, &scope, &name, None, &args.0)
                },
            )?;
            class_object.set(factory.name.as_str(), function)?;
        }
        globals.set(class, class_object)?;
        tracing::trace!(target: "bridge.js", class, "installed class object");
    }

    Ok(())
}

fn join_args(args: &Rest<Coerced<String>>) -> String {
    args.0
        .iter()
        .map(|arg| arg.0.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `console.log/warn/error` 与 `print`，转发到 tracing
fn install_console<'js>(ctx: &Ctx<'js>, script: &str) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    let console = Object::new(ctx.clone())?;

    let name = script.to_string();
    console.set(
        "log",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::info!(target: "script.console", script = %name, "{}", join_args(&args));
        })?,
    )?;

    let name = script.to_string();
    console.set(
        "warn",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::warn!(target: "script.console", script = %name, "{}", join_args(&args));
        })?,
    )?;

    let name = script.to_string();
    console.set(
        "error",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::error!(target: "script.console", script = %name, "{}", join_args(&args));
        })?,
    )?;

    globals.set("console", console)?;

    let name = script.to_string();
    globals.set(
        "print",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            tracing::info!(target: "script.console", script = %name, "{}", join_args(&args));
        })?,
    )?;

    Ok(())
}

/// 传播到宿主的 JS 异常
struct CaughtException {
    /// 错误类型名，例如 `SyntaxError`
    kind: Option<String>,
    message: String,
    /// 桥接层抛出时附带的失败序号
    marker: Option<u64>,
}

fn caught_exception(ctx: &Ctx<'_>) -> CaughtException {
    let caught = ctx.catch();
    match caught.as_exception() {
        Some(exception) => {
            let object = exception.as_object();
            CaughtException {
                kind: object.get::<_, Option<String>>("name").ok().flatten(),
                message: exception.message().unwrap_or_default(),
                marker: object
                    .get::<_, Option<f64>>(FAILURE_KEY)
                    .ok()
                    .flatten()
                    .map(|marker| marker as u64),
            }
        }
        None => CaughtException {
            kind: None,
            message: caught
                .as_string()
                .and_then(|s| s.to_string().ok())
                .unwrap_or_else(|| format!("uncaught {:?} value", caught.type_of())),
            marker: None,
        },
    }
}

/// 全局标识符检查，只有合法标识符才会在全局词法作用域中查找
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// 查找入口函数
///
/// 先查全局对象的属性（`function f() {}` 与 `var`），
/// 再查顶层 `const`/`let` 声明所在的全局词法作用域。
fn entry_function<'js>(ctx: &Ctx<'js>, name: &str) -> Option<Function<'js>> {
    if let Some(function) = ctx
        .globals()
        .get::<_, Value>(name)
        .ok()
        .and_then(|value| value.as_function().cloned())
    {
        return Some(function);
    }

    if !is_identifier(name) {
        return None;
    }
    match ctx.eval::<Value, _>(name) {
        Ok(value) => value.as_function().cloned(),
        Err(_) => {
            // 未声明的名称抛出 ReferenceError，清掉它
            ctx.catch();
            None
        }
    }
}

/// `require(name)`：经搜索路径解析模块，在同一上下文中执行并返回其值
///
/// 同一文件只执行一次，之后返回缓存的值。
fn install_require<'js>(ctx: &Ctx<'js>, bridge: &JsBridge, loader: ScriptLoader) -> rquickjs::Result<()> {
    let cache = Object::new(ctx.clone())?;
    let bridge = bridge.clone();

    let require = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, module: String| -> rquickjs::Result<Value<'js>> {
            let source = match loader.load(&module) {
                Ok(source) => source,
                Err(err) => return Err(bridge.fail(&ctx, Failure::Script(err))),
            };
            let key = source.path.display().to_string();
            if cache.contains_key(key.as_str())? {
                return cache.get(key.as_str());
            }

            tracing::debug!(target: "bridge.js", script = %bridge.host.site(), module = %module, "requiring module");
            let value: Value = ctx.eval(source.code)?;
            cache.set(key.as_str(), value.clone())?;
            Ok(value)
        },
    )?;
    ctx.globals().set("require", require)
}

/// QuickJS 脚本
pub struct JsScript {
    name: String,
    context: Context,
    _runtime: Runtime,
    bridge: JsBridge,
}

impl JsScript {
    /// 创建独立的 JS 上下文，安装绑定并执行脚本顶层代码
    ///
    /// `require` 使用默认搜索路径。
    pub fn load(name: impl Into<String>, source: &str, dispatcher: CallDispatcher) -> ScriptResult<Self> {
        Self::load_with_loader(name, source, dispatcher, ScriptLoader::default())
    }

    /// 同 [`JsScript::load`]，`require` 经给定的加载器解析模块
    pub fn load_with_loader(
        name: impl Into<String>,
        source: &str,
        dispatcher: CallDispatcher,
        loader: ScriptLoader,
    ) -> ScriptResult<Self> {
        let name = name.into();
        let runtime = Runtime::new().map_err(|e| ScriptError::Runtime(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| ScriptError::Runtime(e.to_string()))?;
        let bridge = JsBridge {
            host: ScriptHost::new(dispatcher, name.clone()),
            pending: Arc::default(),
        };

        context.with(|ctx| -> ScriptResult<()> {
            install_bindings(&ctx, &bridge)
                .and_then(|()| install_console(&ctx, &name))
                .and_then(|()| install_require(&ctx, &bridge, loader))
                .map_err(|e| ScriptError::InvalidBinding(format!("{}: {}", name, e)))?;

            match ctx.eval::<(), _>(source) {
                Ok(()) => {
                    bridge.pending.lock().clear();
                    Ok(())
                }
                Err(rquickjs::Error::Exception) => {
                    let caught = caught_exception(&ctx);
                    match bridge.pending.lock().take_matching(caught.marker) {
                        Some(Failure::Script(err)) => return Err(err),
                        Some(Failure::Dispatch(err)) => {
                            return Err(ScriptError::Runtime(format!("{}: {}", name, err)))
                        }
                        None => {}
                    }
                    match caught.kind.as_deref() {
                        Some("SyntaxError") => {
                            Err(ScriptError::Compilation(format!("{}: {}", name, caught.message)))
                        }
                        _ => Err(ScriptError::Runtime(format!("{}: {}", name, caught.message))),
                    }
                }
                Err(e) => Err(ScriptError::Runtime(format!("{}: {}", name, e))),
            }
        })?;

        tracing::info!(target: "bridge.js", script = %name, "script loaded");
        Ok(Self {
            name,
            context,
            _runtime: runtime,
            bridge,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ScriptBackend for JsScript {
    fn backend_name(&self) -> &'static str {
        "quickjs"
    }

    fn has_entry_point(&self, name: &str) -> bool {
        self.context.with(|ctx| entry_function(&ctx, name).is_some())
    }

    fn call_entry_point(
        &mut self,
        _host: &ScriptHost,
        name: &str,
        args: &[ScriptValue],
    ) -> DispatchResult<ScriptValue> {
        let bridge = &self.bridge;
        let script_failure = |detail: String| DispatchError::ScriptFailure {
            name: name.to_string(),
            detail,
        };

        self.context.with(|ctx| {
            bridge.pending.lock().clear();

            let function = entry_function(&ctx, name).ok_or_else(|| DispatchError::MissingEntryPoint {
                name: name.to_string(),
            })?;

            let js_args = args
                .iter()
                .cloned()
                .map(|arg| to_js(&ctx, bridge, arg))
                .collect::<rquickjs::Result<Vec<_>>>()
                .map_err(|e| script_failure(e.to_string()))?;

            match function.call::<_, Value>((Rest(js_args),)) {
                Ok(value) => {
                    // 脚本自行捕获的失败不再上报
                    bridge.pending.lock().clear();
                    from_js(&value).map_err(|err| script_failure(format!("returned {}", err)))
                }
                Err(rquickjs::Error::Exception) => {
                    let caught = caught_exception(&ctx);
                    let err = match bridge.pending.lock().take_matching(caught.marker) {
                        Some(Failure::Dispatch(err)) => err,
                        Some(Failure::Script(err)) => script_failure(err.to_string()),
                        None => script_failure(caught.message),
                    };
                    tracing::debug!(target: "bridge.js", script = %self.name, entry = name, error = %err, "entry point threw");
                    Err(err)
                }
                Err(e) => Err(script_failure(e.to_string())),
            }
        })
    }
}

//! 引擎服务绑定
//!
//! 暴露给脚本的 native 服务：
//! - `getKeyboardButtonPressed(key: string): boolean`
//! - `spawn(x: number, y: number, z: number): void`
//! - `MyNativeBinding.New()` 以及实例方法 `getName()` / `setName(name)`
//!
//! 生成命令通过 crossbeam 通道交给引擎，绑定本身不执行任何模拟逻辑。

use crate::bindings::declarations::BindingDeclarations;
use crate::bindings::registry::{NativeFailure, RegistryBuilder};
use crate::bindings::types::{NativeSymbol, PrimitiveType, ValueType};
use crate::bindings::value::{NativeObject, NativeValue};
use crate::config::ConfigResult;
use crate::core::error::RegistryResult;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;

/// 编写期声明（与 [`register_engine_api`] 注册的符号一致）
pub const ENGINE_DECLARATIONS: &str = r#"
[[functions]]
name = "getKeyboardButtonPressed"
params = [{ name = "key", type = "string" }]
returns = "boolean"

[[functions]]
name = "spawn"
params = [
    { name = "x", type = "number" },
    { name = "y", type = "number" },
    { name = "z", type = "number" },
]
returns = "void"

[[classes]]
name = "MyNativeBinding"
factories = [{ name = "New" }]
methods = [
    { name = "getName", returns = "string" },
    { name = "setName", params = [{ name = "name", type = "string" }], returns = "void" },
]
"#;

/// 示例脚本：按下 A 时生成一个实体
pub const SAMPLE_SCRIPT: &str = r#"
const binding = MyNativeBinding.New();

function globalFunction(dt) {
    if (getKeyboardButtonPressed("A")) {
        spawn(10, 20, 30);
        return "spawned by " + binding.getName() + " (" + dt + ")";
    }
    return "no press (" + dt + ")";
}
"#;

/// 解析内置的引擎声明
pub fn engine_declarations() -> ConfigResult<BindingDeclarations> {
    BindingDeclarations::from_toml_str(ENGINE_DECLARATIONS)
}

/// 键盘输入状态
#[derive(Debug, Default)]
pub struct InputState {
    pressed: RwLock<HashSet<String>>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key: impl Into<String>) {
        self.pressed.write().insert(key.into());
    }

    pub fn release(&self, key: &str) {
        self.pressed.write().remove(key);
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.pressed.read().contains(key)
    }

    pub fn clear(&self) {
        self.pressed.write().clear();
    }
}

/// 脚本发给引擎的命令
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Spawn { x: f64, y: f64, z: f64 },
}

/// `MyNativeBinding` 的 native 对象
#[derive(Debug)]
pub struct MyNativeBinding {
    name: Mutex<String>,
}

impl MyNativeBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Mutex::new(name.into()),
        }
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock() = name.into();
    }
}

impl Default for MyNativeBinding {
    fn default() -> Self {
        Self::new("MyNativeBinding")
    }
}

/// 引擎服务集合
#[derive(Clone)]
pub struct EngineServices {
    input: Arc<InputState>,
    command_tx: Sender<EngineCommand>,
    command_rx: Receiver<EngineCommand>,
}

impl EngineServices {
    pub fn new() -> Self {
        let (command_tx, command_rx) = unbounded();
        Self {
            input: Arc::new(InputState::new()),
            command_tx,
            command_rx,
        }
    }

    pub fn input(&self) -> &Arc<InputState> {
        &self.input
    }

    pub fn command_sender(&self) -> Sender<EngineCommand> {
        self.command_tx.clone()
    }

    /// 取出所有待处理的命令
    pub fn drain_commands(&self) -> Vec<EngineCommand> {
        self.command_rx.try_iter().collect()
    }
}

impl Default for EngineServices {
    fn default() -> Self {
        Self::new()
    }
}

/// 向构建器注册引擎服务
pub fn register_engine_api(builder: &mut RegistryBuilder, services: &EngineServices) -> RegistryResult<()> {
    let input = Arc::clone(services.input());
    builder.register(
        NativeSymbol::function(
            "getKeyboardButtonPressed",
            vec![PrimitiveType::String],
            ValueType::Boolean,
        ),
        move |call| Ok(NativeValue::Bool(input.is_pressed(call.string(0)?))),
    )?;

    let command_tx = services.command_sender();
    builder.register(
        NativeSymbol::function("spawn", vec![PrimitiveType::Number; 3], ValueType::Void),
        move |call| {
            let command = EngineCommand::Spawn {
                x: call.number(0)?,
                y: call.number(1)?,
                z: call.number(2)?,
            };
            tracing::debug!(target: "bridge.dispatch", ?command, "engine command queued");
            command_tx
                .send(command)
                .map_err(|_| NativeFailure::new("engine command queue is closed"))?;
            Ok(NativeValue::Void)
        },
    )?;

    builder
        .register(NativeSymbol::factory("MyNativeBinding", "New", vec![]), |_| {
            Ok(NativeValue::Object(NativeObject::new(MyNativeBinding::default())))
        })?
        .register(
            NativeSymbol::method("MyNativeBinding", "getName", vec![], ValueType::String),
            |call| Ok(NativeValue::String(call.receiver::<MyNativeBinding>()?.name())),
        )?
        .register(
            NativeSymbol::method(
                "MyNativeBinding",
                "setName",
                vec![PrimitiveType::String],
                ValueType::Void,
            ),
            |call| {
                call.receiver::<MyNativeBinding>()?.set_name(call.string(0)?);
                Ok(NativeValue::Void)
            },
        )?;

    Ok(())
}

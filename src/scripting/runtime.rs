//! 脚本运行时
//!
//! 持有冻结的注册表，按句柄共享策略为每个脚本构造分派器，并负责加载脚本环境。

use crate::bindings::declarations::BindingDeclarations;
use crate::bindings::handles::HandleTable;
use crate::bindings::registry::{BindingRegistry, RegistryBuilder};
use crate::config::{HandleSharing, ScriptingConfig};
use crate::core::error::{BridgeResult, ScriptResult};
use crate::scripting::dispatcher::CallDispatcher;
use crate::scripting::environment::{EntryPointSignature, ScriptBackend, ScriptEnvironment};
use crate::scripting::frame::FrameDriver;
use crate::scripting::js::JsScript;
use crate::scripting::loader::ScriptLoader;
use crate::scripting::native_script::NativeScript;
use std::sync::Arc;

/// 脚本运行时
pub struct ScriptRuntime {
    config: ScriptingConfig,
    registry: Arc<BindingRegistry>,
    shared_handles: Arc<HandleTable>,
    loader: ScriptLoader,
}

impl ScriptRuntime {
    pub fn new(registry: Arc<BindingRegistry>, config: ScriptingConfig) -> Self {
        tracing::info!(
            target: "bridge.registry",
            symbols = registry.len(),
            handle_sharing = %config.handle_sharing,
            "script runtime created"
        );
        Self {
            loader: ScriptLoader::from_config(&config),
            config,
            registry,
            shared_handles: Arc::new(HandleTable::new()),
        }
    }

    /// 冻结构建器并创建运行时
    ///
    /// 配置了声明文件时先与声明核对，任何不一致都使启动失败。
    pub fn from_builder(builder: RegistryBuilder, config: ScriptingConfig) -> BridgeResult<Self> {
        let registry = match &config.declarations {
            Some(path) => {
                let declarations = BindingDeclarations::from_file(path)?;
                builder.build_verified(&declarations)?
            }
            None => builder.build(),
        };
        Ok(Self::new(Arc::new(registry), config))
    }

    /// 为新脚本构造分派器
    pub fn dispatcher(&self) -> CallDispatcher {
        let handles = match self.config.handle_sharing {
            HandleSharing::Shared => Arc::clone(&self.shared_handles),
            HandleSharing::PerScript => Arc::new(HandleTable::new()),
        };
        CallDispatcher::new(Arc::clone(&self.registry), handles)
    }

    /// 从源码加载 JS 脚本，脚本中的 `require` 使用运行时的搜索路径
    pub fn load_js(&self, name: &str, source: &str) -> ScriptResult<ScriptEnvironment> {
        let dispatcher = self.dispatcher();
        let script =
            JsScript::load_with_loader(name, source, dispatcher.clone(), self.loader.clone())?;
        Ok(self.environment(name, Box::new(script), dispatcher))
    }

    /// 经搜索路径解析并加载 JS 脚本
    pub fn load_js_file(&self, script: &str) -> ScriptResult<ScriptEnvironment> {
        let source = self.loader.load(script)?;
        self.load_js(&source.name, &source.code)
    }

    /// 加载 Rust 脚本
    pub fn load_native(&self, script: NativeScript) -> ScriptEnvironment {
        let name = script.name().to_string();
        self.environment(&name, Box::new(script), self.dispatcher())
    }

    fn environment(
        &self,
        name: &str,
        backend: Box<dyn ScriptBackend>,
        dispatcher: CallDispatcher,
    ) -> ScriptEnvironment {
        let mut env = ScriptEnvironment::new(name, backend, dispatcher);
        env.declare_entry_point(self.update_signature());
        env
    }

    /// 每帧更新入口点的签名
    pub fn update_signature(&self) -> EntryPointSignature {
        EntryPointSignature::update(self.config.update_entry_point.clone())
    }

    /// 按配置创建帧驱动
    pub fn frame_driver(&self) -> FrameDriver {
        FrameDriver::new(&self.config)
    }

    pub fn registry(&self) -> &Arc<BindingRegistry> {
        &self.registry
    }

    /// `Shared` 策略下所有脚本共用的句柄表
    pub fn shared_handles(&self) -> &Arc<HandleTable> {
        &self.shared_handles
    }

    pub fn loader_mut(&mut self) -> &mut ScriptLoader {
        &mut self.loader
    }

    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    /// 生成当前注册表的 TypeScript 声明
    pub fn typescript_declarations(&self) -> String {
        BindingDeclarations::from_registry(&self.registry).to_typescript()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::types::{NativeSymbol, Scope, ValueType};
    use crate::bindings::value::{NativeObject, NativeValue, ScriptValue};
    use crate::core::error::{BridgeError, RegistryError};
    use std::fs;

    fn builder() -> RegistryBuilder {
        let mut builder = RegistryBuilder::new();
        builder
            .register(NativeSymbol::factory("Token", "New", vec![]), |_| {
                Ok(NativeValue::Object(NativeObject::new(())))
            })
            .unwrap()
            .register(
                NativeSymbol::method("Token", "valid", vec![], ValueType::Boolean),
                |_| Ok(NativeValue::Bool(true)),
            )
            .unwrap();
        builder
    }

    fn config(sharing: HandleSharing) -> ScriptingConfig {
        ScriptingConfig {
            handle_sharing: sharing,
            ..ScriptingConfig::default()
        }
    }

    #[test]
    fn test_per_script_handles_are_private() {
        let runtime = ScriptRuntime::from_builder(builder(), config(HandleSharing::PerScript)).unwrap();
        let first = runtime.load_native(NativeScript::new("first"));
        let second = runtime.load_native(NativeScript::new("second"));

        let token = first
            .host()
            .call_static("Token", "New", &[])
            .unwrap()
            .as_handle()
            .unwrap();

        assert_eq!(
            first.host().call_method("Token", token, "valid", &[]),
            Ok(ScriptValue::Bool(true))
        );
        assert!(second
            .host()
            .call_method("Token", token, "valid", &[])
            .is_err());
    }

    #[test]
    fn test_shared_handles_are_visible() {
        let runtime = ScriptRuntime::from_builder(builder(), config(HandleSharing::Shared)).unwrap();
        let first = runtime.load_native(NativeScript::new("first"));
        let second = runtime.load_native(NativeScript::new("second"));

        let token = first
            .host()
            .call_static("Token", "New", &[])
            .unwrap()
            .as_handle()
            .unwrap();

        assert_eq!(
            second.host().call_method("Token", token, "valid", &[]),
            Ok(ScriptValue::Bool(true))
        );
        assert!(runtime.shared_handles().contains(token));

        second.retire_handle(token).unwrap();
        assert!(first
            .dispatcher()
            .invoke("valid", &Scope::class("Token"), Some(token), &[])
            .is_err());
    }

    #[test]
    fn test_declarations_checked_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bindings.toml");
        fs::write(
            &path,
            r#"
            [[classes]]
            name = "Token"
            factories = [{ name = "New" }]
            methods = [{ name = "valid", returns = "string" }]
            "#,
        )
        .unwrap();

        let config = ScriptingConfig {
            declarations: Some(path),
            ..ScriptingConfig::default()
        };
        let err = ScriptRuntime::from_builder(builder(), config).err().unwrap();
        assert!(matches!(
            err,
            BridgeError::Registry(RegistryError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_load_js_file_and_typescript() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("token.js"),
            "function globalFunction(dt) { return Token.New().valid() ? 'valid' : 'invalid'; }",
        )
        .unwrap();

        let mut runtime = ScriptRuntime::from_builder(builder(), ScriptingConfig::default()).unwrap();
        runtime.loader_mut().add_search_path(dir.path());

        let mut env = runtime.load_js_file("token").unwrap();
        assert_eq!(
            env.call_entry_point("globalFunction", &[0.016.into()]),
            Ok(ScriptValue::from("valid"))
        );

        let ts = runtime.typescript_declarations();
        assert!(ts.contains("static New(): Token;"));
        assert!(ts.contains("valid(): boolean;"));
    }

    #[test]
    fn test_require_uses_runtime_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(
            dir.path().join("lib").join("token.js"),
            "({ fresh: function () { return Token.New().valid(); } })",
        )
        .unwrap();

        let mut runtime = ScriptRuntime::from_builder(builder(), ScriptingConfig::default()).unwrap();
        runtime.loader_mut().add_search_path(dir.path());

        let mut env = runtime
            .load_js(
                "main.js",
                "const token = require('lib/token'); function globalFunction(dt) { return token.fresh() ? 'fresh' : 'stale'; }",
            )
            .unwrap();
        assert_eq!(
            env.call_entry_point("globalFunction", &[0.016.into()]),
            Ok(ScriptValue::from("fresh"))
        );
    }
}

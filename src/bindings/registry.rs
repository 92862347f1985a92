//! 绑定注册表
//!
//! 注册只发生在桥接层初始化阶段：先通过 [`RegistryBuilder`] 收集符号，
//! 再 `build` 成只读的 [`BindingRegistry`]。冻结之后不再提供任何修改接口。
//!
//! 按 (作用域, 名称) 精确查找，不做模糊或大小写无关匹配。

use crate::bindings::declarations::BindingDeclarations;
use crate::bindings::types::{NativeSymbol, Scope, SymbolKind, ValueType};
use crate::bindings::value::{NativeObject, NativeValue};
use crate::core::error::{DispatchError, RegistryError, RegistryResult};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// native 入口点执行失败
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct NativeFailure(pub String);

impl NativeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// 传给 native 入口点的一次调用
///
/// 参数已按声明的类型编组，实例方法附带解析后的接收者对象。
pub struct NativeCall<'a> {
    pub symbol: &'a NativeSymbol,
    pub receiver: Option<&'a NativeObject>,
    pub args: &'a [NativeValue],
}

impl<'a> NativeCall<'a> {
    pub fn number(&self, index: usize) -> Result<f64, NativeFailure> {
        match self.args.get(index) {
            Some(NativeValue::Number(n)) => Ok(*n),
            other => Err(self.unexpected(index, "number", other)),
        }
    }

    pub fn string(&self, index: usize) -> Result<&'a str, NativeFailure> {
        match self.args.get(index) {
            Some(NativeValue::String(s)) => Ok(s.as_str()),
            other => Err(self.unexpected(index, "string", other)),
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool, NativeFailure> {
        match self.args.get(index) {
            Some(NativeValue::Bool(b)) => Ok(*b),
            other => Err(self.unexpected(index, "boolean", other)),
        }
    }

    /// 按具体类型访问接收者对象
    pub fn receiver<T: 'static>(&self) -> Result<&'a T, NativeFailure> {
        self.receiver
            .and_then(|object| object.downcast_ref::<T>())
            .ok_or_else(|| {
                NativeFailure::new(format!(
                    "{} requires a receiver of type {}",
                    self.symbol,
                    std::any::type_name::<T>()
                ))
            })
    }

    fn unexpected(&self, index: usize, expected: &str, found: Option<&NativeValue>) -> NativeFailure {
        NativeFailure::new(format!(
            "{} argument {}: expected {}, found {}",
            self.symbol,
            index,
            expected,
            found.map(NativeValue::kind).unwrap_or("nothing")
        ))
    }
}

/// native 入口点
pub type NativeEntryPoint =
    Arc<dyn Fn(&NativeCall<'_>) -> Result<NativeValue, NativeFailure> + Send + Sync>;

/// 注册表中的一项：符号 + 入口点
#[derive(Clone)]
pub struct RegisteredSymbol {
    symbol: NativeSymbol,
    entry: NativeEntryPoint,
}

impl RegisteredSymbol {
    pub fn symbol(&self) -> &NativeSymbol {
        &self.symbol
    }

    pub fn entry(&self) -> &NativeEntryPoint {
        &self.entry
    }
}

impl fmt::Debug for RegisteredSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSymbol")
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

type SymbolKey = (Scope, String);

fn key_of(symbol: &NativeSymbol) -> SymbolKey {
    (symbol.scope.clone(), symbol.name.clone())
}

/// 注册表构建器（仅在启动阶段使用）
#[derive(Default, Debug)]
pub struct RegistryBuilder {
    symbols: HashMap<SymbolKey, RegisteredSymbol>,
    order: Vec<SymbolKey>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册符号；同一作用域内重名是致命配置错误
    pub fn register<F>(&mut self, symbol: NativeSymbol, entry: F) -> RegistryResult<&mut Self>
    where
        F: Fn(&NativeCall<'_>) -> Result<NativeValue, NativeFailure> + Send + Sync + 'static,
    {
        Self::validate(&symbol)?;

        let key = key_of(&symbol);
        if self.symbols.contains_key(&key) {
            return Err(RegistryError::DuplicateSymbol {
                scope: symbol.scope.clone(),
                name: symbol.name.clone(),
            });
        }

        tracing::debug!(target: "bridge.registry", symbol = %symbol, "registered native symbol");
        self.order.push(key.clone());
        self.symbols.insert(
            key,
            RegisteredSymbol {
                symbol,
                entry: Arc::new(entry),
            },
        );
        Ok(self)
    }

    /// 已收集的符号（注册顺序）
    pub fn symbols(&self) -> impl Iterator<Item = &NativeSymbol> {
        self.order
            .iter()
            .filter_map(|key| self.symbols.get(key))
            .map(|entry| &entry.symbol)
    }

    /// 冻结为只读注册表
    pub fn build(self) -> BindingRegistry {
        tracing::info!(target: "bridge.registry", symbols = self.order.len(), "binding registry frozen");
        BindingRegistry {
            symbols: self.symbols,
            order: self.order,
        }
    }

    /// 冻结前与编写期声明逐项核对；任何不一致都使启动失败
    pub fn build_verified(self, declarations: &BindingDeclarations) -> RegistryResult<BindingRegistry> {
        declarations.verify(self.symbols())?;
        Ok(self.build())
    }

    fn validate(symbol: &NativeSymbol) -> RegistryResult<()> {
        let invalid = |reason: &str| RegistryError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        };

        if symbol.name.is_empty() {
            return Err(invalid("symbol name is empty"));
        }
        if symbol.scope.class_name() == Some("") {
            return Err(invalid("class name is empty"));
        }

        match (&symbol.kind, &symbol.scope) {
            (SymbolKind::FreeFunction, Scope::Global) => Ok(()),
            (SymbolKind::FreeFunction, Scope::Class(_)) => {
                Err(invalid("free functions belong to the global scope"))
            }
            (_, Scope::Global) => Err(invalid("class members need a class scope")),
            (SymbolKind::StaticFactory, Scope::Class(class)) => {
                if symbol.returns == ValueType::Handle(class.clone()) {
                    Ok(())
                } else {
                    Err(invalid("a static factory must return a handle of its own class"))
                }
            }
            (SymbolKind::InstanceMethod, Scope::Class(_)) => Ok(()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<BindingRegistry>> = OnceLock::new();

/// 冻结后的绑定注册表
pub struct BindingRegistry {
    symbols: HashMap<SymbolKey, RegisteredSymbol>,
    order: Vec<SymbolKey>,
}

impl BindingRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// 精确解析 (名称, 作用域)
    pub fn resolve(&self, name: &str, scope: &Scope) -> Result<&RegisteredSymbol, DispatchError> {
        self.symbols
            .get(&(scope.clone(), name.to_string()))
            .ok_or_else(|| DispatchError::NotFound {
                scope: scope.clone(),
                name: name.to_string(),
            })
    }

    /// 所有符号（注册顺序）
    pub fn symbols(&self) -> impl Iterator<Item = &NativeSymbol> {
        self.order
            .iter()
            .filter_map(|key| self.symbols.get(key))
            .map(|entry| &entry.symbol)
    }

    /// 全局自由函数
    pub fn globals(&self) -> impl Iterator<Item = &NativeSymbol> {
        self.symbols().filter(|symbol| symbol.scope == Scope::Global)
    }

    /// 出现过的类名
    pub fn classes(&self) -> BTreeSet<&str> {
        self.symbols()
            .filter_map(|symbol| symbol.scope.class_name())
            .collect()
    }

    /// 指定类的全部成员
    pub fn class_members<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a NativeSymbol> + 'a {
        self.symbols()
            .filter(move |symbol| symbol.scope.class_name() == Some(class))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 安装为进程级注册表（只能一次，运行期间不拆除）
    pub fn install_global(self) -> RegistryResult<Arc<BindingRegistry>> {
        let registry = Arc::new(self);
        GLOBAL_REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        Ok(registry)
    }

    /// 进程级注册表（若已安装）
    pub fn global() -> Option<Arc<BindingRegistry>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}

impl fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.symbols()).finish()
    }
}

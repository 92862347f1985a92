//! 绑定类型定义
//!
//! 描述跨越 native/script 边界的符号与值类型：
//! - [`PrimitiveType`] - 参数允许的基础类型
//! - [`ValueType`] - 返回值与编组目标类型（基础类型、句柄、void）
//! - [`Scope`] / [`SymbolKind`] / [`NativeSymbol`] - 注册表中的符号描述
//! - [`Handle`] - 指向 native 对象的不透明标识符

use serde::{Deserialize, Serialize};
use std::fmt;

/// 基础类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    /// 布尔值
    Boolean,
    /// 双精度浮点数
    Number,
    /// 字符串
    String,
}

impl PrimitiveType {
    /// 类型在声明中的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Number => "number",
            PrimitiveType::String => "string",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 编组目标类型
///
/// 声明文件中以字符串表示：`boolean` / `number` / `string` / `void`，
/// 其他任何名称都被视为该类的句柄类型。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    /// 指定类的 native 句柄
    Handle(String),
    Void,
}

impl ValueType {
    /// 构造指定类的句柄类型
    pub fn handle(class: impl Into<String>) -> Self {
        ValueType::Handle(class.into())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ValueType::Void)
    }
}

impl From<PrimitiveType> for ValueType {
    fn from(ty: PrimitiveType) -> Self {
        match ty {
            PrimitiveType::Boolean => ValueType::Boolean,
            PrimitiveType::Number => ValueType::Number,
            PrimitiveType::String => ValueType::String,
        }
    }
}

impl From<String> for ValueType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "boolean" => ValueType::Boolean,
            "number" => ValueType::Number,
            "string" => ValueType::String,
            "void" => ValueType::Void,
            _ => ValueType::Handle(name),
        }
    }
}

impl From<&str> for ValueType {
    fn from(name: &str) -> Self {
        ValueType::from(name.to_string())
    }
}

impl From<ValueType> for String {
    fn from(ty: ValueType) -> Self {
        ty.to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => f.write_str("boolean"),
            ValueType::Number => f.write_str("number"),
            ValueType::String => f.write_str("string"),
            ValueType::Handle(class) => f.write_str(class),
            ValueType::Void => f.write_str("void"),
        }
    }
}

/// 符号的绑定作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// 全局作用域（自由函数）
    Global,
    /// 类作用域（静态工厂与实例方法）
    Class(String),
}

impl Scope {
    pub fn class(name: impl Into<String>) -> Self {
        Scope::Class(name.into())
    }

    /// 类作用域对应的类名
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Class(name) => Some(name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Class(name) => write!(f, "class {}", name),
        }
    }
}

/// 符号种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    FreeFunction,
    StaticFactory,
    InstanceMethod,
}

/// 注册到桥接层的 native 符号
///
/// 注册后不可变；名称在其作用域内唯一。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSymbol {
    pub name: String,
    pub scope: Scope,
    pub kind: SymbolKind,
    pub params: Vec<PrimitiveType>,
    pub returns: ValueType,
}

impl NativeSymbol {
    /// 全局自由函数
    pub fn function(
        name: impl Into<String>,
        params: Vec<PrimitiveType>,
        returns: impl Into<ValueType>,
    ) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Global,
            kind: SymbolKind::FreeFunction,
            params,
            returns: returns.into(),
        }
    }

    /// 类的静态工厂，返回该类的句柄
    pub fn factory(
        class: impl Into<String>,
        name: impl Into<String>,
        params: Vec<PrimitiveType>,
    ) -> Self {
        let class = class.into();
        Self {
            name: name.into(),
            returns: ValueType::Handle(class.clone()),
            scope: Scope::Class(class),
            kind: SymbolKind::StaticFactory,
            params,
        }
    }

    /// 类的实例方法
    pub fn method(
        class: impl Into<String>,
        name: impl Into<String>,
        params: Vec<PrimitiveType>,
        returns: impl Into<ValueType>,
    ) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Class(class.into()),
            kind: SymbolKind::InstanceMethod,
            params,
            returns: returns.into(),
        }
    }

    /// 参数个数
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for NativeSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(PrimitiveType::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match &self.scope {
            Scope::Global => write!(f, "{}({}) -> {}", self.name, params, self.returns),
            Scope::Class(class) => {
                let sep = if self.kind == SymbolKind::InstanceMethod { "#" } else { "." };
                write!(f, "{}{}{}({}) -> {}", class, sep, self.name, params, self.returns)
            }
        }
    }
}

/// native 对象句柄
///
/// 脚本侧只持有这个标识符，永远不持有对象本身。`0` 永远不会被分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// 不指向任何对象的句柄
    pub const NULL: Handle = Handle(0);

    pub const fn from_raw(id: u64) -> Self {
        Handle(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

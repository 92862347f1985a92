//! 编写期声明
//!
//! 脚本作者看到的类型化声明面（函数声明、带静态/实例方法的类声明）。
//! 运行期注册表必须与声明完全一致（名称、参数个数、类型），否则启动失败。
//!
//! 声明可以从 TOML/JSON 加载，也可以从注册表反向生成并输出为 TypeScript 声明文本。

use crate::bindings::registry::BindingRegistry;
use crate::bindings::types::{NativeSymbol, PrimitiveType, Scope, SymbolKind, ValueType};
use crate::config::{ConfigError, ConfigResult};
use crate::core::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

fn void_type() -> ValueType {
    ValueType::Void
}

/// 参数声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
}

/// 函数/方法声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default = "void_type")]
    pub returns: ValueType,
}

impl FunctionDecl {
    fn param_types(&self) -> Vec<PrimitiveType> {
        self.params.iter().map(|p| p.ty).collect()
    }

    fn typescript_params(&self) -> String {
        self.params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 类声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    /// 静态工厂；返回类型固定为本类句柄
    #[serde(default)]
    pub factories: Vec<FunctionDecl>,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
}

/// 声明集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingDeclarations {
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
}

impl BindingDeclarations {
    /// 从TOML字符串解析声明
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON字符串解析声明
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从文件加载，`.json` 按JSON解析，其余按TOML解析
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// 从注册表生成声明（参数名按位置命名）
    pub fn from_registry(registry: &BindingRegistry) -> Self {
        let to_decl = |symbol: &NativeSymbol| FunctionDecl {
            name: symbol.name.clone(),
            params: symbol
                .params
                .iter()
                .enumerate()
                .map(|(i, ty)| ParamDecl {
                    name: format!("arg{}", i),
                    ty: *ty,
                })
                .collect(),
            returns: symbol.returns.clone(),
        };

        let functions = registry.globals().map(to_decl).collect();
        let classes = registry
            .classes()
            .into_iter()
            .map(|class| {
                let mut decl = ClassDecl {
                    name: class.to_string(),
                    factories: Vec::new(),
                    methods: Vec::new(),
                };
                for member in registry.class_members(class) {
                    match member.kind {
                        SymbolKind::StaticFactory => decl.factories.push(to_decl(member)),
                        _ => decl.methods.push(to_decl(member)),
                    }
                }
                decl
            })
            .collect();

        Self { functions, classes }
    }

    /// 展开为符号列表
    ///
    /// 声明内部重名、返回类型引用了未声明的类，都视为配置错误。
    pub fn symbols(&self) -> RegistryResult<Vec<NativeSymbol>> {
        let mut symbols = Vec::new();
        for func in &self.functions {
            symbols.push(NativeSymbol::function(
                func.name.clone(),
                func.param_types(),
                func.returns.clone(),
            ));
        }
        for class in &self.classes {
            for factory in &class.factories {
                symbols.push(NativeSymbol::factory(
                    class.name.clone(),
                    factory.name.clone(),
                    factory.param_types(),
                ));
            }
            for method in &class.methods {
                symbols.push(NativeSymbol::method(
                    class.name.clone(),
                    method.name.clone(),
                    method.param_types(),
                    method.returns.clone(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for symbol in &symbols {
            if !seen.insert((symbol.scope.clone(), symbol.name.clone())) {
                return Err(RegistryError::DuplicateSymbol {
                    scope: symbol.scope.clone(),
                    name: symbol.name.clone(),
                });
            }
        }

        let classes: HashSet<&str> = self.classes.iter().map(|class| class.name.as_str()).collect();
        for symbol in &symbols {
            if let ValueType::Handle(class) = &symbol.returns {
                if !classes.contains(class.as_str()) {
                    return Err(RegistryError::InvalidSymbol {
                        symbol: symbol.to_string(),
                        reason: format!("unknown return type '{}'", class),
                    });
                }
            }
        }
        Ok(symbols)
    }

    /// 与注册的符号逐项核对
    pub fn verify<'a>(&self, registered: impl IntoIterator<Item = &'a NativeSymbol>) -> RegistryResult<()> {
        let declared = self.symbols()?;
        let by_key: HashMap<(&Scope, &str), &NativeSymbol> = declared
            .iter()
            .map(|symbol| ((&symbol.scope, symbol.name.as_str()), symbol))
            .collect();

        let mut implemented = HashSet::new();
        for symbol in registered {
            match by_key.get(&(&symbol.scope, symbol.name.as_str())) {
                None => {
                    return Err(RegistryError::Undeclared {
                        symbol: symbol.to_string(),
                    })
                }
                Some(decl) if *decl != symbol => {
                    return Err(RegistryError::SignatureMismatch {
                        declared: decl.to_string(),
                        registered: symbol.to_string(),
                    })
                }
                Some(_) => {
                    implemented.insert((symbol.scope.clone(), symbol.name.clone()));
                }
            }
        }

        if let Some(missing) = declared
            .iter()
            .find(|symbol| !implemented.contains(&(symbol.scope.clone(), symbol.name.clone())))
        {
            return Err(RegistryError::Unimplemented {
                symbol: missing.to_string(),
            });
        }
        Ok(())
    }

    /// 输出 TypeScript 声明文本
    pub fn to_typescript(&self) -> String {
        let mut out = String::new();
        for func in &self.functions {
            let _ = writeln!(
                out,
                "declare function {}({}): {};",
                func.name,
                func.typescript_params(),
                func.returns
            );
        }
        for class in &self.classes {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = writeln!(out, "declare class {} {{", class.name);
            for factory in &class.factories {
                let _ = writeln!(
                    out,
                    "    static {}({}): {};",
                    factory.name,
                    factory.typescript_params(),
                    class.name
                );
            }
            for method in &class.methods {
                let _ = writeln!(
                    out,
                    "    {}({}): {};",
                    method.name,
                    method.typescript_params(),
                    method.returns
                );
            }
            out.push_str("}\n");
        }
        out
    }
}

//! Language Binding Layer
//!
//! Native symbols, value marshaling and handle ownership shared by every
//! script backend (QuickJS, Rust-authored scripts).
//!
//! Architecture:
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Script Environments                      │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐                      │
//! │  │   JS    │  │  Rust   │  │   ...   │                      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘                      │
//! │       │            │            │                           │
//! │       v            v            v                           │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │       Call Dispatcher (scripting::dispatcher)       │   │
//! │  └──────┬──────────────────┬────────────────┬──────────┘   │
//! │         v                  v                v              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐     │
//! │  │  Registry   │   │ Value        │   │ Handle Table │     │
//! │  │  (frozen)   │   │ Marshaler    │   │ (RwLock)     │     │
//! │  └──────┬──────┘   └──────────────┘   └──────────────┘     │
//! │         v                                                  │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │     Native Engine Services (input, spawn, ...)      │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod declarations;
pub mod handles;
pub mod registry;
pub mod types;
pub mod value;

pub use declarations::{BindingDeclarations, ClassDecl, FunctionDecl, ParamDecl};
pub use handles::HandleTable;
pub use registry::{
    BindingRegistry, NativeCall, NativeEntryPoint, NativeFailure, RegisteredSymbol,
    RegistryBuilder,
};
pub use types::{Handle, NativeSymbol, PrimitiveType, Scope, SymbolKind, ValueType};
pub use value::{NativeObject, NativeValue, ScriptValue, ValueMarshaler, MAX_SAFE_INTEGER};

//! # Script Bridge
//!
//! A native scripting bridge: exposes a declared set of native capabilities
//! (free functions, classes with static factories and instance methods) to
//! embedded scripts, marshals calls and values across the boundary, and drives
//! script update callbacks from the engine's per-frame loop.
//!
//! ## Features
//!
//! - **Binding Registry**: frozen `(scope, name)` symbol table, verified against authoring declarations
//! - **Value Marshaling**: typed conversion with no implicit coercion and precision checks
//! - **Native Handles**: opaque, never-reused identifiers for native objects
//! - **Call Dispatch**: arity/type validated calls in both directions, native failures returned as values
//! - **Frame Driver**: per-script isolation of failing or incomplete scripts
//! - **Backends**: QuickJS (`rquickjs`) scripts and Rust-authored scripts
//!
//! ### Example
//!
//! ```ignore
//! use script_bridge::bindings::RegistryBuilder;
//! use script_bridge::config::ScriptingConfig;
//! use script_bridge::scripting::{register_engine_api, EngineServices, ScriptRuntime, SAMPLE_SCRIPT};
//!
//! let services = EngineServices::new();
//! let mut builder = RegistryBuilder::new();
//! register_engine_api(&mut builder, &services)?;
//!
//! let runtime = ScriptRuntime::from_builder(builder, ScriptingConfig::default())?;
//! let mut driver = runtime.frame_driver();
//! driver.load(runtime.load_js("sample.js", SAMPLE_SCRIPT)?);
//!
//! services.input().press("A");
//! let report = driver.tick_all(0.016);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Error taxonomy, logging and shared macros
//! - [`config`]: Bridge configuration
//! - [`bindings`]: Symbols, values, registry, handles and declarations
//! - [`scripting`]: Dispatcher, script environments, backends and frame driver

/// Error types, logging initialisation and shared macros
pub mod core;
/// Configuration system
pub mod config;
/// Native symbols, value marshaling and handle ownership
pub mod bindings;
/// Script environments, call dispatch and frame driving
pub mod scripting;

pub use crate::core::error::{BridgeError, BridgeResult, DispatchError, DispatchResult};

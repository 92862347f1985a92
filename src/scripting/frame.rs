//! 帧驱动
//!
//! 每个模拟 tick 对每个已加载脚本同步调用一次更新入口点。
//! 失败按脚本隔离：一个脚本出错只影响它自己，其余脚本照常推进。

use crate::bindings::types::Handle;
use crate::bindings::value::ScriptValue;
use crate::config::ScriptingConfig;
use crate::core::error::{DispatchError, DispatchResult, StaleHandleError};
use crate::scripting::environment::{EntryPointSignature, ScriptEnvironment};
use std::fmt;

/// 帧驱动内的脚本标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u64);

impl ScriptId {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script-{}", self.0)
    }
}

/// 单个脚本一次 tick 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TickResult {
    /// 入口点返回的字符串
    Completed(String),
    Failed(DispatchError),
    /// 脚本已停用，本次未调用
    Skipped,
}

impl TickResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, TickResult::Completed(_))
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            TickResult::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// 报告中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTick {
    pub id: ScriptId,
    pub script: String,
    pub result: TickResult,
}

/// 一帧的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub dt: f64,
    pub scripts: Vec<ScriptTick>,
}

impl FrameReport {
    pub fn completed(&self) -> usize {
        self.scripts.iter().filter(|s| s.result.is_completed()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScriptTick> {
        self.scripts
            .iter()
            .filter(|s| matches!(s.result, TickResult::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.scripts
            .iter()
            .filter(|s| s.result == TickResult::Skipped)
            .count()
    }

    /// 按标识查找结果
    pub fn result(&self, id: ScriptId) -> Option<&TickResult> {
        self.scripts.iter().find(|s| s.id == id).map(|s| &s.result)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    Active,
    Disabled(String),
}

struct ScriptSlot {
    id: ScriptId,
    env: ScriptEnvironment,
    state: SlotState,
    consecutive_failures: u32,
}

/// 帧驱动
pub struct FrameDriver {
    entry_point: EntryPointSignature,
    skip_missing_entry_point: bool,
    disable_after_failures: Option<u32>,
    scripts: Vec<ScriptSlot>,
    next_id: u64,
    frame: u64,
}

impl FrameDriver {
    pub fn new(config: &ScriptingConfig) -> Self {
        Self {
            entry_point: EntryPointSignature::update(config.update_entry_point.clone()),
            skip_missing_entry_point: config.skip_missing_entry_point,
            disable_after_failures: config.disable_after_failures,
            scripts: Vec::new(),
            next_id: 1,
            frame: 0,
        }
    }

    pub fn entry_point(&self) -> &EntryPointSignature {
        &self.entry_point
    }

    /// 对单个环境执行一次更新入口点调用
    pub fn tick(&self, env: &mut ScriptEnvironment, dt: f64) -> DispatchResult<String> {
        run_update(&self.entry_point, env, dt)
    }

    /// 加入一个脚本，下一帧开始被调用
    pub fn load(&mut self, mut env: ScriptEnvironment) -> ScriptId {
        let id = ScriptId(self.next_id);
        self.next_id += 1;
        env.declare_entry_point(self.entry_point.clone());
        tracing::info!(target: "bridge.frame", %id, script = env.name(), "script added to frame driver");
        self.scripts.push(ScriptSlot {
            id,
            env,
            state: SlotState::Active,
            consecutive_failures: 0,
        });
        id
    }

    /// 卸载脚本并交还其环境
    pub fn unload(&mut self, id: ScriptId) -> Option<ScriptEnvironment> {
        let index = self.scripts.iter().position(|slot| slot.id == id)?;
        let slot = self.scripts.remove(index);
        tracing::info!(target: "bridge.frame", %id, script = slot.env.name(), "script unloaded");
        Some(slot.env)
    }

    /// 按加载顺序调用所有脚本一次
    pub fn tick_all(&mut self, dt: f64) -> FrameReport {
        self.frame += 1;
        let frame = self.frame;
        let mut scripts = Vec::with_capacity(self.scripts.len());

        for index in 0..self.scripts.len() {
            let result = self.tick_slot(index, dt);
            let slot = &self.scripts[index];
            scripts.push(ScriptTick {
                id: slot.id,
                script: slot.env.name().to_string(),
                result,
            });
        }

        tracing::trace!(target: "bridge.frame", frame, dt, scripts = scripts.len(), "frame ticked");
        FrameReport { frame, dt, scripts }
    }

    fn tick_slot(&mut self, index: usize, dt: f64) -> TickResult {
        if self.scripts[index].state != SlotState::Active {
            return TickResult::Skipped;
        }

        let outcome = run_update(&self.entry_point, &mut self.scripts[index].env, dt);

        let slot = &mut self.scripts[index];
        match outcome {
            Ok(result) => {
                slot.consecutive_failures = 0;
                TickResult::Completed(result)
            }
            Err(err) => {
                slot.consecutive_failures += 1;
                tracing::warn!(
                    target: "bridge.frame",
                    id = %slot.id,
                    script = slot.env.name(),
                    error = %err,
                    "script tick failed"
                );

                if err.is_missing_entry_point() && self.skip_missing_entry_point {
                    Self::disable(slot, "missing update entry point");
                } else if let Some(limit) = self.disable_after_failures {
                    if slot.consecutive_failures >= limit {
                        Self::disable(slot, "too many consecutive failures");
                    }
                }
                TickResult::Failed(err)
            }
        }
    }

    fn disable(slot: &mut ScriptSlot, reason: &str) {
        tracing::info!(target: "bridge.frame", id = %slot.id, script = slot.env.name(), reason, "script disabled for the rest of the session");
        slot.state = SlotState::Disabled(reason.to_string());
    }

    /// 重新启用被停用的脚本
    pub fn enable(&mut self, id: ScriptId) -> bool {
        match self.scripts.iter_mut().find(|slot| slot.id == id) {
            Some(slot) => {
                slot.state = SlotState::Active;
                slot.consecutive_failures = 0;
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, id: ScriptId) -> bool {
        self.scripts
            .iter()
            .any(|slot| slot.id == id && slot.state == SlotState::Active)
    }

    /// 停用原因（若已停用）
    pub fn disabled_reason(&self, id: ScriptId) -> Option<&str> {
        self.scripts.iter().find(|slot| slot.id == id).and_then(|slot| match &slot.state {
            SlotState::Disabled(reason) => Some(reason.as_str()),
            SlotState::Active => None,
        })
    }

    pub fn environment(&self, id: ScriptId) -> Option<&ScriptEnvironment> {
        self.scripts.iter().find(|slot| slot.id == id).map(|slot| &slot.env)
    }

    pub fn environment_mut(&mut self, id: ScriptId) -> Option<&mut ScriptEnvironment> {
        self.scripts
            .iter_mut()
            .find(|slot| slot.id == id)
            .map(|slot| &mut slot.env)
    }

    /// 由引擎退役某个脚本可见的句柄
    pub fn retire_handle(&self, id: ScriptId, handle: Handle) -> Result<(), StaleHandleError> {
        match self.environment(id) {
            Some(env) => env.retire_handle(handle),
            None => Err(StaleHandleError(handle)),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ScriptId> + '_ {
        self.scripts.iter().map(|slot| slot.id)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// 已完成的帧数
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

fn run_update(
    entry_point: &EntryPointSignature,
    env: &mut ScriptEnvironment,
    dt: f64,
) -> DispatchResult<String> {
    match env.invoke(entry_point, &[ScriptValue::Number(dt)])? {
        ScriptValue::String(s) => Ok(s),
        other => Err(DispatchError::InvalidReturn {
            name: entry_point.name.clone(),
            expected: entry_point.returns.clone(),
            found: other.kind().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::handles::HandleTable;
    use crate::bindings::registry::RegistryBuilder;
    use crate::scripting::dispatcher::CallDispatcher;
    use crate::scripting::native_script::NativeScript;
    use std::sync::Arc;

    fn env(script: NativeScript) -> ScriptEnvironment {
        let dispatcher = CallDispatcher::new(
            Arc::new(RegistryBuilder::new().build()),
            Arc::new(HandleTable::new()),
        );
        let name = script.name().to_string();
        ScriptEnvironment::new(name, Box::new(script), dispatcher)
    }

    fn echo(name: &str) -> NativeScript {
        NativeScript::new(name).define("globalFunction", |_, args| {
            Ok(format!("dt={}", args[0].as_number().unwrap_or_default()).into())
        })
    }

    fn failing(name: &str) -> NativeScript {
        NativeScript::new(name).define("globalFunction", |_, _| {
            Err(DispatchError::ScriptFailure {
                name: "globalFunction".to_string(),
                detail: "always".to_string(),
            })
        })
    }

    #[test]
    fn test_single_tick() {
        let driver = FrameDriver::new(&ScriptingConfig::default());
        let mut env = env(echo("echo"));
        assert_eq!(driver.tick(&mut env, 0.5), Ok("dt=0.5".to_string()));
    }

    #[test]
    fn test_missing_entry_point_is_isolated() {
        let mut driver = FrameDriver::new(&ScriptingConfig::default());
        let empty = driver.load(env(NativeScript::new("empty")));
        let echo = driver.load(env(echo("echo")));

        let report = driver.tick_all(0.016);
        assert!(matches!(
            report.result(empty),
            Some(TickResult::Failed(DispatchError::MissingEntryPoint { .. }))
        ));
        assert_eq!(
            report.result(echo),
            Some(&TickResult::Completed("dt=0.016".to_string()))
        );

        let report = driver.tick_all(0.016);
        assert_eq!(report.frame, 2);
        assert_eq!(report.result(empty), Some(&TickResult::Skipped));
        assert!(report.result(echo).unwrap().is_completed());
        assert_eq!(driver.disabled_reason(empty), Some("missing update entry point"));
    }

    #[test]
    fn test_missing_entry_point_retried_when_not_skipping() {
        let config = ScriptingConfig {
            skip_missing_entry_point: false,
            ..ScriptingConfig::default()
        };
        let mut driver = FrameDriver::new(&config);
        let empty = driver.load(env(NativeScript::new("empty")));

        driver.tick_all(0.016);
        let report = driver.tick_all(0.016);
        assert!(report.result(empty).unwrap().error().is_some());
        assert!(driver.is_active(empty));
    }

    #[test]
    fn test_disable_after_failures() {
        let config = ScriptingConfig {
            disable_after_failures: Some(2),
            ..ScriptingConfig::default()
        };
        let mut driver = FrameDriver::new(&config);
        let bad = driver.load(env(failing("bad")));

        assert_eq!(driver.tick_all(0.1).failed().count(), 1);
        assert!(driver.is_active(bad));
        assert_eq!(driver.tick_all(0.1).failed().count(), 1);
        assert!(!driver.is_active(bad));
        assert_eq!(driver.tick_all(0.1).skipped(), 1);

        assert!(driver.enable(bad));
        assert_eq!(driver.tick_all(0.1).failed().count(), 1);
    }

    #[test]
    fn test_unload_between_ticks() {
        let mut driver = FrameDriver::new(&ScriptingConfig::default());
        let first = driver.load(env(echo("first")));
        let second = driver.load(env(echo("second")));

        assert_eq!(driver.tick_all(0.1).completed(), 2);
        let env = driver.unload(first).unwrap();
        assert_eq!(env.name(), "first");
        assert!(driver.unload(first).is_none());

        let report = driver.tick_all(0.1);
        assert_eq!(report.scripts.len(), 1);
        assert_eq!(report.scripts[0].id, second);
        assert_eq!(driver.ids().collect::<Vec<_>>(), vec![second]);
    }

    #[test]
    fn test_wrong_return_type() {
        let mut driver = FrameDriver::new(&ScriptingConfig::default());
        let id = driver.load(env(
            NativeScript::new("number").define("globalFunction", |_, _| Ok(1.0.into())),
        ));
        let report = driver.tick_all(0.1);
        assert!(matches!(
            report.result(id),
            Some(TickResult::Failed(DispatchError::InvalidReturn { .. }))
        ));
    }
}

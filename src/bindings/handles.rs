//! native 句柄表
//!
//! 将交给脚本的不透明句柄映射到存活的 native 对象。
//! 读路径 (`resolve`) 允许多线程并发；`create` / `retire` 在写锁下串行。
//! 标识符单调递增，永不复用。

use crate::bindings::types::Handle;
use crate::bindings::value::NativeObject;
use crate::core::error::StaleHandleError;
use parking_lot::RwLock;
use std::collections::HashMap;

struct HandleEntry {
    class: String,
    object: NativeObject,
}

struct HandleSlots {
    entries: HashMap<Handle, HandleEntry>,
    next_id: u64,
}

/// 句柄表
pub struct HandleTable {
    slots: RwLock<HandleSlots>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HandleSlots {
                entries: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// 登记静态工厂创建的对象，返回新句柄
    pub fn create(&self, class: &str, object: NativeObject) -> Handle {
        let mut slots = self.slots.write();
        let handle = Handle::from_raw(slots.next_id);
        slots.next_id += 1;
        slots.entries.insert(
            handle,
            HandleEntry {
                class: class.to_string(),
                object,
            },
        );
        tracing::trace!(target: "bridge.handles", %handle, class, "handle created");
        handle
    }

    /// 解析句柄；已退役或未知的句柄返回 `StaleHandleError`
    pub fn resolve(&self, handle: Handle) -> Result<NativeObject, StaleHandleError> {
        self.slots
            .read()
            .entries
            .get(&handle)
            .map(|entry| entry.object.clone())
            .ok_or(StaleHandleError(handle))
    }

    /// 解析句柄及其所属类名
    pub fn resolve_with_class(
        &self,
        handle: Handle,
    ) -> Result<(String, NativeObject), StaleHandleError> {
        self.slots
            .read()
            .entries
            .get(&handle)
            .map(|entry| (entry.class.clone(), entry.object.clone()))
            .ok_or(StaleHandleError(handle))
    }

    /// 退役句柄。只由 native 引擎调用，桥接层自身从不主动释放。
    pub fn retire(&self, handle: Handle) -> Result<(), StaleHandleError> {
        match self.slots.write().entries.remove(&handle) {
            Some(entry) => {
                tracing::trace!(target: "bridge.handles", %handle, class = %entry.class, "handle retired");
                Ok(())
            }
            None => Err(StaleHandleError(handle)),
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.read().entries.contains_key(&handle)
    }

    /// 存活句柄数量
    pub fn len(&self) -> usize {
        self.slots.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_create_and_resolve() {
        let table = HandleTable::new();
        let handle = table.create("MyNativeBinding", NativeObject::new(5u32));

        assert!(!handle.is_null());
        let object = table.resolve(handle).unwrap();
        assert_eq!(object.downcast_ref::<u32>(), Some(&5));

        let (class, _) = table.resolve_with_class(handle).unwrap();
        assert_eq!(class, "MyNativeBinding");
    }

    #[test]
    fn test_retired_handle_is_stale() {
        let table = HandleTable::new();
        let handle = table.create("MyNativeBinding", NativeObject::new(()));
        table.retire(handle).unwrap();

        assert_eq!(table.resolve(handle).unwrap_err(), StaleHandleError(handle));
        assert_eq!(table.retire(handle), Err(StaleHandleError(handle)));
        assert!(table.resolve(Handle::NULL).is_err());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let table = HandleTable::new();
        let first = table.create("A", NativeObject::new(()));
        table.retire(first).unwrap();
        let second = table.create("A", NativeObject::new(()));
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn test_concurrent_resolve_with_single_writer() {
        let table = Arc::new(HandleTable::new());
        let handles: Vec<Handle> = (0..64u32)
            .map(|i| table.create("A", NativeObject::new(i)))
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                let handles = handles.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        for handle in &handles {
                            // 每次解析要么得到原对象，要么是 stale，不会读到其他对象
                            if let Ok(object) = table.resolve(*handle) {
                                let value = *object.downcast_ref::<u32>().unwrap();
                                assert_eq!(value as u64 + 1, handle.id());
                            }
                        }
                    }
                })
            })
            .collect();

        let writer = {
            let table = Arc::clone(&table);
            let handles = handles.clone();
            thread::spawn(move || {
                for handle in handles.iter().step_by(2) {
                    table.retire(*handle).unwrap();
                }
            })
        };

        for reader in readers {
            reader.join().unwrap();
        }
        writer.join().unwrap();
        assert_eq!(table.len(), 32);
    }
}

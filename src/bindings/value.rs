//! 值编组
//!
//! 脚本侧值 ([`ScriptValue`]) 与 native 侧值 ([`NativeValue`]) 之间的转换。
//! 基础类型按值复制；native 对象只以 [`Handle`] 的形式出现在脚本侧。

use crate::bindings::types::{Handle, ValueType};
use crate::core::error::{MarshalError, MarshalResult};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 能被 `f64` 精确表示的最大整数 (2^53 - 1)
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// 脚本侧的值
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Bool(bool),
    /// 整数字面量；在需要 number 的位置被无损放宽
    Integer(i64),
    Number(f64),
    String(String),
    Handle(Handle),
}

impl ScriptValue {
    /// 值的种类名称，用于错误信息
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Integer(_) => "integer",
            ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Handle(_) => "handle",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 数值（整数按 f64 读取）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            ScriptValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            ScriptValue::Handle(h) => Some(*h),
            _ => None,
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<i64> for ScriptValue {
    fn from(i: i64) -> Self {
        ScriptValue::Integer(i)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

impl From<Handle> for ScriptValue {
    fn from(h: Handle) -> Self {
        ScriptValue::Handle(h)
    }
}

/// native 对象的共享引用
///
/// 只由句柄表和 native 入口点持有。
#[derive(Clone)]
pub struct NativeObject(Arc<dyn Any + Send + Sync>);

impl NativeObject {
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// 按具体类型访问对象
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// 两个引用是否指向同一个对象
    pub fn ptr_eq(&self, other: &NativeObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeObject({:p})", Arc::as_ptr(&self.0))
    }
}

/// native 侧的值
#[derive(Debug, Clone)]
pub enum NativeValue {
    Void,
    Bool(bool),
    /// native 整数；回到脚本侧时检查精度
    Integer(i64),
    Number(f64),
    String(String),
    Handle(Handle),
    /// 静态工厂创建的新对象，由分派器登记到句柄表
    Object(NativeObject),
}

impl NativeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            NativeValue::Void => "void",
            NativeValue::Bool(_) => "boolean",
            NativeValue::Integer(_) => "integer",
            NativeValue::Number(_) => "number",
            NativeValue::String(_) => "string",
            NativeValue::Handle(_) => "handle",
            NativeValue::Object(_) => "object",
        }
    }

    /// 值是否满足声明的返回类型
    pub fn conforms_to(&self, ty: &ValueType) -> bool {
        matches!(
            (self, ty),
            (NativeValue::Void, ValueType::Void)
                | (NativeValue::Bool(_), ValueType::Boolean)
                | (NativeValue::Number(_), ValueType::Number)
                | (NativeValue::Integer(_), ValueType::Number)
                | (NativeValue::String(_), ValueType::String)
                | (NativeValue::Handle(_), ValueType::Handle(_))
                | (NativeValue::Object(_), ValueType::Handle(_))
        )
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeValue::Void, NativeValue::Void) => true,
            (NativeValue::Bool(a), NativeValue::Bool(b)) => a == b,
            (NativeValue::Integer(a), NativeValue::Integer(b)) => a == b,
            (NativeValue::Number(a), NativeValue::Number(b)) => a == b,
            (NativeValue::String(a), NativeValue::String(b)) => a == b,
            (NativeValue::Handle(a), NativeValue::Handle(b)) => a == b,
            (NativeValue::Object(a), NativeValue::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// 值编组器
///
/// 纯转换，无副作用。除整数到 number 的放宽外不做任何隐式转换。
pub struct ValueMarshaler;

impl ValueMarshaler {
    /// native 值 -> 脚本值
    pub fn to_script(value: NativeValue) -> MarshalResult<ScriptValue> {
        match value {
            NativeValue::Void => Ok(ScriptValue::Undefined),
            NativeValue::Bool(b) => Ok(ScriptValue::Bool(b)),
            NativeValue::Integer(i) => {
                Self::check_safe_integer(i)?;
                Ok(ScriptValue::Integer(i))
            }
            NativeValue::Number(n) => Ok(ScriptValue::Number(n)),
            NativeValue::String(s) => Ok(ScriptValue::String(s)),
            NativeValue::Handle(h) => Ok(ScriptValue::Handle(h)),
            NativeValue::Object(_) => Err(MarshalError::UnboundObject),
        }
    }

    /// 脚本值 -> native 值，按声明的类型校验
    pub fn to_native(value: &ScriptValue, expected: &ValueType) -> MarshalResult<NativeValue> {
        match (value, expected) {
            (ScriptValue::Bool(b), ValueType::Boolean) => Ok(NativeValue::Bool(*b)),
            (ScriptValue::Number(n), ValueType::Number) => Ok(NativeValue::Number(*n)),
            (ScriptValue::Integer(i), ValueType::Number) => {
                Self::check_safe_integer(*i)?;
                Ok(NativeValue::Number(*i as f64))
            }
            (ScriptValue::String(s), ValueType::String) => Ok(NativeValue::String(s.clone())),
            (ScriptValue::Handle(h), ValueType::Handle(_)) => Ok(NativeValue::Handle(*h)),
            (ScriptValue::Undefined, ValueType::Void) => Ok(NativeValue::Void),
            (other, expected) => Err(MarshalError::TypeMismatch {
                expected: expected.clone(),
                found: other.kind().to_string(),
            }),
        }
    }

    /// 校验脚本值是否满足类型（不产生 native 值）
    pub fn check(value: &ScriptValue, expected: &ValueType) -> MarshalResult<()> {
        Self::to_native(value, expected).map(|_| ())
    }

    fn check_safe_integer(value: i64) -> MarshalResult<()> {
        if value.unsigned_abs() > MAX_SAFE_INTEGER as u64 {
            return Err(MarshalError::PrecisionLoss { value });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integer_widens_to_number() {
        let native = ValueMarshaler::to_native(&ScriptValue::Integer(10), &ValueType::Number);
        assert_eq!(native, Ok(NativeValue::Number(10.0)));
    }

    #[test]
    fn test_no_implicit_coercion() {
        let err = ValueMarshaler::to_native(&ScriptValue::from("10"), &ValueType::Number);
        assert_eq!(
            err,
            Err(MarshalError::TypeMismatch {
                expected: ValueType::Number,
                found: "string".to_string()
            })
        );

        let err = ValueMarshaler::to_native(&ScriptValue::Number(1.0), &ValueType::Boolean);
        assert!(matches!(err, Err(MarshalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_precision_loss_is_reported() {
        let big = MAX_SAFE_INTEGER + 1;
        assert_eq!(
            ValueMarshaler::to_native(&ScriptValue::Integer(big), &ValueType::Number),
            Err(MarshalError::PrecisionLoss { value: big })
        );
        assert_eq!(
            ValueMarshaler::to_script(NativeValue::Integer(-big)),
            Err(MarshalError::PrecisionLoss { value: -big })
        );
        assert_eq!(
            ValueMarshaler::to_script(NativeValue::Integer(MAX_SAFE_INTEGER)),
            Ok(ScriptValue::Integer(MAX_SAFE_INTEGER))
        );
    }

    #[test]
    fn test_handle_shape() {
        let handle = Handle::from_raw(3);
        let ty = ValueType::handle("MyNativeBinding");
        assert_eq!(
            ValueMarshaler::to_native(&ScriptValue::Handle(handle), &ty),
            Ok(NativeValue::Handle(handle))
        );
        assert!(matches!(
            ValueMarshaler::to_native(&ScriptValue::Integer(3), &ty),
            Err(MarshalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_objects_do_not_marshal_directly() {
        let value = NativeValue::Object(NativeObject::new(42u32));
        assert_eq!(
            ValueMarshaler::to_script(value),
            Err(MarshalError::UnboundObject)
        );
    }

    proptest! {
        #[test]
        fn bool_round_trip(b in any::<bool>()) {
            let script = ValueMarshaler::to_script(NativeValue::Bool(b)).unwrap();
            prop_assert_eq!(
                ValueMarshaler::to_native(&script, &ValueType::Boolean).unwrap(),
                NativeValue::Bool(b)
            );
        }

        #[test]
        fn number_round_trip(n in -1.0e300f64..1.0e300) {
            let script = ValueMarshaler::to_script(NativeValue::Number(n)).unwrap();
            prop_assert_eq!(
                ValueMarshaler::to_native(&script, &ValueType::Number).unwrap(),
                NativeValue::Number(n)
            );
        }

        #[test]
        fn string_round_trip(s in ".*") {
            let script = ValueMarshaler::to_script(NativeValue::String(s.clone())).unwrap();
            prop_assert_eq!(
                ValueMarshaler::to_native(&script, &ValueType::String).unwrap(),
                NativeValue::String(s)
            );
        }

        #[test]
        fn safe_integers_widen_exactly(i in -MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER) {
            let native = ValueMarshaler::to_native(&ScriptValue::Integer(i), &ValueType::Number).unwrap();
            prop_assert_eq!(native, NativeValue::Number(i as f64));
        }
    }
}

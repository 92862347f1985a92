//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use script_bridge::impl_default;
///
/// struct ScriptLimits {
///     max_scripts: u32,
///     entry_point: String,
/// }
///
/// impl_default!(ScriptLimits {
///     max_scripts: 16,
///     entry_point: "globalFunction".to_string(),
/// });
///
/// assert_eq!(ScriptLimits::default().max_scripts, 16);
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}

//! # KEYSTONE TYPE DEFINITIONS
//!
//! **CRITICAL**: Core value types shared by the injector, the strategies and the
//! conversion facility.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Boxed error carried as the cause of construction and conversion failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A value produced for one injection point, typed as the point's declared type.
pub type Value = Box<dyn Any + Send>;

/// A cached, shareable instance. Always downcasts to the concrete class.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// **RUNTIME TYPE IDENTITY**
///
/// **PURPOSE**: Stands in for a reflectable class: `TypeId` for identity and the
/// type name for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl TypeInfo {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Type name without module paths, used in error messages.
    pub fn short_name(&self) -> String {
        shorten(self.type_name)
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Dynamic type of a produced value (not of the box holding it).
pub(crate) fn value_type_id(value: &Value) -> TypeId {
    (**value).type_id()
}

fn shorten(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = String::new();
    for ch in name.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' => {
                out.push_str(last_path_segment(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(last_path_segment(&segment));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    #[test]
    fn test_type_info_identity() {
        assert_eq!(TypeInfo::of::<Widget>(), TypeInfo::of::<Widget>());
        assert_ne!(TypeInfo::of::<Widget>(), TypeInfo::of::<String>());
        assert!(TypeInfo::of::<String>().is::<String>());
    }

    #[test]
    fn test_short_name_strips_paths() {
        assert_eq!(TypeInfo::of::<Widget>().short_name(), "Widget");
        assert_eq!(
            TypeInfo::of::<Option<std::sync::Arc<Widget>>>().short_name(),
            "Option<Arc<Widget>>"
        );
    }

    #[test]
    fn test_value_type_id_sees_through_box() {
        let value: Value = Box::new(42i32);
        assert_eq!(value_type_id(&value), TypeId::of::<i32>());
    }
}

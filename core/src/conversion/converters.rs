//! # CONCRETE CONVERTER IMPLEMENTATIONS

use super::ParamConverter;
use crate::types::{BoxError, TypeInfo, Value};
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::str::FromStr;

type PrimitiveParse = fn(&str) -> Result<Value, BoxError>;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ConversionError(String);

// ================================================================================================
// PRIMITIVE CONVERTER - String, bool, char, integers and floats
// ================================================================================================

static PRIMITIVES: Lazy<HashMap<TypeId, PrimitiveParse>> = Lazy::new(|| {
    let mut table: HashMap<TypeId, PrimitiveParse> = HashMap::new();
    table.insert(TypeId::of::<String>(), parse_string);
    table.insert(TypeId::of::<bool>(), parse_bool);
    table.insert(TypeId::of::<char>(), parse_char);
    insert_from_str::<i8>(&mut table);
    insert_from_str::<i16>(&mut table);
    insert_from_str::<i32>(&mut table);
    insert_from_str::<i64>(&mut table);
    insert_from_str::<i128>(&mut table);
    insert_from_str::<isize>(&mut table);
    insert_from_str::<u8>(&mut table);
    insert_from_str::<u16>(&mut table);
    insert_from_str::<u32>(&mut table);
    insert_from_str::<u64>(&mut table);
    insert_from_str::<u128>(&mut table);
    insert_from_str::<usize>(&mut table);
    insert_from_str::<f32>(&mut table);
    insert_from_str::<f64>(&mut table);
    table
});

fn insert_from_str<T>(table: &mut HashMap<TypeId, PrimitiveParse>)
where
    T: FromStr + Send + 'static,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    table.insert(TypeId::of::<T>(), parse_from_str::<T>);
}

fn parse_from_str<T>(raw: &str) -> Result<Value, BoxError>
where
    T: FromStr + Send + 'static,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .map(|v| Box::new(v) as Value)
        .map_err(|e| Box::new(e) as BoxError)
}

fn parse_string(raw: &str) -> Result<Value, BoxError> {
    Ok(Box::new(raw.to_string()))
}

/// Lenient: only "true" (any case) is true.
fn parse_bool(raw: &str) -> Result<Value, BoxError> {
    Ok(Box::new(raw.trim().eq_ignore_ascii_case("true")))
}

fn parse_char(raw: &str) -> Result<Value, BoxError> {
    raw.chars()
        .next()
        .map(|c| Box::new(c) as Value)
        .ok_or_else(|| Box::new(ConversionError("empty value for char".to_string())) as BoxError)
}

/// **PRIMITIVE CONVERTER**
///
/// **PURPOSE**: Built-in conversions, consulted after registered converters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveConverter;

impl PrimitiveConverter {
    pub fn supports(target: TypeInfo) -> bool {
        PRIMITIVES.contains_key(&target.type_id)
    }
}

impl ParamConverter for PrimitiveConverter {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn convert(&self, raw: &str, target: TypeInfo) -> Option<Result<Value, BoxError>> {
        PRIMITIVES.get(&target.type_id).map(|parse| parse(raw))
    }
}

// ================================================================================================
// FN CONVERTER - closure-backed converter for one target type
// ================================================================================================

type ConvertFn<T> = dyn Fn(&str) -> Result<T, BoxError> + Send + Sync;

pub struct FnConverter<T> {
    name: &'static str,
    convert: Box<ConvertFn<T>>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> FnConverter<T> {
    pub fn new<F>(name: &'static str, convert: F) -> Self
    where
        F: Fn(&str) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            name,
            convert: Box::new(convert),
            _target: PhantomData,
        }
    }
}

impl<T: Send + 'static> ParamConverter for FnConverter<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn convert(&self, raw: &str, target: TypeInfo) -> Option<Result<Value, BoxError>> {
        if !target.is::<T>() {
            return None;
        }
        Some((self.convert)(raw).map(|v| Box::new(v) as Value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert<T: 'static>(raw: &str) -> Option<Result<Value, BoxError>> {
        PrimitiveConverter.convert(raw, TypeInfo::of::<T>())
    }

    #[test]
    fn test_integer_widths() {
        let value = convert::<u64>(" 42 ").unwrap().unwrap();
        assert_eq!(*value.downcast::<u64>().unwrap(), 42);
        assert!(convert::<i8>("128").unwrap().is_err());
    }

    #[test]
    fn test_bool_is_lenient() {
        let yes = convert::<bool>("True").unwrap().unwrap();
        assert!(*yes.downcast::<bool>().unwrap());
        let other = convert::<bool>("yes").unwrap().unwrap();
        assert!(!*other.downcast::<bool>().unwrap());
    }

    #[test]
    fn test_char_takes_first() {
        let value = convert::<char>("xyz").unwrap().unwrap();
        assert_eq!(*value.downcast::<char>().unwrap(), 'x');
        assert!(convert::<char>("").unwrap().is_err());
    }

    #[test]
    fn test_string_kept_verbatim() {
        let value = convert::<String>("  padded ").unwrap().unwrap();
        assert_eq!(*value.downcast::<String>().unwrap(), "  padded ");
    }

    #[test]
    fn test_unknown_type_declined() {
        struct Opaque;
        assert!(convert::<Opaque>("x").is_none());
        assert!(!PrimitiveConverter::supports(TypeInfo::of::<Opaque>()));
        assert!(PrimitiveConverter::supports(TypeInfo::of::<f32>()));
    }

    #[test]
    fn test_fn_converter_only_handles_its_type() {
        let converter = FnConverter::new("csv", |raw: &str| {
            Ok(raw.split(',').map(str::to_string).collect::<Vec<_>>())
        });
        assert!(converter
            .convert("a,b", TypeInfo::of::<String>())
            .is_none());
        let value = converter
            .convert("a,b", TypeInfo::of::<Vec<String>>())
            .unwrap()
            .unwrap();
        assert_eq!(*value.downcast::<Vec<String>>().unwrap(), vec!["a", "b"]);
    }
}

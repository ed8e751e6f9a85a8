//! # KEYSTONE CONVERSION MODULE
//!
//! **STRING-TO-TYPE CONVERSION FOR REQUEST PARAMETERS**
//!
//! Parameter strategies read raw strings (path segments, query values, headers,
//! cookies, form fields) and hand them to this module to obtain the declared
//! type of the injection point.
//!
//! ## CONVERSION ORDER
//!
//! 1. **REGISTERED CONVERTERS** - `ParamConverter`s added at setup, in order
//! 2. **PRIMITIVES** - `String`, `bool`, `char`, integer and float widths
//! 3. **FROM STR** - the point's own `FromStr` implementation
//! 4. **FAILURE** - `InjectError::Conversion`
//!
//! ## USAGE
//!
//! ```rust
//! use keystone::conversion::ParamConverters;
//!
//! let converters = ParamConverters::new();
//! let port: u16 = converters.convert_to("8080").unwrap();
//! assert_eq!(port, 8080);
//! ```

use crate::dependencies::ParseFn;
use crate::errors::InjectError;
use crate::types::{value_type_id, BoxError, TypeInfo, Value};
use std::sync::Arc;

pub mod converters;

pub use converters::{FnConverter, PrimitiveConverter};

/// **CORE CONVERTER TRAIT**
///
/// **GUARANTEE**: Returns `None` for targets it does not handle, so the next
/// converter in the chain gets a chance.
pub trait ParamConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn convert(&self, raw: &str, target: TypeInfo) -> Option<Result<Value, BoxError>>;
}

/// Ordered converter chain.
#[derive(Clone)]
pub struct ParamConverters {
    converters: Vec<Arc<dyn ParamConverter>>,
    primitives: PrimitiveConverter,
}

impl ParamConverters {
    pub fn new() -> Self {
        Self {
            converters: Vec::new(),
            primitives: PrimitiveConverter,
        }
    }

    pub fn register(&mut self, converter: Arc<dyn ParamConverter>) {
        self.converters.push(converter);
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Converts `raw` into a value of type `target`, trying `fallback` (the
    /// target's own string parser) after registered and primitive converters.
    pub(crate) fn convert(
        &self,
        raw: &str,
        target: TypeInfo,
        fallback: Option<ParseFn>,
    ) -> Result<Value, InjectError> {
        let attempt = self
            .converters
            .iter()
            .map(|c| c.as_ref() as &dyn ParamConverter)
            .chain(std::iter::once(&self.primitives as &dyn ParamConverter))
            .find_map(|c| c.convert(raw, target).map(|result| (c.name(), result)));

        let (converter, result) = match (attempt, fallback) {
            (Some(found), _) => found,
            (None, Some(parse)) => ("from-str", parse(raw)),
            (None, None) => {
                return Err(InjectError::Conversion {
                    value: raw.to_string(),
                    target: target.to_string(),
                    source: None,
                })
            }
        };

        let value = result.map_err(|source| InjectError::Conversion {
            value: raw.to_string(),
            target: target.to_string(),
            source: Some(source),
        })?;

        if value_type_id(&value) != target.type_id {
            return Err(InjectError::TypeMismatch {
                expected: target.to_string(),
                found: format!("value produced by the {} converter", converter),
            });
        }
        Ok(value)
    }

    /// The type-conversion facility as seen by collaborators.
    pub fn convert_to<T: 'static>(&self, raw: &str) -> Result<T, InjectError> {
        let value = self.convert(raw, TypeInfo::of::<T>(), None)?;
        value
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| InjectError::TypeMismatch {
                expected: TypeInfo::of::<T>().to_string(),
                found: "converted value".to_string(),
            })
    }
}

impl Default for ParamConverters {
    fn default() -> Self {
        Self::new()
    }
}

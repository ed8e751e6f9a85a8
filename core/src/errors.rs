use crate::dependencies::{Annotation, BindingKey};
use crate::types::BoxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("VALIDATION ERROR: {code} - {message}")]
    Validation { code: String, message: String },

    #[error("CONFIGURATION ERROR: {code} - {message}")]
    Configuration { code: String, message: String },

    #[error("INJECTION ERROR: {0}")]
    Injection(#[from] InjectError),
}

/// **INJECTION FAILURE**
///
/// Every resolution error surfaces as this one kind; the variant names the cause.
/// None of them are retried: they describe static configuration problems or a
/// failed constructor, and are fatal for the resolution call that raised them.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("{type_name} declares {count} @Inject constructors")]
    AmbiguousConstructor { type_name: String, count: usize },

    #[error("{type_name} has no @Inject constructor and no no-argument constructor")]
    NoViableConstructor { type_name: String },

    #[error("circular dependency: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<BindingKey> },

    #[error("multiple qualifiers on {point}: {annotations:?}")]
    ConflictingQualifiers {
        point: String,
        annotations: Vec<Annotation>,
    },

    #[error("multiple injection strategies claim {point}: {strategies:?}")]
    ConflictingStrategies {
        point: String,
        strategies: Vec<&'static str>,
    },

    #[error("{point} combines the {strategy} strategy with {annotation:?}")]
    ConflictingAnnotations {
        point: String,
        strategy: &'static str,
        annotation: Annotation,
    },

    #[error("{type_name} declares multiple scopes: {scopes:?}")]
    ConflictingScopes {
        type_name: String,
        scopes: Vec<Annotation>,
    },

    #[error("failed to construct {target}: {source}")]
    Construction {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("cannot convert {value:?} to {target}")]
    Conversion {
        value: String,
        target: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("no {source_kind} value named {name:?} for {point}")]
    MissingValue {
        point: String,
        source_kind: &'static str,
        name: String,
    },

    #[error("no binding registered for {key}")]
    Unbound { key: BindingKey },

    #[error("{point} ({type_name}) can only be supplied by an injection strategy, and none claims it")]
    Unresolvable { point: String, type_name: String },

    #[error("the {strategy} strategy cannot supply {point} of type {type_name}")]
    UnsupportedPoint {
        strategy: &'static str,
        point: String,
        type_name: String,
    },

    #[error("{target} requires an active request")]
    NoActiveRequest { target: String },

    #[error("no contextual object of type {type_name} in the current request")]
    ContextUnavailable { type_name: String },

    #[error("unknown persistence unit {name:?}")]
    UnknownPersistenceUnit { name: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("resolution depth {depth} exceeded while resolving {key}")]
    DepthExceeded { depth: usize, key: BindingKey },

    #[error("the injector has been closed")]
    ContainerClosed,
}

impl InjectError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AmbiguousConstructor { .. } => error_codes::AMBIGUOUS_CONSTRUCTOR,
            Self::NoViableConstructor { .. } => error_codes::NO_VIABLE_CONSTRUCTOR,
            Self::CircularDependency { .. } => error_codes::CIRCULAR_DEPENDENCY,
            Self::ConflictingQualifiers { .. } => error_codes::CONFLICTING_QUALIFIERS,
            Self::ConflictingStrategies { .. } => error_codes::CONFLICTING_STRATEGIES,
            Self::ConflictingAnnotations { .. } => error_codes::CONFLICTING_ANNOTATIONS,
            Self::ConflictingScopes { .. } => error_codes::CONFLICTING_SCOPES,
            Self::Construction { .. } => error_codes::CONSTRUCTION_FAILED,
            Self::Conversion { .. } => error_codes::CONVERSION_FAILED,
            Self::MissingValue { .. } => error_codes::MISSING_VALUE,
            Self::Unbound { .. } => error_codes::UNBOUND,
            Self::Unresolvable { .. } => error_codes::UNRESOLVABLE,
            Self::UnsupportedPoint { .. } => error_codes::UNSUPPORTED_POINT,
            Self::NoActiveRequest { .. } => error_codes::NO_ACTIVE_REQUEST,
            Self::ContextUnavailable { .. } => error_codes::CONTEXT_UNAVAILABLE,
            Self::UnknownPersistenceUnit { .. } => error_codes::UNKNOWN_PERSISTENCE_UNIT,
            Self::TypeMismatch { .. } => error_codes::TYPE_MISMATCH,
            Self::DepthExceeded { .. } => error_codes::DEPTH_EXCEEDED,
            Self::ContainerClosed => error_codes::CONTAINER_CLOSED,
        }
    }

    /// True for errors caused by the class graph or annotations rather than by
    /// request data or a failing constructor.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::AmbiguousConstructor { .. }
                | Self::NoViableConstructor { .. }
                | Self::CircularDependency { .. }
                | Self::ConflictingQualifiers { .. }
                | Self::ConflictingStrategies { .. }
                | Self::ConflictingAnnotations { .. }
                | Self::ConflictingScopes { .. }
                | Self::Unbound { .. }
                | Self::Unresolvable { .. }
                | Self::UnsupportedPoint { .. }
                | Self::UnknownPersistenceUnit { .. }
        )
    }
}

fn format_cycle(cycle: &[BindingKey]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Panic raised by a constructor body, kept as the cause of a construction failure.
#[derive(Debug, Error)]
#[error("constructor panicked: {message}")]
pub struct ConstructorPanic {
    pub message: String,
}

impl ConstructorPanic {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// **INJECTION ERROR CODES**
pub mod error_codes {
    pub const AMBIGUOUS_CONSTRUCTOR: &str = "RUST_CORE_INJECT_AMBIGUOUS_CONSTRUCTOR";
    pub const NO_VIABLE_CONSTRUCTOR: &str = "RUST_CORE_INJECT_NO_VIABLE_CONSTRUCTOR";
    pub const CIRCULAR_DEPENDENCY: &str = "RUST_CORE_INJECT_CIRCULAR_DEPENDENCY";
    pub const CONFLICTING_QUALIFIERS: &str = "RUST_CORE_INJECT_CONFLICTING_QUALIFIERS";
    pub const CONFLICTING_STRATEGIES: &str = "RUST_CORE_INJECT_CONFLICTING_STRATEGIES";
    pub const CONFLICTING_ANNOTATIONS: &str = "RUST_CORE_INJECT_CONFLICTING_ANNOTATIONS";
    pub const CONFLICTING_SCOPES: &str = "RUST_CORE_INJECT_CONFLICTING_SCOPES";
    pub const CONSTRUCTION_FAILED: &str = "RUST_CORE_INJECT_CONSTRUCTION_FAILED";
    pub const CONVERSION_FAILED: &str = "RUST_CORE_INJECT_CONVERSION_FAILED";
    pub const MISSING_VALUE: &str = "RUST_CORE_INJECT_MISSING_VALUE";
    pub const UNBOUND: &str = "RUST_CORE_INJECT_UNBOUND";
    pub const UNRESOLVABLE: &str = "RUST_CORE_INJECT_UNRESOLVABLE";
    pub const UNSUPPORTED_POINT: &str = "RUST_CORE_INJECT_UNSUPPORTED_POINT";
    pub const NO_ACTIVE_REQUEST: &str = "RUST_CORE_INJECT_NO_ACTIVE_REQUEST";
    pub const CONTEXT_UNAVAILABLE: &str = "RUST_CORE_INJECT_CONTEXT_UNAVAILABLE";
    pub const UNKNOWN_PERSISTENCE_UNIT: &str = "RUST_CORE_INJECT_UNKNOWN_PERSISTENCE_UNIT";
    pub const TYPE_MISMATCH: &str = "RUST_CORE_INJECT_TYPE_MISMATCH";
    pub const DEPTH_EXCEEDED: &str = "RUST_CORE_INJECT_DEPTH_EXCEEDED";
    pub const CONTAINER_CLOSED: &str = "RUST_CORE_INJECT_CONTAINER_CLOSED";

    pub const INVALID_CONFIG: &str = "RUST_CORE_CONFIG_INVALID";

    pub const INVALID_JSON_BODY: &str = "RUST_CORE_VALIDATION_INVALID_JSON";
    pub const INVALID_FORM_ENCODING: &str = "RUST_CORE_VALIDATION_INVALID_UTF8";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeInfo;

    #[test]
    fn test_cycle_message_lists_keys_in_order() {
        let err = InjectError::CircularDependency {
            cycle: vec![
                BindingKey::of::<String>(),
                BindingKey::of::<u32>(),
                BindingKey::of::<String>(),
            ],
        };
        assert_eq!(err.to_string(), "circular dependency: String -> u32 -> String");
        assert_eq!(err.code(), error_codes::CIRCULAR_DEPENDENCY);
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_construction_failure_keeps_cause() {
        let cause = ConstructorPanic {
            message: "boom".to_string(),
        };
        let err = InjectError::Construction {
            target: TypeInfo::of::<String>().to_string(),
            source: Box::new(cause),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(
            source.downcast_ref::<ConstructorPanic>().unwrap().message,
            "boom"
        );
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_project_error_wraps_injection() {
        let err: ProjectError = InjectError::ContainerClosed.into();
        assert_eq!(
            err.to_string(),
            "INJECTION ERROR: the injector has been closed"
        );
    }

    #[test]
    fn test_panic_payload_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(ConstructorPanic::from_payload(payload).message, "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(ConstructorPanic::from_payload(payload).message, "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(
            ConstructorPanic::from_payload(payload).message,
            "non-string panic payload"
        );
    }
}

use crate::dependencies::annotations::Annotation;
use crate::errors::InjectError;
use crate::types::TypeInfo;
use std::fmt;

/// Discriminator for otherwise identical types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Named(String),
    Custom(&'static str),
}

impl Qualifier {
    fn from_annotation(annotation: &Annotation) -> Option<Self> {
        match annotation {
            Annotation::Named(name) => Some(Self::Named(name.clone())),
            Annotation::Qualifier(name) => Some(Self::Custom(name)),
            _ => None,
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "@Named({:?})", name),
            Self::Custom(name) => write!(f, "@{}", name),
        }
    }
}

/// **BINDING KEY**
///
/// **PURPOSE**: Identity of "what is being requested": the raw type plus at most
/// one qualifier. Equality and hashing are structural, so two independently
/// built keys for "T named 'a'" are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    type_info: TypeInfo,
    qualifier: Option<Qualifier>,
}

impl BindingKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            qualifier: None,
        }
    }

    pub fn from_type(type_info: TypeInfo) -> Self {
        Self {
            type_info,
            qualifier: None,
        }
    }

    pub fn qualified(type_info: TypeInfo, qualifier: Qualifier) -> Self {
        Self {
            type_info,
            qualifier: Some(qualifier),
        }
    }

    /// Canonical key for an injection point. More than one qualifier-bearing
    /// annotation is a configuration error, never a silent pick.
    pub fn from_annotations(
        type_info: TypeInfo,
        annotations: &[Annotation],
    ) -> Result<Self, InjectError> {
        let qualifiers: Vec<&Annotation> =
            annotations.iter().filter(|a| a.is_qualifier()).collect();

        if qualifiers.len() > 1 {
            return Err(InjectError::ConflictingQualifiers {
                point: type_info.to_string(),
                annotations: qualifiers.into_iter().cloned().collect(),
            });
        }

        Ok(Self {
            type_info,
            qualifier: qualifiers.first().and_then(|a| Qualifier::from_annotation(a)),
        })
    }

    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// Same qualifier, different type. Used when a contract redirects to its class.
    pub(crate) fn retarget(&self, type_info: TypeInfo) -> Self {
        Self {
            type_info,
            qualifier: self.qualifier.clone(),
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{} {}", q, self.type_info),
            None => write!(f, "{}", self.type_info),
        }
    }
}

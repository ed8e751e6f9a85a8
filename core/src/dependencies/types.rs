use crate::dependencies::annotations::Annotation;
use crate::errors::InjectError;
use crate::types::TypeInfo;

/// Caching policy for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DependencyScope {
    Singleton,
    Request,
    #[default]
    Transient,
}

impl DependencyScope {
    /// Scope declared on a class. At most one scope annotation is allowed.
    pub fn from_annotations(
        type_info: TypeInfo,
        annotations: &[Annotation],
    ) -> Result<Self, InjectError> {
        let scoped: Vec<&Annotation> = annotations.iter().filter(|a| a.scope().is_some()).collect();
        match scoped.as_slice() {
            [] => Ok(Self::Transient),
            [one] => Ok(one.scope().unwrap_or_default()),
            _ => Err(InjectError::ConflictingScopes {
                type_name: type_info.to_string(),
                scopes: scoped.into_iter().cloned().collect(),
            }),
        }
    }

    pub fn is_cached(&self) -> bool {
        !matches!(self, Self::Transient)
    }
}

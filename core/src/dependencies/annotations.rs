use crate::dependencies::types::DependencyScope;

/// Declarative markers on a class, constructor parameter or field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Annotation {
    /// Designates the injection constructor.
    Inject,
    /// Built-in name qualifier.
    Named(String),
    /// A user-defined qualifier, identified by name.
    Qualifier(&'static str),
    Singleton,
    RequestScoped,
    Context,
    PathParam(String),
    QueryParam(String),
    HeaderParam(String),
    CookieParam(String),
    FormParam(String),
    BeanParam,
    /// Persistence unit name; empty selects the configured default unit.
    PersistenceContext(String),
    DefaultValue(String),
    /// Marker read by a third-party strategy.
    Custom { name: &'static str, value: String },
}

impl Annotation {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn path(name: impl Into<String>) -> Self {
        Self::PathParam(name.into())
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::QueryParam(name.into())
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::HeaderParam(name.into())
    }

    pub fn cookie(name: impl Into<String>) -> Self {
        Self::CookieParam(name.into())
    }

    pub fn form(name: impl Into<String>) -> Self {
        Self::FormParam(name.into())
    }

    pub fn default_value(value: impl Into<String>) -> Self {
        Self::DefaultValue(value.into())
    }

    pub fn persistence_context(unit: impl Into<String>) -> Self {
        Self::PersistenceContext(unit.into())
    }

    pub fn custom(name: &'static str, value: impl Into<String>) -> Self {
        Self::Custom {
            name,
            value: value.into(),
        }
    }

    pub fn is_qualifier(&self) -> bool {
        matches!(self, Self::Named(_) | Self::Qualifier(_))
    }

    /// Scope declared by this annotation, if it is a scope marker.
    pub fn scope(&self) -> Option<DependencyScope> {
        match self {
            Self::Singleton => Some(DependencyScope::Singleton),
            Self::RequestScoped => Some(DependencyScope::Request),
            _ => None,
        }
    }
}

/// Value of the first `@DefaultValue` in the list.
pub(crate) fn default_value(annotations: &[Annotation]) -> Option<&str> {
    annotations.iter().find_map(|a| match a {
        Annotation::DefaultValue(v) => Some(v.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifier_detection() {
        assert!(Annotation::named("a").is_qualifier());
        assert!(Annotation::Qualifier("Primary").is_qualifier());
        assert!(!Annotation::header("a").is_qualifier());
        assert!(!Annotation::Inject.is_qualifier());
    }

    #[test]
    fn test_scope_markers() {
        assert_eq!(Annotation::Singleton.scope(), Some(DependencyScope::Singleton));
        assert_eq!(Annotation::RequestScoped.scope(), Some(DependencyScope::Request));
        assert_eq!(Annotation::Context.scope(), None);
    }

    #[test]
    fn test_default_value_lookup() {
        let annotations = vec![Annotation::query("a"), Annotation::default_value("b")];
        assert_eq!(default_value(&annotations), Some("b"));
        assert_eq!(default_value(&[Annotation::query("a")]), None);
    }
}

use crate::dependencies::key::BindingKey;
use crate::dependencies::resolver::ResolverInner;
use crate::dependencies::Injectable;
use crate::errors::InjectError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// **DEFERRED RESOLUTION HANDLE**
///
/// Each `get()` runs a fresh resolution of `T`: transient classes yield a new
/// instance per call, cached scopes yield the cached one. Resolution happens
/// against the request active on the calling thread at `get()` time.
///
/// Holds the container weakly; once the last resolver handle is dropped,
/// `get()` fails with `ContainerClosed`.
pub struct Provider<T> {
    resolver: Weak<ResolverInner>,
    key: BindingKey,
    _target: PhantomData<fn() -> T>,
}

impl<T: Injectable> Provider<T> {
    pub(crate) fn new(resolver: &Arc<ResolverInner>, key: BindingKey) -> Self {
        Self {
            resolver: Arc::downgrade(resolver),
            key,
            _target: PhantomData,
        }
    }

    pub fn get(&self) -> Result<Arc<T>, InjectError> {
        let resolver = self
            .resolver
            .upgrade()
            .ok_or(InjectError::ContainerClosed)?;
        ResolverInner::get_keyed::<T>(&resolver, self.key.clone(), None)
    }

    pub fn key(&self) -> &BindingKey {
        &self.key
    }
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: Weak::clone(&self.resolver),
            key: self.key.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> PartialEq for Provider<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.resolver, &other.resolver)
    }
}

impl<T> Eq for Provider<T> {}

impl<T> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("key", &self.key.to_string())
            .field("live", &(self.resolver.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::DependencyResolver;

    #[derive(Default)]
    struct Widget;
    crate::injectable!(Widget);

    #[test]
    fn test_each_get_is_a_fresh_resolution() {
        let resolver = DependencyResolver::new();
        let provider = resolver.get_provider::<Widget>();
        let a = provider.get().unwrap();
        let b = provider.get().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_equality_by_container_and_key() {
        let resolver = DependencyResolver::new();
        let other = DependencyResolver::new();
        let a = resolver.get_provider::<Widget>();
        assert_eq!(a, a.clone());
        assert_eq!(a, resolver.get_provider::<Widget>());
        assert_ne!(a, other.get_provider::<Widget>());
        assert_eq!(a.key(), &BindingKey::of::<Widget>());
    }

    #[test]
    fn test_outliving_the_container() {
        let provider = {
            let resolver = DependencyResolver::new();
            resolver.get_provider::<Widget>()
        };
        assert!(matches!(provider.get(), Err(InjectError::ContainerClosed)));
    }
}

//! # CONTRACT REGISTRY
//!
//! **PURPOSE**: Setup-time registration of what the resolver builds. Bindings
//! are written here before the container serves anything; `build()` freezes
//! them and the resolver only ever reads them afterwards.

use crate::config::InjectorConfig;
use crate::conversion::{ParamConverter, ParamConverters};
use crate::dependencies::key::{BindingKey, Qualifier};
use crate::dependencies::descriptor::ValidateFn;
use crate::dependencies::resolver::{DependencyResolver, Resolution, ResolverInner, ResolverParts};
use crate::dependencies::strategies::{
    FnPersistenceUnit, InjectionStrategy, PersistenceContextStrategy, PersistenceUnit,
    StrategyRegistry,
};
use crate::dependencies::Injectable;
use crate::errors::{InjectError, ProjectError};
use crate::types::{BoxError, TypeInfo};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type ClassFn =
    Arc<dyn Fn(&Resolution<'_>, &BindingKey) -> Result<Box<dyn Any + Send>, InjectError> + Send + Sync>;

/// What a contract key resolves to. Both variants yield an `Arc<C>` boxed as `Any`.
#[derive(Clone)]
pub(crate) enum Binding {
    Instance(Arc<dyn Any + Send + Sync>),
    /// Built as `target`, which is validated through `validate`.
    Class {
        build: ClassFn,
        validate: ValidateFn,
        target: TypeInfo,
    },
}

/// **RESOLVER BUILDER**
///
/// ```rust
/// use keystone::dependencies::DependencyResolver;
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// #[derive(Default)]
/// struct English;
/// keystone::injectable!(English, singleton);
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// let resolver = DependencyResolver::builder()
///     .bind::<dyn Greeter, English, _>(|g| g as Arc<dyn Greeter>)
///     .build()
///     .unwrap();
/// assert_eq!(resolver.get_contract::<dyn Greeter>().unwrap().greet(), "hello");
/// ```
pub struct ResolverBuilder {
    config: InjectorConfig,
    contracts: HashMap<BindingKey, Binding>,
    strategies: Vec<Arc<dyn InjectionStrategy>>,
    converters: ParamConverters,
    units: HashMap<String, Arc<dyn PersistenceUnit>>,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self {
            config: InjectorConfig::default(),
            contracts: HashMap::new(),
            strategies: Vec::new(),
            converters: ParamConverters::new(),
            units: HashMap::new(),
        }
    }

    pub fn config(mut self, config: InjectorConfig) -> Self {
        self.config = config;
        self
    }

    /// When asked for contract `C`, construct class `I`. The instance is scoped
    /// and cached under `I`'s own key, so `I` and `C` share singletons.
    pub fn bind<C, I, F>(self, cast: F) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Injectable,
        F: Fn(Arc<I>) -> Arc<C> + Send + Sync + 'static,
    {
        self.insert(BindingKey::of::<C>(), class_binding::<C, I, F>(cast))
    }

    pub fn bind_qualified<C, I, F>(self, qualifier: Qualifier, cast: F) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Injectable,
        F: Fn(Arc<I>) -> Arc<C> + Send + Sync + 'static,
    {
        let key = BindingKey::qualified(TypeInfo::of::<C>(), qualifier);
        self.insert(key, class_binding::<C, I, F>(cast))
    }

    /// A fixed instance for `C`. Also overrides a concrete class's descriptor.
    pub fn bind_instance<C: ?Sized + Send + Sync + 'static>(self, instance: Arc<C>) -> Self {
        self.insert(BindingKey::of::<C>(), Binding::Instance(Arc::new(instance)))
    }

    pub fn bind_qualified_instance<C: ?Sized + Send + Sync + 'static>(
        self,
        qualifier: Qualifier,
        instance: Arc<C>,
    ) -> Self {
        let key = BindingKey::qualified(TypeInfo::of::<C>(), qualifier);
        self.insert(key, Binding::Instance(Arc::new(instance)))
    }

    /// Consulted after the built-in strategies, in registration order.
    pub fn strategy<S: InjectionStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Consulted before the built-in primitive conversions, in registration order.
    pub fn converter<P: ParamConverter + 'static>(mut self, converter: P) -> Self {
        self.converters.register(Arc::new(converter));
        self
    }

    pub fn persistence_unit<R, F>(mut self, name: impl Into<String>, open: F) -> Self
    where
        R: Send + 'static,
        F: Fn() -> Result<R, BoxError> + Send + Sync + 'static,
    {
        self.units
            .insert(name.into(), Arc::new(FnPersistenceUnit::new(open)));
        self
    }

    pub fn build(self) -> Result<DependencyResolver, ProjectError> {
        self.config.validate()?;
        Ok(DependencyResolver::from_parts(self.into_parts()))
    }

    /// Built-in strategies, then persistence context, then custom strategies.
    pub(crate) fn into_parts(self) -> ResolverParts {
        let mut strategies = StrategyRegistry::with_defaults();
        strategies.register(Arc::new(PersistenceContextStrategy::new(
            self.units,
            self.config.default_persistence_unit.clone(),
        )));
        for strategy in self.strategies {
            strategies.register(strategy);
        }

        ResolverParts {
            config: self.config,
            contracts: self.contracts,
            strategies,
            converters: self.converters,
        }
    }

    fn insert(mut self, key: BindingKey, binding: Binding) -> Self {
        if self.contracts.insert(key.clone(), binding).is_some() {
            log::warn!("Binding for {} registered twice; the later one wins", key);
        }
        self
    }
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn class_binding<C, I, F>(cast: F) -> Binding
where
    C: ?Sized + Send + Sync + 'static,
    I: Injectable,
    F: Fn(Arc<I>) -> Arc<C> + Send + Sync + 'static,
{
    let build: ClassFn = Arc::new(move |res: &Resolution<'_>, key: &BindingKey| {
        let instance = res.resolve::<I>(key.retarget(TypeInfo::of::<I>()))?;
        Ok(Box::new(cast(instance)) as Box<dyn Any + Send>)
    });
    Binding::Class {
        build,
        validate: ResolverInner::validate_class::<I>,
        target: TypeInfo::of::<I>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::FnConverter;

    trait Store: Send + Sync {
        fn label(&self) -> &'static str;
    }

    #[derive(Default)]
    struct MemoryStore;
    crate::injectable!(MemoryStore, singleton);

    impl Store for MemoryStore {
        fn label(&self) -> &'static str {
            "memory"
        }
    }

    struct FakeStore;

    impl Store for FakeStore {
        fn label(&self) -> &'static str {
            "fake"
        }
    }

    #[test]
    fn test_contract_shares_class_singleton() {
        let resolver = ResolverBuilder::new()
            .bind::<dyn Store, MemoryStore, _>(|s| s as Arc<dyn Store>)
            .build()
            .unwrap();
        let via_contract = resolver.get_contract::<dyn Store>().unwrap();
        let direct = resolver.get_instance::<MemoryStore>().unwrap();
        assert_eq!(via_contract.label(), "memory");
        assert_eq!(
            Arc::as_ptr(&via_contract) as *const u8,
            Arc::as_ptr(&direct) as *const u8
        );
        assert_eq!(resolver.singleton_count(), 1);
    }

    #[test]
    fn test_instance_binding_overrides() {
        let fake: Arc<dyn Store> = Arc::new(FakeStore);
        let resolver = ResolverBuilder::new()
            .bind::<dyn Store, MemoryStore, _>(|s| s as Arc<dyn Store>)
            .bind_instance::<dyn Store>(fake)
            .build()
            .unwrap();
        assert_eq!(resolver.get_contract::<dyn Store>().unwrap().label(), "fake");
    }

    #[test]
    fn test_instance_binding_for_concrete_class() {
        let pinned = Arc::new(MemoryStore);
        let resolver = ResolverBuilder::new()
            .bind_instance(Arc::clone(&pinned))
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(&resolver.get_instance::<MemoryStore>().unwrap(), &pinned));
    }

    #[test]
    fn test_qualified_bindings() {
        let resolver = ResolverBuilder::new()
            .bind_qualified::<dyn Store, MemoryStore, _>(Qualifier::Named("primary".into()), |s| {
                s as Arc<dyn Store>
            })
            .bind_qualified_instance::<dyn Store>(
                Qualifier::Named("fallback".into()),
                Arc::new(FakeStore),
            )
            .build()
            .unwrap();

        let primary = resolver
            .get_qualified_contract::<dyn Store>(Qualifier::Named("primary".into()))
            .unwrap();
        let fallback = resolver
            .get_qualified_contract::<dyn Store>(Qualifier::Named("fallback".into()))
            .unwrap();
        assert_eq!(primary.label(), "memory");
        assert_eq!(fallback.label(), "fake");
        assert!(matches!(
            resolver.get_contract::<dyn Store>(),
            Err(InjectError::Unbound { .. })
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = InjectorConfig {
            max_resolution_depth: 0,
            ..InjectorConfig::default()
        };
        assert!(matches!(
            ResolverBuilder::new().config(config).build(),
            Err(ProjectError::Configuration { .. })
        ));
    }

    #[test]
    fn test_strategies_and_converters_registered() {
        struct Nothing;

        impl InjectionStrategy for Nothing {
            fn name(&self) -> &'static str {
                "nothing"
            }

            fn claims(&self, _: &crate::dependencies::InjectionPoint) -> bool {
                false
            }

            fn build(
                &self,
                point: &crate::dependencies::InjectionPoint,
            ) -> Result<crate::dependencies::ValueFn, InjectError> {
                Err(InjectError::Unresolvable {
                    point: point.describe(),
                    type_name: point.declared_type().to_string(),
                })
            }
        }

        let resolver = ResolverBuilder::new()
            .strategy(Nothing)
            .converter(FnConverter::new("upper", |raw: &str| Ok(raw.to_uppercase())))
            .build()
            .unwrap();
        assert_eq!(resolver.converters().len(), 1);
        assert_eq!(resolver.converters().convert_to::<String>("a").unwrap(), "A");
        assert!(format!("{:?}", resolver).contains("nothing"));
    }
}

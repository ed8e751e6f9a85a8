use crate::config::InjectorConfig;
use crate::conversion::ParamConverters;
use crate::dependencies::annotations::Annotation;
use crate::dependencies::descriptor::Args;
use crate::dependencies::key::{BindingKey, Qualifier};
use crate::dependencies::plan::{ClassPlan, PreparedPoint};
use crate::dependencies::provider::Provider;
use crate::dependencies::registry::{Binding, ResolverBuilder};
use crate::dependencies::scope::{self, InstanceHook, RequestScope, RequestState, ScopeStore, StackGuard};
use crate::dependencies::strategies::StrategyRegistry;
use crate::dependencies::types::DependencyScope;
use crate::dependencies::Injectable;
use crate::errors::{ConstructorPanic, InjectError};
use crate::request::RequestContext;
use crate::types::{Instance, TypeInfo, Value};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static RESOLVER_COUNTER: AtomicU64 = AtomicU64::new(1);

type PlanCache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

pub(crate) struct ResolverInner {
    id: u64,
    config: InjectorConfig,
    contracts: HashMap<BindingKey, Binding>,
    strategies: StrategyRegistry,
    converters: ParamConverters,
    scopes: ScopeStore,
    plans: PlanCache,
    closed: AtomicBool,
}

/// Everything a built resolver is made of; the contract registry is frozen here.
pub(crate) struct ResolverParts {
    pub(crate) config: InjectorConfig,
    pub(crate) contracts: HashMap<BindingKey, Binding>,
    pub(crate) strategies: StrategyRegistry,
    pub(crate) converters: ParamConverters,
}

impl ResolverInner {
    fn new(parts: ResolverParts) -> Self {
        let id = RESOLVER_COUNTER.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Creating resolver {} ({} contracts, strategies {:?})",
            id,
            parts.contracts.len(),
            parts.strategies.names()
        );
        Self {
            id,
            config: parts.config,
            contracts: parts.contracts,
            strategies: parts.strategies,
            converters: parts.converters,
            scopes: ScopeStore::new(),
            plans: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Entry point for every public lookup. Without an explicit request, the
    /// request active on the calling thread (if any) is used.
    pub(crate) fn get_keyed<T: Injectable>(
        inner: &Arc<Self>,
        key: BindingKey,
        request: Option<Arc<RequestState>>,
    ) -> Result<Arc<T>, InjectError> {
        inner.ensure_open()?;
        let resolution = Resolution::new(inner, request);
        resolution.resolve::<T>(key)
    }

    fn ensure_open(&self) -> Result<(), InjectError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(InjectError::ContainerClosed);
        }
        Ok(())
    }

    fn plan<T: Injectable>(&self) -> Result<Arc<ClassPlan<T>>, InjectError> {
        let type_id = TypeId::of::<T>();
        let cached = self.plans.read().get(&type_id).cloned();
        let plan = match cached {
            Some(plan) => plan,
            None => {
                let compiled: Arc<dyn Any + Send + Sync> =
                    Arc::new(ClassPlan::<T>::compile(&self.strategies)?);
                Arc::clone(self.plans.write().entry(type_id).or_insert(compiled))
            }
        };
        plan.downcast::<ClassPlan<T>>()
            .map_err(|_| InjectError::TypeMismatch {
                expected: TypeInfo::of::<ClassPlan<T>>().to_string(),
                found: "plan cached for another type".to_string(),
            })
    }

    /// Checks everything `key` would construct without constructing it: plans
    /// compile, contracts are bound and no key repeats along a path. Provider
    /// points end a path, as they do at resolution time.
    pub(crate) fn validate_class<X: Injectable>(
        &self,
        key: BindingKey,
        walk: &mut GraphWalk,
    ) -> Result<(), InjectError> {
        if let Some(binding) = self.contracts.get(&key) {
            return self.validate_binding(binding, key, walk);
        }
        walk.visit(key, self.config.max_resolution_depth, |walk| {
            let plan = self.plan::<X>()?;
            let points = plan
                .params
                .iter()
                .chain(plan.fields.iter().map(|(_, point)| point));
            for point in points {
                if let Some((key, validate)) = point.dependency() {
                    validate(self, key.clone(), walk)?;
                }
            }
            Ok(())
        })
    }

    pub(crate) fn validate_contract(
        &self,
        key: BindingKey,
        walk: &mut GraphWalk,
    ) -> Result<(), InjectError> {
        match self.contracts.get(&key) {
            Some(binding) => self.validate_binding(binding, key, walk),
            None => Err(InjectError::Unbound { key }),
        }
    }

    fn validate_binding(
        &self,
        binding: &Binding,
        key: BindingKey,
        walk: &mut GraphWalk,
    ) -> Result<(), InjectError> {
        match binding {
            Binding::Instance(_) => Ok(()),
            Binding::Class {
                validate, target, ..
            } => validate(self, key.retarget(*target), walk),
        }
    }

    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let disposed = self.scopes.dispose_all();
        self.plans.write().clear();
        log::debug!("Closed resolver {} ({} disposal hooks run)", self.id, disposed);
        true
    }
}

/// Depth-first state of one eager validation: the keys on the current path and
/// the keys whose subgraph already checked out.
#[derive(Default)]
pub(crate) struct GraphWalk {
    path: Vec<BindingKey>,
    verified: HashSet<BindingKey>,
}

impl GraphWalk {
    fn visit(
        &mut self,
        key: BindingKey,
        max_depth: usize,
        below: impl FnOnce(&mut Self) -> Result<(), InjectError>,
    ) -> Result<(), InjectError> {
        if self.verified.contains(&key) {
            return Ok(());
        }
        if let Some(start) = self.path.iter().position(|entry| entry == &key) {
            let mut cycle = self.path[start..].to_vec();
            cycle.push(key);
            return Err(InjectError::CircularDependency { cycle });
        }
        if self.path.len() >= max_depth {
            return Err(InjectError::DepthExceeded {
                depth: max_depth,
                key,
            });
        }

        self.path.push(key.clone());
        below(self)?;
        self.path.pop();
        self.verified.insert(key);
        Ok(())
    }
}

impl Drop for ResolverInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// **RESOLUTION CALL**
///
/// One top-level lookup in flight: the container plus the request it resolves
/// against. Strategies receive it to reach request data and the converters.
pub struct Resolution<'a> {
    inner: &'a Arc<ResolverInner>,
    request: Option<Arc<RequestState>>,
}

impl<'a> Resolution<'a> {
    fn new(inner: &'a Arc<ResolverInner>, request: Option<Arc<RequestState>>) -> Self {
        let request = request.or_else(|| scope::active_request(inner.id));
        Self { inner, request }
    }

    /// Request data for `target`, failing when no request is active.
    pub fn request_context(&self, target: &str) -> Result<&RequestContext, InjectError> {
        self.request
            .as_deref()
            .map(RequestState::context)
            .ok_or_else(|| InjectError::NoActiveRequest {
                target: target.to_string(),
            })
    }

    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    pub fn converters(&self) -> &ParamConverters {
        &self.inner.converters
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.inner.config
    }

    /// Resolves class `X` under `key`, honoring contract overrides and scopes.
    pub fn resolve<X: Injectable>(&self, key: BindingKey) -> Result<Arc<X>, InjectError> {
        if let Some(bound) = self.bound::<X>(&key) {
            return bound;
        }
        let plan = self.inner.plan::<X>()?;
        self.construct(&plan, key)
    }

    /// Resolves a registered contract; an unregistered key is `Unbound`.
    pub fn resolve_contract<C: ?Sized + Send + Sync + 'static>(
        &self,
        key: &BindingKey,
    ) -> Result<Arc<C>, InjectError> {
        self.bound::<C>(key)
            .unwrap_or_else(|| Err(InjectError::Unbound { key: key.clone() }))
    }

    pub(crate) fn provider<X: Injectable>(&self, key: BindingKey) -> Provider<X> {
        Provider::new(self.inner, key)
    }

    fn bound<C: ?Sized + Send + Sync + 'static>(
        &self,
        key: &BindingKey,
    ) -> Option<Result<Arc<C>, InjectError>> {
        let mismatch = || InjectError::TypeMismatch {
            expected: TypeInfo::of::<Arc<C>>().to_string(),
            found: format!("binding registered for {}", key),
        };
        let binding = self.inner.contracts.get(key)?;
        log::trace!("Resolving {} through its registered binding", key);
        Some(match binding {
            Binding::Instance(instance) => instance
                .downcast_ref::<Arc<C>>()
                .cloned()
                .ok_or_else(mismatch),
            Binding::Class { build, .. } => build(self, key)
                .and_then(|value| value.downcast::<Arc<C>>().map(|v| *v).map_err(|_| mismatch())),
        })
    }

    fn construct<X: Injectable>(
        &self,
        plan: &ClassPlan<X>,
        key: BindingKey,
    ) -> Result<Arc<X>, InjectError> {
        match plan.scope {
            DependencyScope::Singleton => {
                if let Some(hit) = self.inner.scopes.get_singleton(&key) {
                    log::trace!("Singleton cache hit for {}", key);
                    return downcast_instance(hit);
                }
            }
            DependencyScope::Request => {
                let request = self.request.as_ref().ok_or_else(|| InjectError::NoActiveRequest {
                    target: key.to_string(),
                })?;
                if let Some(hit) = request.get_instance(&key) {
                    log::trace!("Request {} cache hit for {}", request.id(), key);
                    return downcast_instance(hit);
                }
            }
            DependencyScope::Transient => {}
        }

        let built = {
            let _guard = StackGuard::enter(self.inner.id, &key, self.inner.config.max_resolution_depth)?;
            log::trace!("Constructing {}", key);
            self.build(plan)?
        };
        let instance: Instance = Arc::new(built);

        let published = match plan.scope {
            DependencyScope::Singleton => {
                let hook = plan.dispose.clone().map(|dispose| {
                    Arc::new(move |instance: &Instance| {
                        if let Some(target) = instance.downcast_ref::<X>() {
                            dispose(target);
                        }
                    }) as InstanceHook
                });
                self.inner.scopes.put_singleton(key, instance, hook)?
            }
            DependencyScope::Request => match &self.request {
                Some(request) => request.put_instance(key, instance),
                None => instance,
            },
            DependencyScope::Transient => instance,
        };
        downcast_instance(published)
    }

    /// Constructor plus field injection. Nothing is published unless both succeed.
    fn build<X: Injectable>(&self, plan: &ClassPlan<X>) -> Result<X, InjectError> {
        let target = plan.type_info;
        let values = plan
            .params
            .iter()
            .map(|point| Ok((point.declared(), self.shielded(target, || self.produce(point))?)))
            .collect::<Result<Vec<_>, InjectError>>()?;

        let mut args = Args::new(values);
        let mut instance = self.shielded(target, || {
            plan.constructor
                .invoke(&mut args)
                .map_err(|source| InjectError::Construction {
                    target: target.to_string(),
                    source,
                })
        })?;

        for (field, point) in &plan.fields {
            self.shielded(target, || {
                let value = self.produce(point)?;
                field.assign(&mut instance, value)
            })?;
        }
        Ok(instance)
    }

    fn produce(&self, point: &PreparedPoint) -> Result<Value, InjectError> {
        match point {
            PreparedPoint::Strategy { produce, .. } => produce(self),
            PreparedPoint::Graph { key, resolve, .. } => resolve(self, key.clone()),
        }
    }

    /// Runs one injection step for `target` (a strategy, a converter, the
    /// constructor or a setter), reporting a panic as a construction failure
    /// when panic capture is configured.
    fn shielded<R>(
        &self,
        target: TypeInfo,
        step: impl FnOnce() -> Result<R, InjectError>,
    ) -> Result<R, InjectError> {
        if !self.inner.config.catch_constructor_panics {
            return step();
        }
        panic::catch_unwind(AssertUnwindSafe(step)).unwrap_or_else(|payload| {
            let panic = ConstructorPanic::from_payload(payload);
            log::error!("Injecting {} panicked: {}", target, panic.message);
            Err(InjectError::Construction {
                target: target.to_string(),
                source: Box::new(panic),
            })
        })
    }
}

fn downcast_instance<X: Send + Sync + 'static>(instance: Instance) -> Result<Arc<X>, InjectError> {
    instance.downcast::<X>().map_err(|_| InjectError::TypeMismatch {
        expected: TypeInfo::of::<X>().to_string(),
        found: "instance cached under the same key".to_string(),
    })
}

/// **DEPENDENCY RESOLVER**
///
/// **PURPOSE**: Resolve object graphs on demand and own their lifetimes.
/// **GUARANTEE**: Cheap to clone and safe to share; every clone is the same container.
///
/// ```rust
/// use keystone::dependencies::DependencyResolver;
/// use keystone::injectable;
///
/// #[derive(Default)]
/// struct Clock;
/// injectable!(Clock, singleton);
///
/// let resolver = DependencyResolver::new();
/// let a = resolver.get_instance::<Clock>().unwrap();
/// let b = resolver.get_instance::<Clock>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Clone)]
pub struct DependencyResolver {
    inner: Arc<ResolverInner>,
}

impl DependencyResolver {
    /// Default configuration, the built-in strategies and no contracts.
    pub fn new() -> Self {
        Self::from_parts(ResolverBuilder::new().into_parts())
    }

    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    pub(crate) fn from_parts(parts: ResolverParts) -> Self {
        Self {
            inner: Arc::new(ResolverInner::new(parts)),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.inner.config
    }

    /// The type-conversion facility used by parameter strategies.
    pub fn converters(&self) -> &ParamConverters {
        &self.inner.converters
    }

    pub fn get_instance<T: Injectable>(&self) -> Result<Arc<T>, InjectError> {
        ResolverInner::get_keyed::<T>(&self.inner, BindingKey::of::<T>(), None)
    }

    /// `T` under the qualifier carried by `annotations` (at most one).
    pub fn get_qualified<T: Injectable>(
        &self,
        annotations: &[Annotation],
    ) -> Result<Arc<T>, InjectError> {
        let key = BindingKey::from_annotations(TypeInfo::of::<T>(), annotations)?;
        ResolverInner::get_keyed::<T>(&self.inner, key, None)
    }

    pub fn get_named<T: Injectable>(&self, name: &str) -> Result<Arc<T>, InjectError> {
        let key = BindingKey::qualified(TypeInfo::of::<T>(), Qualifier::Named(name.to_string()));
        ResolverInner::get_keyed::<T>(&self.inner, key, None)
    }

    /// A contract registered with [`ResolverBuilder::bind`] or [`ResolverBuilder::bind_instance`].
    pub fn get_contract<C: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<C>, InjectError> {
        self.get_contract_keyed::<C>(BindingKey::of::<C>())
    }

    pub fn get_qualified_contract<C: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: Qualifier,
    ) -> Result<Arc<C>, InjectError> {
        self.get_contract_keyed::<C>(BindingKey::qualified(TypeInfo::of::<C>(), qualifier))
    }

    fn get_contract_keyed<C: ?Sized + Send + Sync + 'static>(
        &self,
        key: BindingKey,
    ) -> Result<Arc<C>, InjectError> {
        self.inner.ensure_open()?;
        Resolution::new(&self.inner, None).resolve_contract::<C>(&key)
    }

    /// Lazy handle; nothing about `T` is checked until the first `get()`.
    pub fn get_provider<T: Injectable>(&self) -> Provider<T> {
        Provider::new(&self.inner, BindingKey::of::<T>())
    }

    /// Like [`get_provider`](Self::get_provider), but first validates the whole
    /// graph below `T` (constructor selection, strategy arbitration, contract
    /// bindings, cycles) so configuration errors surface here. `Provider`
    /// points are not followed.
    pub fn resolve<T: Injectable>(&self) -> Result<Provider<T>, InjectError> {
        self.inner.ensure_open()?;
        let key = BindingKey::of::<T>();
        self.inner
            .validate_class::<T>(key.clone(), &mut GraphWalk::default())?;
        Ok(Provider::new(&self.inner, key))
    }

    /// Activates a fresh request cache for the calling thread.
    pub fn begin_request(&self, context: RequestContext) -> RequestScope {
        RequestScope::begin(self.clone(), context)
    }

    pub fn end_request(&self, scope: RequestScope) {
        scope.end();
    }

    /// Runs singleton disposal hooks and refuses further resolutions. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn singleton_count(&self) -> usize {
        self.inner.scopes.singleton_count()
    }

    pub(crate) fn get_in_request<T: Injectable>(
        &self,
        key: BindingKey,
        request: Arc<RequestState>,
    ) -> Result<Arc<T>, InjectError> {
        ResolverInner::get_keyed::<T>(&self.inner, key, Some(request))
    }

    #[cfg(test)]
    pub(crate) fn with_resolution<R>(&self, f: impl FnOnce(&Resolution<'_>) -> R) -> R {
        f(&Resolution::new(&self.inner, None))
    }

    #[cfg(test)]
    pub(crate) fn stack_depth(&self) -> usize {
        scope::stack_depth(self.inner.id)
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("id", &self.inner.id)
            .field("contracts", &self.inner.contracts.len())
            .field("strategies", &self.inner.strategies)
            .field("singletons", &self.singleton_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

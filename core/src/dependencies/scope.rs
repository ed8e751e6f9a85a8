//! # SCOPE AND LIFECYCLE STORE
//!
//! **PURPOSE**: Where constructed instances live.
//!
//! - **SINGLETON CACHE** - one per container, shared by every thread, write-once per key
//! - **REQUEST CACHE** - one per in-flight request, discarded when the request ends
//! - **RESOLUTION STACK** - keys under construction on the calling thread, per container
//!
//! The active request and the resolution stack are thread-local and keyed by
//! container id, so two containers driven from one thread stay independent.

use crate::dependencies::key::BindingKey;
use crate::dependencies::resolver::DependencyResolver;
use crate::dependencies::Injectable;
use crate::errors::{ConstructorPanic, InjectError};
use crate::request::RequestContext;
use crate::types::Instance;
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Disposal hook for a cached singleton, already bound to its concrete type.
pub(crate) type InstanceHook = Arc<dyn Fn(&Instance) + Send + Sync>;

struct Disposal {
    key: BindingKey,
    instance: Instance,
    hook: InstanceHook,
}

impl Disposal {
    fn run(&self) {
        let hook = &self.hook;
        let instance = &self.instance;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(instance))) {
            log::error!(
                "Disposal hook for {} panicked: {}",
                self.key,
                ConstructorPanic::from_payload(payload).message
            );
        }
    }
}

#[derive(Default)]
struct SingletonCache {
    entries: HashMap<BindingKey, Instance>,
    disposals: Vec<Disposal>,
    /// Set by `dispose_all`; nothing is published afterwards.
    closed: bool,
}

/// Process-lifetime instance store.
#[derive(Default)]
pub(crate) struct ScopeStore {
    singletons: RwLock<SingletonCache>,
}

impl ScopeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get_singleton(&self, key: &BindingKey) -> Option<Instance> {
        self.singletons.read().entries.get(key).cloned()
    }

    /// Publishes `instance` unless another thread got there first, and returns
    /// whichever instance is now cached. Once the store is disposed, the
    /// instance is disposed on the spot and `ContainerClosed` is returned.
    pub(crate) fn put_singleton(
        &self,
        key: BindingKey,
        instance: Instance,
        hook: Option<InstanceHook>,
    ) -> Result<Instance, InjectError> {
        let mut cache = self.singletons.write();
        if cache.closed {
            drop(cache);
            log::debug!("Singleton {} finished after close; disposing it", key);
            if let Some(hook) = hook {
                Disposal {
                    key,
                    instance,
                    hook,
                }
                .run();
            }
            return Err(InjectError::ContainerClosed);
        }
        if let Some(existing) = cache.entries.get(&key) {
            log::warn!(
                "Singleton {} was constructed concurrently; discarding the later instance",
                key
            );
            return Ok(Arc::clone(existing));
        }
        if let Some(hook) = hook {
            cache.disposals.push(Disposal {
                key: key.clone(),
                instance: Arc::clone(&instance),
                hook,
            });
        }
        cache.entries.insert(key, Arc::clone(&instance));
        Ok(instance)
    }

    pub(crate) fn singleton_count(&self) -> usize {
        self.singletons.read().entries.len()
    }

    /// Empties the cache and runs disposal hooks, newest first. Returns the
    /// number of hooks run.
    pub(crate) fn dispose_all(&self) -> usize {
        let cache = {
            let mut guard = self.singletons.write();
            let cache = std::mem::take(&mut *guard);
            guard.closed = true;
            cache
        };
        let count = cache.disposals.len();
        for disposal in cache.disposals.iter().rev() {
            disposal.run();
        }
        count
    }
}

/// Request-lifetime instance store plus the request data strategies read.
pub(crate) struct RequestState {
    id: u64,
    context: RequestContext,
    instances: Mutex<HashMap<BindingKey, Instance>>,
}

impl RequestState {
    pub(crate) fn new(context: RequestContext) -> Self {
        Self {
            id: REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed),
            context,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn context(&self) -> &RequestContext {
        &self.context
    }

    pub(crate) fn get_instance(&self, key: &BindingKey) -> Option<Instance> {
        self.instances.lock().get(key).cloned()
    }

    /// First writer wins, as for singletons.
    pub(crate) fn put_instance(&self, key: BindingKey, instance: Instance) -> Instance {
        Arc::clone(self.instances.lock().entry(key).or_insert(instance))
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    fn clear(&self) -> usize {
        let mut instances = self.instances.lock();
        let count = instances.len();
        instances.clear();
        count
    }
}

thread_local! {
    static ACTIVE_REQUESTS: RefCell<HashMap<u64, Vec<Arc<RequestState>>>> = RefCell::new(HashMap::new());
    static RESOLUTION_STACKS: RefCell<HashMap<u64, Vec<BindingKey>>> = RefCell::new(HashMap::new());
}

fn activate(container: u64, state: Arc<RequestState>) {
    ACTIVE_REQUESTS.with(|active| {
        active.borrow_mut().entry(container).or_default().push(state);
    });
}

fn deactivate(container: u64, request: u64) {
    // Ignored during thread teardown.
    let _ = ACTIVE_REQUESTS.try_with(|active| {
        let mut active = active.borrow_mut();
        if let Some(requests) = active.get_mut(&container) {
            requests.retain(|state| state.id() != request);
            if requests.is_empty() {
                active.remove(&container);
            }
        }
    });
}

/// Innermost request activated on this thread for `container`.
pub(crate) fn active_request(container: u64) -> Option<Arc<RequestState>> {
    ACTIVE_REQUESTS.with(|active| {
        active
            .borrow()
            .get(&container)
            .and_then(|requests| requests.last().cloned())
    })
}

/// Depth of the calling thread's resolution stack for `container`.
#[cfg(test)]
pub(crate) fn stack_depth(container: u64) -> usize {
    RESOLUTION_STACKS.with(|stacks| stacks.borrow().get(&container).map_or(0, Vec::len))
}

/// **RESOLUTION STACK ENTRY**
///
/// Pushes a key on entry and pops it on drop, so error returns and unwinding
/// constructors leave the stack as they found it.
pub(crate) struct StackGuard {
    container: u64,
}

impl StackGuard {
    pub(crate) fn enter(
        container: u64,
        key: &BindingKey,
        max_depth: usize,
    ) -> Result<Self, InjectError> {
        RESOLUTION_STACKS.with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let stack = stacks.entry(container).or_default();

            if let Some(start) = stack.iter().position(|entry| entry == key) {
                let mut cycle = stack[start..].to_vec();
                cycle.push(key.clone());
                return Err(InjectError::CircularDependency { cycle });
            }
            if stack.len() >= max_depth {
                return Err(InjectError::DepthExceeded {
                    depth: max_depth,
                    key: key.clone(),
                });
            }

            stack.push(key.clone());
            Ok(Self { container })
        })
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        let _ = RESOLUTION_STACKS.try_with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            if let Some(stack) = stacks.get_mut(&self.container) {
                stack.pop();
                if stack.is_empty() {
                    stacks.remove(&self.container);
                }
            }
        });
    }
}

/// **REQUEST SCOPE HANDLE**
///
/// Returned by [`DependencyResolver::begin_request`]. While it is alive the
/// request is active on the thread that began it; ending or dropping it
/// discards the request cache and restores whichever request was active before.
/// Not `Send`: it must end on the thread it was begun on.
pub struct RequestScope {
    resolver: DependencyResolver,
    state: Arc<RequestState>,
    ended: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl RequestScope {
    pub(crate) fn begin(resolver: DependencyResolver, context: RequestContext) -> Self {
        let state = Arc::new(RequestState::new(context));
        activate(resolver.id(), Arc::clone(&state));
        log::debug!("Began request {} on container {}", state.id(), resolver.id());
        Self {
            resolver,
            state,
            ended: false,
            _thread_bound: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id()
    }

    pub fn context(&self) -> &RequestContext {
        self.state.context()
    }

    /// Resolves `T` against this request, whichever request is currently active.
    pub fn get_instance<T: Injectable>(&self) -> Result<Arc<T>, InjectError> {
        self.resolver
            .get_in_request::<T>(BindingKey::of::<T>(), Arc::clone(&self.state))
    }

    /// Number of request-scoped instances cached so far.
    pub fn instance_count(&self) -> usize {
        self.state.instance_count()
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        deactivate(self.resolver.id(), self.state.id());
        let discarded = self.state.clear();
        log::debug!(
            "Ended request {} on container {} ({} request instances discarded)",
            self.state.id(),
            self.resolver.id(),
            discarded
        );
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.state.id())
            .field("container", &self.resolver.id())
            .field("ended", &self.ended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::HttpRequest;

    struct Service;

    fn instance(value: u32) -> Instance {
        Arc::new(value)
    }

    fn context() -> RequestContext {
        RequestContext::new(HttpRequest::get("/"))
    }

    #[test]
    fn test_singleton_first_writer_wins() {
        let store = ScopeStore::new();
        let key = BindingKey::of::<Service>();
        let first = store.put_singleton(key.clone(), instance(1), None).unwrap();
        let second = store.put_singleton(key.clone(), instance(2), None).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let cached = store.get_singleton(&key).unwrap();
        assert_eq!(cached.downcast_ref::<u32>(), Some(&1));
        assert_eq!(store.singleton_count(), 1);
    }

    #[test]
    fn test_dispose_runs_newest_first() {
        let store = ScopeStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for value in 0..3u32 {
            let order = Arc::clone(&order);
            let hook: InstanceHook = Arc::new(move |inst: &Instance| {
                order.lock().push(*inst.downcast_ref::<u32>().unwrap());
            });
            let key = BindingKey::qualified(
                crate::types::TypeInfo::of::<Service>(),
                crate::dependencies::Qualifier::Named(value.to_string()),
            );
            store.put_singleton(key, instance(value), Some(hook)).unwrap();
        }

        assert_eq!(store.dispose_all(), 3);
        assert_eq!(*order.lock(), vec![2, 1, 0]);
        assert_eq!(store.singleton_count(), 0);
    }

    #[test]
    fn test_panicking_hook_does_not_stop_disposal() {
        let store = ScopeStore::new();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        store
            .put_singleton(
                BindingKey::of::<u32>(),
                instance(1),
                Some(Arc::new(move |_: &Instance| *flag.lock() = true)),
            )
            .unwrap();
        store
            .put_singleton(
                BindingKey::of::<u64>(),
                instance(2),
                Some(Arc::new(|_: &Instance| panic!("dispose failed"))),
            )
            .unwrap();

        assert_eq!(store.dispose_all(), 2);
        assert!(*ran.lock());
    }

    #[test]
    fn test_publish_after_dispose_is_refused() {
        let store = ScopeStore::new();
        assert_eq!(store.dispose_all(), 0);

        let disposed = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&disposed);
        let hook: InstanceHook = Arc::new(move |inst: &Instance| {
            seen.lock().push(*inst.downcast_ref::<u32>().unwrap());
        });
        let result = store.put_singleton(BindingKey::of::<Service>(), instance(5), Some(hook));

        assert!(matches!(result, Err(InjectError::ContainerClosed)));
        assert_eq!(*disposed.lock(), vec![5]);
        assert_eq!(store.singleton_count(), 0);
        assert_eq!(store.dispose_all(), 0);
    }

    #[test]
    fn test_request_cache_first_writer_wins() {
        let state = RequestState::new(context());
        let key = BindingKey::of::<Service>();
        let first = state.put_instance(key.clone(), instance(1));
        let second = state.put_instance(key.clone(), instance(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.instance_count(), 1);
        assert_eq!(state.clear(), 1);
        assert!(state.get_instance(&key).is_none());
    }

    #[test]
    fn test_stack_guard_detects_cycle() {
        let container = 9_001;
        let a = BindingKey::of::<u8>();
        let b = BindingKey::of::<u16>();

        let _outer = StackGuard::enter(container, &a, 16).unwrap();
        let inner = StackGuard::enter(container, &b, 16).unwrap();
        match StackGuard::enter(container, &a, 16) {
            Err(InjectError::CircularDependency { cycle }) => {
                assert_eq!(cycle, vec![a.clone(), b.clone(), a.clone()]);
            }
            _ => panic!("expected a cycle"),
        }
        assert_eq!(stack_depth(container), 2);
        drop(inner);
        assert_eq!(stack_depth(container), 1);
    }

    #[test]
    fn test_stack_guard_depth_limit() {
        let container = 9_002;
        let _a = StackGuard::enter(container, &BindingKey::of::<u8>(), 2).unwrap();
        let _b = StackGuard::enter(container, &BindingKey::of::<u16>(), 2).unwrap();
        let result = StackGuard::enter(container, &BindingKey::of::<u32>(), 2);
        assert!(matches!(result, Err(InjectError::DepthExceeded { depth: 2, .. })));
    }

    #[test]
    fn test_stacks_are_per_container() {
        let key = BindingKey::of::<u8>();
        let _first = StackGuard::enter(9_003, &key, 4).unwrap();
        assert!(StackGuard::enter(9_004, &key, 4).is_ok());
    }

    #[test]
    fn test_activation_nests_and_restores() {
        let container = 9_005;
        let outer = Arc::new(RequestState::new(context()));
        let inner = Arc::new(RequestState::new(context()));

        activate(container, Arc::clone(&outer));
        activate(container, Arc::clone(&inner));
        assert_eq!(active_request(container).unwrap().id(), inner.id());

        deactivate(container, inner.id());
        assert_eq!(active_request(container).unwrap().id(), outer.id());
        deactivate(container, outer.id());
        assert!(active_request(container).is_none());
    }
}

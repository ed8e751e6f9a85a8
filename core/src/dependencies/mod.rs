//! # KEYSTONE DEPENDENCY INJECTION
//!
//! **RESOLVE OBJECT GRAPHS ON DEMAND**
//!
//! ## COMPONENTS
//!
//! - **DESCRIPTORS** - what a type needs: constructors, fields, scope
//! - **BINDING KEYS** - type plus at most one qualifier
//! - **STRATEGIES** - request-bound sources for individual injection points
//! - **RESOLVER** - constructor selection, recursion, cycle detection, publishing
//! - **SCOPES** - singleton and per-request caches, request lifecycle
//! - **REGISTRY** - contract bindings fixed before the container serves

pub mod annotations;
pub mod descriptor;
pub mod key;
mod plan;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod strategies;
pub mod types;

pub use annotations::Annotation;
pub use descriptor::{Args, ClassDescriptor, Constructor, Field, Injectable, InjectionPoint};
pub use key::{BindingKey, Qualifier};
pub use provider::Provider;
pub use registry::ResolverBuilder;
pub use resolver::{DependencyResolver, Resolution};
pub use scope::RequestScope;
pub use strategies::{
    BeanStrategy, ContextStrategy, FnPersistenceUnit, InjectionStrategy, ParamSource,
    ParamStrategy, PersistenceContextStrategy, PersistenceUnit, StrategyRegistry, ValueFn,
};
pub use types::DependencyScope;

pub(crate) use descriptor::ParseFn;

//! # KEYSTONE CORE LIBRARY
//!
//! **DEPENDENCY INJECTION FOR REQUEST-PER-THREAD WEB SERVICES**
//!
//! **ARCHITECTURE**: Descriptor-driven graph resolution with pluggable injection strategies
//! **GUARANTEE**: Cycles are rejected, never recursed into; nothing half-built is ever cached
//! **SCOPES**: Transient, process-wide singleton, and per-request instances
//!
//! ```rust
//! use keystone::api::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Counter;
//! keystone::injectable!(Counter, singleton);
//!
//! struct Greeting {
//!     counter: Arc<Counter>,
//!     name: String,
//! }
//!
//! impl Injectable for Greeting {
//!     fn descriptor() -> ClassDescriptor<Self> {
//!         ClassDescriptor::new().constructor(
//!             Constructor::inject(|args| {
//!                 Ok(Greeting {
//!                     counter: args.next()?,
//!                     name: args.next()?,
//!                 })
//!             })
//!             .param(InjectionPoint::of::<Counter>())
//!             .param(InjectionPoint::param::<String>().annotate(Annotation::query("name"))),
//!         )
//!     }
//! }
//!
//! let resolver = DependencyResolver::new();
//! let scope = resolver.begin_request(RequestContext::new(HttpRequest::get("/hello?name=ada")));
//! let greeting = resolver.get_instance::<Greeting>().unwrap();
//! assert_eq!(greeting.name, "ada");
//! assert!(Arc::ptr_eq(&greeting.counter, &resolver.get_instance::<Counter>().unwrap()));
//! resolver.end_request(scope);
//! ```

pub mod api;
pub mod config;
pub mod conversion;
pub mod dependencies;
pub mod errors;
pub mod request;
pub mod types;

pub use crate::config::InjectorConfig;
pub use crate::conversion::{FnConverter, ParamConverter, ParamConverters};
pub use crate::dependencies::{
    Annotation, Args, BindingKey, ClassDescriptor, Constructor, DependencyResolver,
    DependencyScope, Field, Injectable, InjectionPoint, InjectionStrategy, Provider, Qualifier,
    RequestScope, ResolverBuilder,
};
pub use crate::errors::{InjectError, ProjectError};
pub use crate::request::{HttpMethod, HttpRequest, MultipartPart, RequestBody, RequestContext, UriInfo};
pub use crate::types::{BoxError, TypeInfo};

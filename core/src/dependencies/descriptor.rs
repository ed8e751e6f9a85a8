//! # CLASS DESCRIPTORS
//!
//! **PURPOSE**: The runtime metadata the resolver walks in place of reflection.
//! Each injectable type describes its scope annotations, its constructors and
//! its injectable fields; every constructor parameter and field is an
//! [`InjectionPoint`] whose builder fixes the Rust type the constructor or
//! setter receives.
//!
//! ```rust,ignore
//! struct Greeter {
//!     counter: Arc<Counter>,
//!     language: String,
//! }
//!
//! impl Injectable for Greeter {
//!     fn descriptor() -> ClassDescriptor<Self> {
//!         ClassDescriptor::new()
//!             .singleton()
//!             .constructor(
//!                 Constructor::inject(|args| {
//!                     Ok(Greeter {
//!                         counter: args.next()?,
//!                         language: String::new(),
//!                     })
//!                 })
//!                 .param(InjectionPoint::of::<Counter>()),
//!             )
//!             .field(Field::new(
//!                 "language",
//!                 InjectionPoint::param::<String>().annotate(Annotation::header("Accept-Language")),
//!                 |g: &mut Greeter, v| g.language = v,
//!             ))
//!     }
//! }
//! ```

use crate::dependencies::annotations::Annotation;
use crate::dependencies::key::BindingKey;
use crate::dependencies::provider::Provider;
use crate::dependencies::resolver::{GraphWalk, Resolution, ResolverInner};
use crate::errors::InjectError;
use crate::types::{BoxError, TypeInfo, Value};
use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

pub(crate) type GraphFn = fn(&Resolution<'_>, BindingKey) -> Result<Value, InjectError>;
pub(crate) type ParseFn = fn(&str) -> Result<Value, BoxError>;
pub(crate) type WrapFn = fn(Option<Value>) -> Result<Option<Value>, InjectError>;
/// Checks the graph below a key without constructing anything.
pub(crate) type ValidateFn = fn(&ResolverInner, BindingKey, &mut GraphWalk) -> Result<(), InjectError>;

/// A type the injector can construct.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn descriptor() -> ClassDescriptor<Self>;
}

/// How a point may be satisfied when no strategy claims it.
#[derive(Clone, Copy)]
pub(crate) enum PointKind {
    /// `Arc<X>` through the graph.
    Class(GraphFn, ValidateFn),
    /// `Arc<C>` through the contract registry.
    Contract(GraphFn, ValidateFn),
    /// `Provider<X>`, a deferred graph resolution.
    Provider(GraphFn),
    /// String-convertible value, `T` or `Option<T>`.
    Param { parse: ParseFn, wrap: WrapFn },
    /// Only a strategy can supply it.
    Value,
}

/// **INJECTION POINT**
///
/// A constructor parameter or field: declared type, annotations, and the
/// capabilities its declared type offers to the resolver.
#[derive(Clone)]
pub struct InjectionPoint {
    name: Cow<'static, str>,
    owner: &'static str,
    declared: TypeInfo,
    element: TypeInfo,
    annotations: Vec<Annotation>,
    pub(crate) kind: PointKind,
}

impl InjectionPoint {
    fn with_kind(declared: TypeInfo, element: TypeInfo, kind: PointKind) -> Self {
        Self {
            name: Cow::Borrowed(""),
            owner: "",
            declared,
            element,
            annotations: Vec::new(),
            kind,
        }
    }

    /// `Arc<X>`, resolved through the graph unless a strategy claims the point.
    pub fn of<X: Injectable>() -> Self {
        Self::with_kind(
            TypeInfo::of::<Arc<X>>(),
            TypeInfo::of::<X>(),
            PointKind::Class(resolve_class::<X>, ResolverInner::validate_class::<X>),
        )
    }

    /// `Arc<C>` for a contract registered with `ResolverBuilder::bind`.
    pub fn contract<C: ?Sized + Send + Sync + 'static>() -> Self {
        Self::with_kind(
            TypeInfo::of::<Arc<C>>(),
            TypeInfo::of::<C>(),
            PointKind::Contract(resolve_contract::<C>, ResolverInner::validate_contract),
        )
    }

    /// `Provider<X>`: resolves `X` afresh on every `get()`.
    pub fn provider<X: Injectable>() -> Self {
        Self::with_kind(
            TypeInfo::of::<Provider<X>>(),
            TypeInfo::of::<X>(),
            PointKind::Provider(build_provider::<X>),
        )
    }

    /// `T`, converted from a request parameter. A missing value is an error.
    pub fn param<T>() -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        Self::with_kind(
            TypeInfo::of::<T>(),
            TypeInfo::of::<T>(),
            PointKind::Param {
                parse: parse_value::<T>,
                wrap: wrap_required,
            },
        )
    }

    /// `Option<T>`, converted from a request parameter. A missing value is `None`.
    pub fn optional<T>() -> Self
    where
        T: FromStr + Send + 'static,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        Self::with_kind(
            TypeInfo::of::<Option<T>>(),
            TypeInfo::of::<T>(),
            PointKind::Param {
                parse: parse_value::<T>,
                wrap: wrap_optional::<T>,
            },
        )
    }

    /// `V`, supplied by a strategy only (contextual objects, parts, resources).
    pub fn value<V: Send + 'static>() -> Self {
        Self::with_kind(TypeInfo::of::<V>(), TypeInfo::of::<V>(), PointKind::Value)
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// The type handed to the constructor or setter.
    pub fn declared_type(&self) -> TypeInfo {
        self.declared
    }

    /// The type looked up in the graph or produced by conversion.
    pub fn element_type(&self) -> TypeInfo {
        self.element
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn has_annotation(&self, predicate: impl Fn(&Annotation) -> bool) -> bool {
        self.annotations.iter().any(predicate)
    }

    /// `Owner.name` for diagnostics.
    pub fn describe(&self) -> String {
        let owner = short_owner(self.owner);
        match (owner.is_empty(), self.name.is_empty()) {
            (true, true) => self.declared.to_string(),
            (true, false) => self.name.to_string(),
            (false, true) => format!("{}.<{}>", owner, self.declared),
            (false, false) => format!("{}.{}", owner, self.name),
        }
    }

    pub(crate) fn graph_fn(&self) -> Option<GraphFn> {
        match self.kind {
            PointKind::Class(f, _) | PointKind::Contract(f, _) | PointKind::Provider(f) => Some(f),
            PointKind::Param { .. } | PointKind::Value => None,
        }
    }

    /// Providers resolve on `get()`, so they contribute no edge to validate.
    pub(crate) fn validate_fn(&self) -> Option<ValidateFn> {
        match self.kind {
            PointKind::Class(_, v) | PointKind::Contract(_, v) => Some(v),
            PointKind::Provider(_) | PointKind::Param { .. } | PointKind::Value => None,
        }
    }

    fn attach(&mut self, owner: &'static str, fallback_name: impl FnOnce() -> String) {
        self.owner = owner;
        if self.name.is_empty() {
            self.name = Cow::Owned(fallback_name());
        }
    }
}

fn short_owner(owner: &'static str) -> &'static str {
    owner.rsplit("::").next().unwrap_or(owner)
}

/// Constructor arguments, handed out in declaration order.
pub struct Args {
    values: std::vec::IntoIter<(TypeInfo, Value)>,
}

impl Args {
    pub(crate) fn new(values: Vec<(TypeInfo, Value)>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }

    pub fn next<D: 'static>(&mut self) -> Result<D, InjectError> {
        let (declared, value) = self.values.next().ok_or_else(|| InjectError::TypeMismatch {
            expected: TypeInfo::of::<D>().to_string(),
            found: "no remaining argument".to_string(),
        })?;
        value
            .downcast::<D>()
            .map(|v| *v)
            .map_err(|_| InjectError::TypeMismatch {
                expected: TypeInfo::of::<D>().to_string(),
                found: declared.to_string(),
            })
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

type BuildFn<T> = dyn Fn(&mut Args) -> Result<T, BoxError> + Send + Sync;

pub struct Constructor<T> {
    inject: bool,
    params: Vec<InjectionPoint>,
    build: Box<BuildFn<T>>,
}

impl<T: 'static> Constructor<T> {
    /// An unmarked constructor. Only usable by the resolver when it takes no parameters.
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&mut Args) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            inject: false,
            params: Vec::new(),
            build: Box::new(build),
        }
    }

    /// The designated injection constructor (`@Inject`).
    pub fn inject<F>(build: F) -> Self
    where
        F: Fn(&mut Args) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            inject: true,
            ..Self::new(build)
        }
    }

    /// Unmarked, parameterless, infallible.
    pub fn no_arg<F>(build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(move |_| Ok(build()))
    }

    pub fn param(mut self, point: InjectionPoint) -> Self {
        self.params.push(point);
        self
    }

    pub fn is_inject(&self) -> bool {
        self.inject
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub(crate) fn params(&self) -> &[InjectionPoint] {
        &self.params
    }

    pub(crate) fn invoke(&self, args: &mut Args) -> Result<T, BoxError> {
        (self.build)(args)
    }
}

type SetFn<T> = dyn Fn(&mut T, Value) -> Result<(), InjectError> + Send + Sync;

pub struct Field<T> {
    point: InjectionPoint,
    set: Box<SetFn<T>>,
}

impl<T: 'static> Field<T> {
    pub fn new<D, F>(name: &'static str, point: InjectionPoint, set: F) -> Self
    where
        D: 'static,
        F: Fn(&mut T, D) + Send + Sync + 'static,
    {
        let declared = point.declared_type();
        Self {
            point: point.named(name),
            set: Box::new(move |target, value| {
                let value = value.downcast::<D>().map_err(|_| InjectError::TypeMismatch {
                    expected: TypeInfo::of::<D>().to_string(),
                    found: declared.to_string(),
                })?;
                set(target, *value);
                Ok(())
            }),
        }
    }

    pub fn point(&self) -> &InjectionPoint {
        &self.point
    }

    pub(crate) fn assign(&self, target: &mut T, value: Value) -> Result<(), InjectError> {
        (self.set)(target, value)
    }
}

pub(crate) type DisposeFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// **CLASS DESCRIPTOR**
///
/// **PURPOSE**: Everything the resolver needs to know about `T`.
pub struct ClassDescriptor<T> {
    annotations: Vec<Annotation>,
    constructors: Vec<Constructor<T>>,
    fields: Vec<Field<T>>,
    dispose: Option<DisposeFn<T>>,
}

impl<T: Send + Sync + 'static> ClassDescriptor<T> {
    pub fn new() -> Self {
        Self {
            annotations: Vec::new(),
            constructors: Vec::new(),
            fields: Vec::new(),
            dispose: None,
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn singleton(self) -> Self {
        self.annotate(Annotation::Singleton)
    }

    pub fn request_scoped(self) -> Self {
        self.annotate(Annotation::RequestScoped)
    }

    pub fn constructor(mut self, mut constructor: Constructor<T>) -> Self {
        let owner = std::any::type_name::<T>();
        for (index, point) in constructor.params.iter_mut().enumerate() {
            point.attach(owner, || format!("arg{}", index));
        }
        self.constructors.push(constructor);
        self
    }

    pub fn field(mut self, mut field: Field<T>) -> Self {
        let owner = std::any::type_name::<T>();
        field.point.attach(owner, String::new);
        self.fields.push(field);
        self
    }

    /// Hook run for a cached singleton when the injector closes.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.dispose = Some(Arc::new(hook));
        self
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn constructors(&self) -> &[Constructor<T>] {
        &self.constructors
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<Annotation>,
        Vec<Constructor<T>>,
        Vec<Field<T>>,
        Option<DisposeFn<T>>,
    ) {
        (self.annotations, self.constructors, self.fields, self.dispose)
    }
}

impl<T: Default + Send + Sync + 'static> ClassDescriptor<T> {
    /// A descriptor whose only constructor is `T::default`.
    pub fn with_default() -> Self {
        Self::new().constructor(Constructor::no_arg(T::default))
    }
}

impl<T: Send + Sync + 'static> Default for ClassDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Implements [`Injectable`] for a `Default` type with an optional scope.
///
/// ```rust,ignore
/// injectable!(Counter, singleton);
/// injectable!(RequestLog, request);
/// injectable!(Scratch);
/// ```
#[macro_export]
macro_rules! injectable {
    ($ty:ty) => {
        impl $crate::dependencies::Injectable for $ty {
            fn descriptor() -> $crate::dependencies::ClassDescriptor<Self> {
                $crate::dependencies::ClassDescriptor::with_default()
            }
        }
    };
    ($ty:ty, singleton) => {
        impl $crate::dependencies::Injectable for $ty {
            fn descriptor() -> $crate::dependencies::ClassDescriptor<Self> {
                $crate::dependencies::ClassDescriptor::with_default().singleton()
            }
        }
    };
    ($ty:ty, request) => {
        impl $crate::dependencies::Injectable for $ty {
            fn descriptor() -> $crate::dependencies::ClassDescriptor<Self> {
                $crate::dependencies::ClassDescriptor::with_default().request_scoped()
            }
        }
    };
}

fn resolve_class<X: Injectable>(res: &Resolution<'_>, key: BindingKey) -> Result<Value, InjectError> {
    res.resolve::<X>(key).map(|instance| Box::new(instance) as Value)
}

fn resolve_contract<C: ?Sized + Send + Sync + 'static>(
    res: &Resolution<'_>,
    key: BindingKey,
) -> Result<Value, InjectError> {
    res.resolve_contract::<C>(&key)
        .map(|instance| Box::new(instance) as Value)
}

fn build_provider<X: Injectable>(res: &Resolution<'_>, key: BindingKey) -> Result<Value, InjectError> {
    Ok(Box::new(res.provider::<X>(key)))
}

fn parse_value<T>(raw: &str) -> Result<Value, BoxError>
where
    T: FromStr + Send + 'static,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map(|v| Box::new(v) as Value)
        .map_err(|e| Box::new(e) as BoxError)
}

fn wrap_required(value: Option<Value>) -> Result<Option<Value>, InjectError> {
    Ok(value)
}

fn wrap_optional<T: Send + 'static>(value: Option<Value>) -> Result<Option<Value>, InjectError> {
    match value {
        None => Ok(Some(Box::new(None::<T>))),
        Some(value) => value
            .downcast::<T>()
            .map(|v| Some(Box::new(Some(*v)) as Value))
            .map_err(|_| InjectError::TypeMismatch {
                expected: TypeInfo::of::<T>().to_string(),
                found: "converted value of another type".to_string(),
            }),
    }
}

//! # FIELD AND PARAMETER STRATEGIES
//!
//! **PURPOSE**: Supply injection points from somewhere other than the class graph.
//!
//! ## BUILT-IN STRATEGIES (priority order)
//!
//! 1. **CONTEXT** - `@Context`: contextual objects of the current request
//! 2. **PATH / QUERY / HEADER / COOKIE / FORM** - named request values, converted
//! 3. **BEAN** - `@BeanParam`: an aggregate resolved through the graph
//! 4. **PERSISTENCE CONTEXT** - `@PersistenceContext`: a resource from a named unit
//!
//! Custom strategies follow in registration order. Exactly one strategy may
//! claim a point; a point nobody claims falls through to graph resolution.
//! The produced [`ValueFn`] runs on every access and is never cached itself.

use crate::dependencies::annotations::{default_value, Annotation};
use crate::dependencies::descriptor::{InjectionPoint, PointKind};
use crate::dependencies::key::BindingKey;
use crate::dependencies::resolver::Resolution;
use crate::errors::InjectError;
use crate::request::{MultipartPart, RequestContext};
use crate::types::{BoxError, TypeInfo, Value};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Produces the value for one injection point.
pub type ValueFn = Arc<dyn Fn(&Resolution<'_>) -> Result<Value, InjectError> + Send + Sync>;

/// **CORE STRATEGY TRAIT**
///
/// **CONTRACT**: `claims` looks at annotations only; `build` runs once per class
/// plan and may reject a claimed point whose declared type it cannot supply.
pub trait InjectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn claims(&self, point: &InjectionPoint) -> bool;

    fn build(&self, point: &InjectionPoint) -> Result<ValueFn, InjectError>;

    /// Graph key the produced value is resolved under, if the strategy
    /// delegates to the class graph. Walked by eager validation.
    fn graph_dependency(&self, _point: &InjectionPoint) -> Option<BindingKey> {
        None
    }
}

fn unsupported(strategy: &'static str, point: &InjectionPoint) -> InjectError {
    InjectError::UnsupportedPoint {
        strategy,
        point: point.describe(),
        type_name: point.declared_type().to_string(),
    }
}

// ================================================================================================
// CONTEXT STRATEGY
// ================================================================================================

/// `@Context`: the contextual object registered for the declared type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextStrategy;

impl InjectionStrategy for ContextStrategy {
    fn name(&self) -> &'static str {
        "context"
    }

    fn claims(&self, point: &InjectionPoint) -> bool {
        point.has_annotation(|a| matches!(a, Annotation::Context))
    }

    fn build(&self, point: &InjectionPoint) -> Result<ValueFn, InjectError> {
        let declared = point.declared_type();
        let described = point.describe();
        Ok(Arc::new(move |res: &Resolution<'_>| {
            res.request_context(&described)?
                .context_value(declared)
                .ok_or_else(|| InjectError::ContextUnavailable {
                    type_name: declared.to_string(),
                })
        }))
    }
}

// ================================================================================================
// PARAMETER STRATEGIES - path, query, header, cookie, form
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Path,
    Query,
    Header,
    Cookie,
    Form,
}

impl ParamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Form => "form",
        }
    }

    fn parameter_name<'a>(&self, annotation: &'a Annotation) -> Option<&'a str> {
        match (self, annotation) {
            (Self::Path, Annotation::PathParam(name))
            | (Self::Query, Annotation::QueryParam(name))
            | (Self::Header, Annotation::HeaderParam(name))
            | (Self::Cookie, Annotation::CookieParam(name))
            | (Self::Form, Annotation::FormParam(name)) => Some(name),
            _ => None,
        }
    }

    fn read(&self, context: &RequestContext, name: &str) -> Option<String> {
        match self {
            Self::Path => context.path_param(name).map(str::to_string),
            Self::Query => context.query_param(name).map(str::to_string),
            Self::Header => context.header(name).map(str::to_string),
            Self::Cookie => context.cookie(name).map(str::to_string),
            Self::Form => context.form_field(name),
        }
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named request value, converted to the point's declared type.
#[derive(Debug, Clone, Copy)]
pub struct ParamStrategy {
    source: ParamSource,
}

impl ParamStrategy {
    pub fn new(source: ParamSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> ParamSource {
        self.source
    }

    fn multipart(&self, point: &InjectionPoint, name: String) -> Option<ValueFn> {
        let declared = point.declared_type();
        let optional = declared.is::<Option<MultipartPart>>();
        if self.source != ParamSource::Form || !(optional || declared.is::<MultipartPart>()) {
            return None;
        }
        let described = point.describe();
        Some(Arc::new(move |res: &Resolution<'_>| {
            let part = res.request_context(&described)?.form_part(&name);
            match (part, optional) {
                (part, true) => Ok(Box::new(part) as Value),
                (Some(part), false) => Ok(Box::new(part) as Value),
                (None, false) => Err(InjectError::MissingValue {
                    point: described.clone(),
                    source_kind: ParamSource::Form.as_str(),
                    name: name.clone(),
                }),
            }
        }))
    }
}

impl InjectionStrategy for ParamStrategy {
    fn name(&self) -> &'static str {
        self.source.as_str()
    }

    fn claims(&self, point: &InjectionPoint) -> bool {
        point
            .annotations()
            .iter()
            .any(|a| self.source.parameter_name(a).is_some())
    }

    fn build(&self, point: &InjectionPoint) -> Result<ValueFn, InjectError> {
        let name = point
            .annotations()
            .iter()
            .find_map(|a| self.source.parameter_name(a))
            .unwrap_or_default()
            .to_string();

        if let Some(produce) = self.multipart(point, name.clone()) {
            return Ok(produce);
        }

        // `value` points have no string parser of their own; only registered
        // and primitive converters can produce them.
        let (parse, wrap) = match point.kind {
            PointKind::Param { parse, wrap } => (Some(parse), Some(wrap)),
            PointKind::Value => (None, None),
            _ => return Err(unsupported(self.name(), point)),
        };
        let default = default_value(point.annotations()).map(str::to_string);
        let element = point.element_type();
        let described = point.describe();
        let source = self.source;

        Ok(Arc::new(move |res: &Resolution<'_>| {
            let raw = source
                .read(res.request_context(&described)?, &name)
                .or_else(|| default.clone());
            let converted = raw
                .map(|raw| res.converters().convert(&raw, element, parse))
                .transpose()?;
            let value = match wrap {
                Some(wrap) => wrap(converted)?,
                None => converted,
            };
            value.ok_or_else(|| InjectError::MissingValue {
                point: described.clone(),
                source_kind: source.as_str(),
                name: name.clone(),
            })
        }))
    }
}

// ================================================================================================
// BEAN STRATEGY
// ================================================================================================

/// `@BeanParam`: the aggregate is built through the graph; its own points are
/// strategy-injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct BeanStrategy;

impl InjectionStrategy for BeanStrategy {
    fn name(&self) -> &'static str {
        "bean"
    }

    fn claims(&self, point: &InjectionPoint) -> bool {
        point.has_annotation(|a| matches!(a, Annotation::BeanParam))
    }

    fn build(&self, point: &InjectionPoint) -> Result<ValueFn, InjectError> {
        let resolve = match point.kind {
            PointKind::Class(resolve, _) => resolve,
            _ => return Err(unsupported(self.name(), point)),
        };
        let key = BindingKey::from_type(point.element_type());
        Ok(Arc::new(move |res: &Resolution<'_>| resolve(res, key.clone())))
    }

    fn graph_dependency(&self, point: &InjectionPoint) -> Option<BindingKey> {
        Some(BindingKey::from_type(point.element_type()))
    }
}

// ================================================================================================
// PERSISTENCE CONTEXT STRATEGY
// ================================================================================================

/// A named source of persistence resources (an entity-manager factory).
pub trait PersistenceUnit: Send + Sync {
    /// Type of the resource `open` produces.
    fn resource_type(&self) -> TypeInfo;

    fn open(&self) -> Result<Value, BoxError>;
}

type OpenFn<R> = dyn Fn() -> Result<R, BoxError> + Send + Sync;

pub struct FnPersistenceUnit<R> {
    open: Box<OpenFn<R>>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Send + 'static> FnPersistenceUnit<R> {
    pub fn new<F>(open: F) -> Self
    where
        F: Fn() -> Result<R, BoxError> + Send + Sync + 'static,
    {
        Self {
            open: Box::new(open),
            _resource: PhantomData,
        }
    }
}

impl<R: Send + 'static> PersistenceUnit for FnPersistenceUnit<R> {
    fn resource_type(&self) -> TypeInfo {
        TypeInfo::of::<R>()
    }

    fn open(&self) -> Result<Value, BoxError> {
        (self.open)().map(|resource| Box::new(resource) as Value)
    }
}

/// `@PersistenceContext(unit)`: a fresh resource from the unit on every access.
#[derive(Clone, Default)]
pub struct PersistenceContextStrategy {
    units: HashMap<String, Arc<dyn PersistenceUnit>>,
    default_unit: String,
}

impl PersistenceContextStrategy {
    pub fn new(units: HashMap<String, Arc<dyn PersistenceUnit>>, default_unit: impl Into<String>) -> Self {
        Self {
            units,
            default_unit: default_unit.into(),
        }
    }

    pub fn unit_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.units.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl InjectionStrategy for PersistenceContextStrategy {
    fn name(&self) -> &'static str {
        "persistence-context"
    }

    fn claims(&self, point: &InjectionPoint) -> bool {
        point.has_annotation(|a| matches!(a, Annotation::PersistenceContext(_)))
    }

    fn build(&self, point: &InjectionPoint) -> Result<ValueFn, InjectError> {
        let requested = point
            .annotations()
            .iter()
            .find_map(|a| match a {
                Annotation::PersistenceContext(unit) => Some(unit.as_str()),
                _ => None,
            })
            .unwrap_or_default();
        let unit_name = if requested.is_empty() {
            self.default_unit.as_str()
        } else {
            requested
        };

        let unit = self
            .units
            .get(unit_name)
            .cloned()
            .ok_or_else(|| InjectError::UnknownPersistenceUnit {
                name: unit_name.to_string(),
            })?;
        if unit.resource_type() != point.declared_type() {
            return Err(unsupported(self.name(), point));
        }

        let described = point.describe();
        Ok(Arc::new(move |_: &Resolution<'_>| {
            unit.open().map_err(|source| InjectError::Construction {
                target: described.clone(),
                source,
            })
        }))
    }
}

impl fmt::Debug for PersistenceContextStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceContextStrategy")
            .field("units", &self.unit_names())
            .field("default_unit", &self.default_unit)
            .finish()
    }
}

// ================================================================================================
// STRATEGY REGISTRY
// ================================================================================================

/// Ordered strategy set consulted for every injection point of a class plan.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn InjectionStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Context, path, query, header, cookie, form and bean, in that order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ContextStrategy));
        for source in [
            ParamSource::Path,
            ParamSource::Query,
            ParamSource::Header,
            ParamSource::Cookie,
            ParamSource::Form,
        ] {
            registry.register(Arc::new(ParamStrategy::new(source)));
        }
        registry.register(Arc::new(BeanStrategy));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn InjectionStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// The single strategy claiming `point`, or `None` to fall through to the graph.
    pub fn select(
        &self,
        point: &InjectionPoint,
    ) -> Result<Option<&dyn InjectionStrategy>, InjectError> {
        let claiming: Vec<&dyn InjectionStrategy> = self
            .strategies
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| s.claims(point))
            .collect();

        match claiming.as_slice() {
            [] => Ok(None),
            [strategy] => {
                if let Some(qualifier) = point.annotations().iter().find(|a| a.is_qualifier()) {
                    return Err(InjectError::ConflictingAnnotations {
                        point: point.describe(),
                        strategy: strategy.name(),
                        annotation: qualifier.clone(),
                    });
                }
                Ok(Some(*strategy))
            }
            _ => Err(InjectError::ConflictingStrategies {
                point: point.describe(),
                strategies: claiming.iter().map(|s| s.name()).collect(),
            }),
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

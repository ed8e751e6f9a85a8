//! # CLASS PLANS
//!
//! A class plan is a descriptor checked and prepared once per type: scope
//! decided, constructor selected, every point bound to either a strategy's
//! value function or a graph key. Plans are cached by the resolver and shared
//! by all threads.

use crate::dependencies::descriptor::{
    Constructor, DisposeFn, Field, GraphFn, InjectionPoint, ValidateFn,
};
use crate::dependencies::key::BindingKey;
use crate::dependencies::strategies::{StrategyRegistry, ValueFn};
use crate::dependencies::types::DependencyScope;
use crate::dependencies::Injectable;
use crate::errors::InjectError;
use crate::types::TypeInfo;

/// How one injection point gets its value.
pub(crate) enum PreparedPoint {
    Strategy {
        strategy: &'static str,
        declared: TypeInfo,
        produce: ValueFn,
        dependency: Option<(BindingKey, ValidateFn)>,
    },
    Graph {
        declared: TypeInfo,
        key: BindingKey,
        resolve: GraphFn,
        validate: Option<ValidateFn>,
    },
}

impl PreparedPoint {
    pub(crate) fn declared(&self) -> TypeInfo {
        match self {
            Self::Strategy { declared, .. } | Self::Graph { declared, .. } => *declared,
        }
    }

    /// The graph edge eager validation follows from this point, if any.
    pub(crate) fn dependency(&self) -> Option<(&BindingKey, ValidateFn)> {
        match self {
            Self::Strategy { dependency, .. } => {
                dependency.as_ref().map(|(key, validate)| (key, *validate))
            }
            Self::Graph { key, validate, .. } => validate.map(|validate| (key, validate)),
        }
    }

    pub(crate) fn describe_source(&self) -> String {
        match self {
            Self::Strategy { strategy, .. } => format!("{} strategy", strategy),
            Self::Graph { key, .. } => format!("graph {}", key),
        }
    }
}

pub(crate) struct ClassPlan<T> {
    pub(crate) type_info: TypeInfo,
    pub(crate) scope: DependencyScope,
    pub(crate) constructor: Constructor<T>,
    pub(crate) params: Vec<PreparedPoint>,
    pub(crate) fields: Vec<(Field<T>, PreparedPoint)>,
    pub(crate) dispose: Option<DisposeFn<T>>,
}

impl<T: Injectable> ClassPlan<T> {
    pub(crate) fn compile(strategies: &StrategyRegistry) -> Result<Self, InjectError> {
        let type_info = TypeInfo::of::<T>();
        let (annotations, constructors, fields, dispose) = T::descriptor().into_parts();

        let scope = DependencyScope::from_annotations(type_info, &annotations)?;
        let constructor = select_constructor(type_info, constructors)?;
        let params = constructor
            .params()
            .iter()
            .map(|point| prepare(strategies, point))
            .collect::<Result<Vec<_>, _>>()?;
        let fields = fields
            .into_iter()
            .map(|field| {
                let prepared = prepare(strategies, field.point())?;
                Ok((field, prepared))
            })
            .collect::<Result<Vec<_>, InjectError>>()?;

        log::debug!(
            "Compiled plan for {} ({:?}, {} constructor params, {} fields)",
            type_info,
            scope,
            params.len(),
            fields.len()
        );
        for (index, point) in params.iter().enumerate() {
            log::trace!("  {}.arg{} <- {}", type_info, index, point.describe_source());
        }

        Ok(Self {
            type_info,
            scope,
            constructor,
            params,
            fields,
            dispose,
        })
    }
}

/// The single `@Inject` constructor, else an unmarked parameterless one.
fn select_constructor<T: 'static>(
    type_info: TypeInfo,
    constructors: Vec<Constructor<T>>,
) -> Result<Constructor<T>, InjectError> {
    let marked = constructors.iter().filter(|c| c.is_inject()).count();
    if marked > 1 {
        return Err(InjectError::AmbiguousConstructor {
            type_name: type_info.to_string(),
            count: marked,
        });
    }

    let mut constructors = constructors.into_iter();
    let selected = if marked == 1 {
        constructors.find(|c| c.is_inject())
    } else {
        constructors.find(|c| c.arity() == 0)
    };
    selected.ok_or_else(|| InjectError::NoViableConstructor {
        type_name: type_info.to_string(),
    })
}

fn prepare(
    strategies: &StrategyRegistry,
    point: &InjectionPoint,
) -> Result<PreparedPoint, InjectError> {
    let declared = point.declared_type();

    if let Some(strategy) = strategies.select(point)? {
        return Ok(PreparedPoint::Strategy {
            strategy: strategy.name(),
            declared,
            produce: strategy.build(point)?,
            dependency: strategy.graph_dependency(point).zip(point.validate_fn()),
        });
    }

    let resolve = point.graph_fn().ok_or_else(|| InjectError::Unresolvable {
        point: point.describe(),
        type_name: declared.to_string(),
    })?;
    let key = BindingKey::from_annotations(point.element_type(), point.annotations()).map_err(
        |err| match err {
            InjectError::ConflictingQualifiers { annotations, .. } => {
                InjectError::ConflictingQualifiers {
                    point: point.describe(),
                    annotations,
                }
            }
            other => other,
        },
    )?;

    Ok(PreparedPoint::Graph {
        declared,
        key,
        resolve,
        validate: point.validate_fn(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies::{Annotation, ClassDescriptor};

    #[derive(Default)]
    struct Leaf;
    crate::injectable!(Leaf);

    struct TwoMarked;

    impl Injectable for TwoMarked {
        fn descriptor() -> ClassDescriptor<Self> {
            ClassDescriptor::new()
                .constructor(Constructor::inject(|_| Ok(TwoMarked)))
                .constructor(
                    Constructor::inject(|_| Ok(TwoMarked)).param(InjectionPoint::of::<Leaf>()),
                )
        }
    }

    struct OnlyArgs;

    impl Injectable for OnlyArgs {
        fn descriptor() -> ClassDescriptor<Self> {
            ClassDescriptor::new().constructor(
                Constructor::new(|_| Ok(OnlyArgs)).param(InjectionPoint::of::<Leaf>()),
            )
        }
    }

    struct Mixed;

    impl Injectable for Mixed {
        fn descriptor() -> ClassDescriptor<Self> {
            ClassDescriptor::new()
                .singleton()
                .constructor(Constructor::no_arg(|| Mixed))
                .constructor(
                    Constructor::inject(|_| Ok(Mixed))
                        .param(InjectionPoint::of::<Leaf>().annotate(Annotation::named("x")))
                        .param(InjectionPoint::param::<u32>().annotate(Annotation::query("n"))),
                )
        }
    }

    struct Unclaimed;

    impl Injectable for Unclaimed {
        fn descriptor() -> ClassDescriptor<Self> {
            ClassDescriptor::new().constructor(
                Constructor::inject(|_| Ok(Unclaimed)).param(InjectionPoint::param::<String>()),
            )
        }
    }

    fn compile<T: Injectable>() -> Result<ClassPlan<T>, InjectError> {
        ClassPlan::compile(&StrategyRegistry::with_defaults())
    }

    #[test]
    fn test_two_inject_constructors_rejected() {
        assert!(matches!(
            compile::<TwoMarked>(),
            Err(InjectError::AmbiguousConstructor { count: 2, .. })
        ));
    }

    #[test]
    fn test_no_viable_constructor() {
        assert!(matches!(
            compile::<OnlyArgs>(),
            Err(InjectError::NoViableConstructor { .. })
        ));
    }

    #[test]
    fn test_inject_constructor_preferred() {
        let plan = compile::<Mixed>().unwrap();
        assert_eq!(plan.scope, DependencyScope::Singleton);
        assert_eq!(plan.params.len(), 2);
        match &plan.params[0] {
            PreparedPoint::Graph { key, .. } => assert_eq!(key.to_string(), "@Named(\"x\") Leaf"),
            PreparedPoint::Strategy { .. } => panic!("expected a graph point"),
        }
        assert!(matches!(
            plan.params[1],
            PreparedPoint::Strategy { strategy: "query", .. }
        ));
        assert!(plan.params[0].dependency().is_some());
        assert!(plan.params[1].dependency().is_none());
    }

    #[test]
    fn test_providers_and_beans_as_dependencies() {
        struct Holder;

        impl Injectable for Holder {
            fn descriptor() -> ClassDescriptor<Self> {
                ClassDescriptor::new().constructor(
                    Constructor::inject(|_| Ok(Holder))
                        .param(InjectionPoint::provider::<Leaf>())
                        .param(InjectionPoint::of::<Leaf>().annotate(Annotation::BeanParam)),
                )
            }
        }

        let plan = compile::<Holder>().unwrap();
        assert!(plan.params[0].dependency().is_none());
        let (key, _) = plan.params[1].dependency().unwrap();
        assert_eq!(*key, BindingKey::of::<Leaf>());
    }

    #[test]
    fn test_unclaimed_value_point_is_unresolvable() {
        match compile::<Unclaimed>() {
            Err(InjectError::Unresolvable { point, .. }) => assert_eq!(point, "Unclaimed.arg0"),
            _ => panic!("expected an unresolvable point"),
        }
    }
}

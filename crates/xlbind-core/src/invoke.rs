//! Overload resolution and invocation.
//!
//! A call names a type, a member and a list of host values. Every visible
//! overload whose arity fits and whose parameters all have a converter for
//! the supplied shapes becomes a [`Candidate`]. Candidates are tried most
//! specific first; the first one whose arguments convert, whose body
//! returns, and whose result converts back wins.

use crate::catalog::{ConvertContext, TypeConverter};
use crate::error::{BridgeError, BridgeResult};
use crate::managed::{ManagedType, Object};
use crate::registry::{CONSTRUCTOR_NAME, MethodDescriptor, TypeRegistry, type_key};
use dashmap::DashMap;
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use xlbind_common::{Shape, TaggedValue};

/// How a successful result travels back to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResultMode {
    /// Use the most specific rule for the result's runtime type, so numbers
    /// come back as numbers and lists as rows.
    #[default]
    Simplest,
    /// Intern the result and return its handle. A void result is still
    /// returned as an empty cell; there is nothing to box.
    Object,
}

/// One overload together with the rules needed to call it with a
/// particular list of argument shapes.
pub struct Candidate {
    method: Arc<MethodDescriptor>,
    /// Declared target of each supplied argument. Trailing variadic
    /// arguments target the element type.
    targets: Vec<ManagedType>,
    converters: Vec<Arc<dyn TypeConverter>>,
    return_converter: Option<Arc<dyn TypeConverter>>,
    specificity: u32,
    priority: i32,
    order: usize,
}

impl Candidate {
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn specificity(&self) -> u32 {
        self.specificity
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    fn convert_args(&self, cx: &ConvertContext<'_>, args: &[TaggedValue]) -> BridgeResult<Vec<Object>> {
        let mut converted = Vec::with_capacity(self.method.params().len());
        for ((arg, target), rule) in args.iter().zip(&self.targets).zip(&self.converters) {
            converted.push(rule.to_managed(cx, target, arg)?);
        }
        if let Some(elem) = self.method.vararg_element() {
            let fixed = self.method.params().len() - 1;
            let rest = converted.split_off(fixed);
            converted.push(Object::array(elem.clone(), rest));
        }
        Ok(converted)
    }

    fn convert_result(
        &self,
        cx: &ConvertContext<'_>,
        raw: &Object,
        mode: ResultMode,
    ) -> BridgeResult<TaggedValue> {
        if let Some(TaggedValue::HandleRef(h)) = raw.as_tagged() {
            return Ok(TaggedValue::HandleRef(*h));
        }
        if raw.managed_type() == &ManagedType::Void {
            return Ok(TaggedValue::Empty);
        }
        match mode {
            ResultMode::Object => Ok(TaggedValue::HandleRef(cx.heap.intern(raw))),
            ResultMode::Simplest => {
                let rule = cx
                    .catalog
                    .find_by_managed_type(raw.managed_type())
                    .or(self.return_converter.as_ref())
                    .ok_or_else(|| BridgeError::NoReturnConverter(raw.managed_type().to_string()))?;
                rule.to_tagged(cx, raw)
            }
        }
    }

    /// Convert the arguments, run the body and convert the result. A panic
    /// anywhere in the three steps fails this candidate only.
    fn attempt(
        &self,
        cx: &ConvertContext<'_>,
        receiver: Option<&Object>,
        args: &[TaggedValue],
        mode: ResultMode,
    ) -> BridgeResult<TaggedValue> {
        guarded(&self.method, || {
            let converted = self.convert_args(cx, args)?;
            let raw = self.method.call(receiver, &converted)?;
            self.convert_result(cx, &raw, mode)
        })
    }
}

/// Run `f`, turning a panic into [`BridgeError::InvocationFailure`].
pub(crate) fn guarded<T>(
    what: &dyn fmt::Display,
    f: impl FnOnce() -> BridgeResult<T>,
) -> BridgeResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(BridgeError::invocation(format!("{what} panicked: {msg}")))
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("method", &self.method.to_string())
            .field("specificity", &self.specificity)
            .field("priority", &self.priority)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CandidateKey {
    ty: String,
    member: String,
    shapes: SmallVec<[Shape; 4]>,
    statics_only: bool,
}

/// Resolves and runs calls, memoising candidate lists per
/// (type, member, argument shapes).
///
/// The catalog and registry are fixed once the bridge is built, so cached
/// entries never go stale.
#[derive(Debug)]
pub struct Invoker {
    cache: DashMap<CandidateKey, Arc<[Candidate]>>,
    use_cache: bool,
}

impl Invoker {
    pub fn new(use_cache: bool) -> Self {
        Self {
            cache: DashMap::new(),
            use_cache,
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Ordered candidates for calling `member` on `ty` with arguments of the
    /// given shapes. `statics_only` hides instance methods.
    pub fn candidates(
        &self,
        cx: &ConvertContext<'_>,
        registry: &TypeRegistry,
        ty: &ManagedType,
        member: &str,
        shapes: &[Shape],
        statics_only: bool,
    ) -> BridgeResult<Arc<[Candidate]>> {
        if !self.use_cache {
            return resolve_candidates(cx, registry, ty, member, shapes, statics_only).map(Arc::from);
        }
        let key = CandidateKey {
            ty: type_key(ty).to_string(),
            member: member.to_string(),
            shapes: SmallVec::from_slice(shapes),
            statics_only,
        };
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }
        let resolved: Arc<[Candidate]> =
            resolve_candidates(cx, registry, ty, member, shapes, statics_only)?.into();
        self.cache.insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Resolve and run `member` on `ty`.
    pub fn call(
        &self,
        cx: &ConvertContext<'_>,
        registry: &TypeRegistry,
        ty: &ManagedType,
        member: &str,
        receiver: Option<&Object>,
        args: &[TaggedValue],
        mode: ResultMode,
    ) -> BridgeResult<TaggedValue> {
        let shapes: SmallVec<[Shape; 4]> = args.iter().map(TaggedValue::shape).collect();
        let candidates = self.candidates(cx, registry, ty, member, &shapes, receiver.is_none())?;
        let _span = tracing::debug_span!("invoke", ty = %ty, member, candidates = candidates.len())
            .entered();
        invoke(cx, &candidates, receiver, args, mode).map_err(|err| match err {
            BridgeError::NoSuccessfulOverload { attempts, .. } => BridgeError::NoSuccessfulOverload {
                ty: ty.to_string(),
                method: member.to_string(),
                args: args.len(),
                attempts,
            },
            other => other,
        })
    }
}

/// Try `candidates` in order and return the first success.
pub fn invoke(
    cx: &ConvertContext<'_>,
    candidates: &[Candidate],
    receiver: Option<&Object>,
    args: &[TaggedValue],
    mode: ResultMode,
) -> BridgeResult<TaggedValue> {
    for cand in candidates {
        match cand.attempt(cx, receiver, args, mode) {
            Ok(v) => return Ok(v),
            // a stale handle is the caller's error whichever overload sees it
            Err(err @ BridgeError::NotFound(_)) => return Err(err),
            Err(err) => {
                tracing::trace!(candidate = %cand.method, error = %err, "candidate failed");
            }
        }
    }
    let method = candidates
        .first()
        .map_or_else(String::new, |c| c.method.name().to_string());
    tracing::debug!(method = %method, attempts = candidates.len(), "no overload succeeded");
    Err(BridgeError::NoSuccessfulOverload {
        ty: String::new(),
        method,
        args: args.len(),
        attempts: candidates.len(),
    })
}

/// Build the ordered candidate list without consulting any cache.
pub fn resolve_candidates(
    cx: &ConvertContext<'_>,
    registry: &TypeRegistry,
    ty: &ManagedType,
    member: &str,
    shapes: &[Shape],
    statics_only: bool,
) -> BridgeResult<Vec<Candidate>> {
    let methods: Vec<Arc<MethodDescriptor>> = if member == CONSTRUCTOR_NAME {
        registry
            .descriptor_for(ty)
            .map(|d| d.constructors().to_vec())
            .unwrap_or_default()
    } else {
        registry
            .methods_named(ty, member)
            .into_iter()
            .filter(|m| !statics_only || m.is_static())
            .collect()
    };
    if methods.is_empty() {
        return Err(BridgeError::UnknownMember {
            ty: ty.to_string(),
            name: member.to_string(),
        });
    }

    let mut candidates = Vec::new();
    let mut first_miss: Option<(Shape, ManagedType)> = None;
    for (order, method) in methods.into_iter().enumerate() {
        if !method.accepts_arity(shapes.len()) {
            continue;
        }
        match build_candidate(cx, method, shapes, order) {
            Ok(c) => candidates.push(c),
            Err(miss) => {
                first_miss.get_or_insert(miss);
            }
        }
    }

    if candidates.is_empty() {
        return Err(match first_miss {
            Some((shape, managed)) => BridgeError::NoCompatibleConverter {
                shape,
                managed: managed.to_string(),
            },
            None => BridgeError::NoSuccessfulOverload {
                ty: ty.to_string(),
                method: member.to_string(),
                args: shapes.len(),
                attempts: 0,
            },
        });
    }

    // stable: declaration order breaks the remaining ties
    candidates.sort_by_key(|c| {
        (
            Reverse(c.specificity),
            Reverse(c.priority),
            c.method.is_variadic(),
            c.order,
        )
    });
    Ok(candidates)
}

fn build_candidate(
    cx: &ConvertContext<'_>,
    method: Arc<MethodDescriptor>,
    shapes: &[Shape],
    order: usize,
) -> Result<Candidate, (Shape, ManagedType)> {
    let params = method.params();
    let fixed = if method.is_variadic() {
        params.len() - 1
    } else {
        params.len()
    };
    let mut targets = Vec::with_capacity(shapes.len());
    let mut converters = Vec::with_capacity(shapes.len());
    for (i, shape) in shapes.iter().enumerate() {
        let target = if i < fixed {
            params[i].clone()
        } else {
            method
                .vararg_element()
                .cloned()
                .unwrap_or(ManagedType::Any)
        };
        let rule = cx
            .catalog
            .find_by_host_shape(*shape, &target)
            .ok_or_else(|| (*shape, target.clone()))?;
        converters.push(Arc::clone(rule));
        targets.push(target);
    }
    let specificity = targets.iter().map(ManagedType::specificity).sum();
    let priority = converters.iter().map(|r| r.priority()).sum();
    let return_converter = cx.catalog.find_by_managed_type(method.returns()).cloned();
    Ok(Candidate {
        method,
        targets,
        converters,
        return_converter,
        specificity,
        priority,
        order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ConverterCatalog;
    use crate::config::{HandleSeed, HeapConfig};
    use crate::convert::install_standard;
    use crate::heap::Heap;
    use crate::managed::ClassInfo;
    use crate::registry::ClassDescriptor;

    struct Fixture {
        heap: Heap,
        catalog: ConverterCatalog,
        registry: TypeRegistry,
        ty: ManagedType,
    }

    impl Fixture {
        fn new() -> Self {
            let mut catalog = ConverterCatalog::new();
            install_standard(&mut catalog);
            let info = ClassInfo::new("Scaler");
            let ty = ManagedType::class(&info);
            let mut registry = TypeRegistry::new();
            registry.register(
                ClassDescriptor::builder(ty.clone())
                    .method(MethodDescriptor::static_fn(
                        "describe",
                        vec![ManagedType::Any],
                        ManagedType::Text,
                        |_, args| Ok(Object::text(format!("object {}", args[0].describe()))),
                    ))
                    .method(MethodDescriptor::static_fn(
                        "describe",
                        vec![ManagedType::Int],
                        ManagedType::Text,
                        |_, args| Ok(Object::text(format!("int {}", args[0].describe()))),
                    ))
                    .method(
                        MethodDescriptor::static_fn(
                            "sum",
                            vec![ManagedType::array(ManagedType::Double)],
                            ManagedType::Double,
                            |_, args| {
                                let total = args[0]
                                    .as_array()
                                    .unwrap_or_default()
                                    .iter()
                                    .filter_map(Object::as_f64)
                                    .sum();
                                Ok(Object::double(total))
                            },
                        )
                        .variadic(),
                    )
                    .method(MethodDescriptor::static_fn(
                        "explode",
                        vec![],
                        ManagedType::Void,
                        |_, _| panic!("boom"),
                    ))
                    .method(MethodDescriptor::static_fn(
                        "nothing",
                        vec![],
                        ManagedType::Void,
                        |_, _| Ok(Object::void()),
                    ))
                    .build(),
            );
            Self {
                heap: Heap::new(&HeapConfig::default().with_seed(HandleSeed::Fixed(1))),
                catalog,
                registry,
                ty,
            }
        }

        fn call(&self, invoker: &Invoker, member: &str, args: &[TaggedValue]) -> BridgeResult<TaggedValue> {
            let cx = ConvertContext::new(&self.heap, &self.catalog);
            invoker.call(&cx, &self.registry, &self.ty, member, None, args, ResultMode::Simplest)
        }
    }

    #[test]
    fn integral_number_prefers_the_int_overload() {
        let fx = Fixture::new();
        let inv = Invoker::new(true);
        assert_eq!(
            fx.call(&inv, "describe", &[TaggedValue::Number(42.0)]).unwrap(),
            TaggedValue::text("int 42")
        );
        // int conversion fails for a fraction, the generic overload takes it
        assert_eq!(
            fx.call(&inv, "describe", &[TaggedValue::Number(2.5)]).unwrap(),
            TaggedValue::text("object 2.5")
        );
        assert_eq!(inv.cached_entries(), 1);
    }

    #[test]
    fn variadic_packs_trailing_arguments() {
        let fx = Fixture::new();
        let inv = Invoker::new(false);
        let args: Vec<TaggedValue> = [1.0, 2.0, 3.5].into_iter().map(TaggedValue::Number).collect();
        assert_eq!(fx.call(&inv, "sum", &args).unwrap(), TaggedValue::Number(6.5));
        assert_eq!(fx.call(&inv, "sum", &[]).unwrap(), TaggedValue::Number(0.0));
        assert_eq!(inv.cached_entries(), 0);
    }

    #[test]
    fn panics_are_contained_and_reported_as_exhaustion() {
        let fx = Fixture::new();
        let inv = Invoker::new(true);
        let err = fx.call(&inv, "explode", &[]).unwrap_err();
        assert_eq!(
            err,
            BridgeError::NoSuccessfulOverload {
                ty: "Scaler".into(),
                method: "explode".into(),
                args: 0,
                attempts: 1,
            }
        );
    }

    #[test]
    fn void_results_are_blank() {
        let fx = Fixture::new();
        let inv = Invoker::new(true);
        assert_eq!(fx.call(&inv, "nothing", &[]).unwrap(), TaggedValue::Empty);
    }

    #[test]
    fn missing_members_and_converters_are_distinguished() {
        let fx = Fixture::new();
        let inv = Invoker::new(true);
        assert!(matches!(
            fx.call(&inv, "nope", &[]),
            Err(BridgeError::UnknownMember { .. })
        ));
        assert!(matches!(
            fx.call(&inv, "describe", &[TaggedValue::Number(1.0), TaggedValue::Number(2.0)]),
            Err(BridgeError::NoSuccessfulOverload { attempts: 0, .. })
        ));
        let err_value = TaggedValue::Error(xlbind_common::XlError::new(xlbind_common::XlErrorKind::Div));
        assert!(matches!(
            fx.call(&inv, "describe", &[err_value]),
            Err(BridgeError::NoCompatibleConverter { shape: Shape::Error, .. })
        ));
    }

    #[test]
    fn candidate_order_is_most_specific_first() {
        let fx = Fixture::new();
        let cx = ConvertContext::new(&fx.heap, &fx.catalog);
        let cands =
            resolve_candidates(&cx, &fx.registry, &fx.ty, "describe", &[Shape::Number], true).unwrap();
        let order: Vec<String> = cands.iter().map(|c| c.method().to_string()).collect();
        assert_eq!(order, ["static String describe(int)", "static String describe(Object)"]);
    }

    #[test]
    fn object_mode_boxes_results() {
        let fx = Fixture::new();
        let inv = Invoker::new(true);
        let cx = ConvertContext::new(&fx.heap, &fx.catalog);
        let out = inv
            .call(&cx, &fx.registry, &fx.ty, "describe", None, &[TaggedValue::Number(7.0)], ResultMode::Object)
            .unwrap();
        let h = out.as_handle().unwrap();
        assert_eq!(fx.heap.resolve(h).unwrap().as_str(), Some("int 7"));
    }

    struct ExplodingText;

    impl TypeConverter for ExplodingText {
        fn name(&self) -> &'static str {
            "exploding-text"
        }
        fn host_shape(&self) -> Shape {
            Shape::Text
        }
        fn managed_type(&self) -> ManagedType {
            ManagedType::Text
        }
        fn priority(&self) -> i32 {
            20
        }
        fn to_tagged(&self, _: &ConvertContext<'_>, _: &Object) -> BridgeResult<TaggedValue> {
            panic!("cannot render")
        }
        fn to_managed(
            &self,
            _: &ConvertContext<'_>,
            _: &ManagedType,
            _: &TaggedValue,
        ) -> BridgeResult<Object> {
            panic!("cannot read")
        }
    }

    #[test]
    fn panicking_converters_only_fail_their_candidate() {
        let mut fx = Fixture::new();
        fx.catalog.register(Arc::new(ExplodingText));
        let inv = Invoker::new(true);
        let err = fx.call(&inv, "describe", &[TaggedValue::text("x")]).unwrap_err();
        assert!(matches!(err, BridgeError::NoSuccessfulOverload { attempts: 1, .. }));

        // the text result of describe(int) hits the same rule on the way out
        let err = fx.call(&inv, "describe", &[TaggedValue::Number(3.0)]).unwrap_err();
        assert!(matches!(err, BridgeError::NoSuccessfulOverload { attempts: 2, .. }));
    }

    #[test]
    fn void_results_stay_blank_in_object_mode() {
        let fx = Fixture::new();
        let inv = Invoker::new(true);
        let cx = ConvertContext::new(&fx.heap, &fx.catalog);
        let out = inv
            .call(&cx, &fx.registry, &fx.ty, "nothing", None, &[], ResultMode::Object)
            .unwrap();
        assert_eq!(out, TaggedValue::Empty);
        assert!(fx.heap.is_empty());
    }
}

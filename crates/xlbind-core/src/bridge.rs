//! The bridge context: one heap, one frozen catalog and registry, and the
//! invoker that ties them together.
//!
//! Every host-facing entry point returns a [`TaggedValue`]; failures come
//! back as [`TaggedValue::Error`] rather than as `Err`.

use crate::builtins;
use crate::catalog::{ConvertContext, ConverterCatalog, TypeConverter};
use crate::config::BridgeConfig;
use crate::convert;
use crate::error::{BridgeError, BridgeResult};
use crate::heap::{CycleReport, Heap};
use crate::invoke::{Invoker, ResultMode, guarded};
use crate::managed::{ManagedType, Object};
use crate::registry::{CONSTRUCTOR_NAME, ClassDescriptor, TypeRegistry};
use std::sync::Arc;
use xlbind_common::{ObjectHandle, TaggedValue};

/// What a call is made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// Instance call on the object behind a handle.
    Handle(ObjectHandle),
    /// Static call on a type, by registered name or alias.
    Type(&'a str),
}

impl<'a> Target<'a> {
    /// Read a target from a host argument: a handle or a type name.
    pub fn from_tagged(value: &'a TaggedValue) -> Option<Self> {
        match value {
            TaggedValue::HandleRef(h) => Some(Target::Handle(*h)),
            TaggedValue::Text(name) => Some(Target::Type(name)),
            _ => None,
        }
    }
}

pub struct Bridge {
    heap: Heap,
    catalog: Arc<ConverterCatalog>,
    registry: Arc<TypeRegistry>,
    invoker: Invoker,
    config: BridgeConfig,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn catalog(&self) -> &ConverterCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    fn cx(&self) -> ConvertContext<'_> {
        ConvertContext::new(&self.heap, &self.catalog)
    }

    fn lookup_type(&self, name: &str) -> BridgeResult<&ManagedType> {
        self.registry
            .lookup(name)
            .map(|d| d.ty())
            .ok_or_else(|| BridgeError::UnknownType(name.to_string()))
    }

    /// Call `method` on `target`, converting the result per `mode`.
    pub fn invoke_by_name(
        &self,
        target: Target<'_>,
        method: &str,
        args: &[TaggedValue],
        mode: ResultMode,
    ) -> TaggedValue {
        self.try_invoke_by_name(target, method, args, mode)
            .unwrap_or_else(|err| host_error(method, err))
    }

    pub fn try_invoke_by_name(
        &self,
        target: Target<'_>,
        method: &str,
        args: &[TaggedValue],
        mode: ResultMode,
    ) -> BridgeResult<TaggedValue> {
        let cx = self.cx();
        match target {
            Target::Handle(handle) => {
                let receiver = self.heap.resolve(handle)?;
                self.invoker.call(
                    &cx,
                    &self.registry,
                    receiver.managed_type(),
                    method,
                    Some(&receiver),
                    args,
                    mode,
                )
            }
            Target::Type(name) => {
                let ty = self.lookup_type(name)?;
                self.invoker
                    .call(&cx, &self.registry, ty, method, None, args, mode)
            }
        }
    }

    /// Construct an instance of `type_name`. The result is always a handle
    /// or an error.
    pub fn construct_by_name(&self, type_name: &str, args: &[TaggedValue]) -> TaggedValue {
        self.try_construct_by_name(type_name, args)
            .unwrap_or_else(|err| host_error(type_name, err))
    }

    pub fn try_construct_by_name(
        &self,
        type_name: &str,
        args: &[TaggedValue],
    ) -> BridgeResult<TaggedValue> {
        let ty = self.lookup_type(type_name)?;
        self.invoker.call(
            &self.cx(),
            &self.registry,
            ty,
            CONSTRUCTOR_NAME,
            None,
            args,
            ResultMode::Object,
        )
    }

    pub fn invoke_static(
        &self,
        type_name: &str,
        method: &str,
        args: &[TaggedValue],
        mode: ResultMode,
    ) -> TaggedValue {
        self.invoke_by_name(Target::Type(type_name), method, args, mode)
    }

    pub fn invoke_method(
        &self,
        handle: ObjectHandle,
        method: &str,
        args: &[TaggedValue],
        mode: ResultMode,
    ) -> TaggedValue {
        self.invoke_by_name(Target::Handle(handle), method, args, mode)
    }

    /// `invoke_by_name` with the configured default result mode.
    pub fn call(&self, target: Target<'_>, method: &str, args: &[TaggedValue]) -> TaggedValue {
        self.invoke_by_name(target, method, args, self.config.default_result_mode)
    }

    /// Render `object` with the most specific rule for its runtime type.
    pub fn to_tagged(&self, object: &Object) -> BridgeResult<TaggedValue> {
        if object.managed_type() == &ManagedType::Void {
            return Ok(TaggedValue::Empty);
        }
        let rule = self
            .catalog
            .find_by_managed_type(object.managed_type())
            .ok_or_else(|| BridgeError::NoReturnConverter(object.managed_type().to_string()))?;
        guarded(&rule.name(), || rule.to_tagged(&self.cx(), object))
    }

    /// Convert a host value to something assignable to `expected`.
    pub fn to_managed(&self, value: &TaggedValue, expected: &ManagedType) -> BridgeResult<Object> {
        let rule = self
            .catalog
            .find_by_host_shape(value.shape(), expected)
            .ok_or_else(|| BridgeError::NoCompatibleConverter {
                shape: value.shape(),
                managed: expected.to_string(),
            })?;
        guarded(&rule.name(), || rule.to_managed(&self.cx(), expected, value))
    }

    /// One collection step after a host recalculation: finish the running
    /// cycle with the handles seen in live cells and start the next one.
    pub fn collect(&self, reachable: &[ObjectHandle]) -> CycleReport {
        self.heap.cycle(reachable)
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("heap", &self.heap)
            .field("converters", &self.catalog.len())
            .field("classes", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

fn host_error(context: &str, err: BridgeError) -> TaggedValue {
    tracing::debug!(context, error = %err, "call failed");
    err.into()
}

#[derive(Default)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    catalog: ConverterCatalog,
    registry: TypeRegistry,
}

impl BridgeBuilder {
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Scalar, array, collection, pass-through and boxing rules.
    pub fn with_standard_converters(mut self) -> Self {
        convert::install_standard(&mut self.catalog);
        self
    }

    /// List, Set, String and Double class metadata.
    pub fn with_builtin_classes(mut self) -> Self {
        builtins::install(&mut self.registry);
        self
    }

    pub fn register_converter(mut self, rule: impl TypeConverter) -> Self {
        self.catalog.register(Arc::new(rule));
        self
    }

    pub fn register_class(mut self, class: ClassDescriptor) -> Self {
        self.registry.register(class);
        self
    }

    pub fn build(self) -> Bridge {
        tracing::info!(
            converters = self.catalog.len(),
            classes = self.registry.len(),
            "bridge ready"
        );
        Bridge {
            heap: Heap::new(&self.config.heap),
            catalog: Arc::new(self.catalog),
            registry: Arc::new(self.registry),
            invoker: Invoker::new(self.config.cache_candidates),
            config: self.config,
        }
    }
}

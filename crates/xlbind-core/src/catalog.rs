//! Priority-ordered registry of conversion rules between host values and
//! managed objects.

use crate::error::BridgeResult;
use crate::heap::Heap;
use crate::managed::{ManagedType, Object};
use std::fmt;
use std::sync::Arc;
use xlbind_common::{Shape, TaggedValue};

/// Well-known rule priorities. Higher wins.
pub mod priority {
    /// Scalars, arrays and lists.
    pub const STANDARD: i32 = 10;
    /// Jagged arrays shadow plain arrays for nested element types.
    pub const JAGGED: i32 = 11;
    /// Enum constants by name.
    pub const ENUM: i32 = 7;
    /// Sets, below the standard rules so a plain list is preferred.
    pub const COLLECTION: i32 = 6;
    /// Boxing onto the heap. Only used when nothing better applies.
    pub const OBJECT_FALLBACK: i32 = 0;
    /// Parsing numbers out of text. Scanned after everything else.
    pub const TEXT_FALLBACK: i32 = -1;
}

/// What a converter can reach while it runs.
#[derive(Clone, Copy)]
pub struct ConvertContext<'a> {
    pub heap: &'a Heap,
    pub catalog: &'a ConverterCatalog,
}

impl<'a> ConvertContext<'a> {
    pub fn new(heap: &'a Heap, catalog: &'a ConverterCatalog) -> Self {
        Self { heap, catalog }
    }
}

/// One bidirectional conversion rule between a host shape and a managed
/// type.
pub trait TypeConverter: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Host shape this rule reads. [`Shape::Any`] reads every shape.
    fn host_shape(&self) -> Shape;

    /// Managed type this rule produces and consumes.
    fn managed_type(&self) -> ManagedType;

    fn priority(&self) -> i32 {
        priority::STANDARD
    }

    /// Can `to_managed` produce something usable where `required` is
    /// declared?
    fn can_produce(&self, required: &ManagedType) -> bool {
        required.is_assignable_from(&self.managed_type())
    }

    /// Can `to_tagged` accept an object whose runtime type is `actual`?
    fn can_convert(&self, actual: &ManagedType) -> bool {
        self.managed_type().is_assignable_from(actual)
    }

    fn to_tagged(&self, cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue>;

    /// Convert `value` into an object assignable to `expected`.
    fn to_managed(
        &self,
        cx: &ConvertContext<'_>,
        expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object>;
}

impl fmt::Debug for dyn TypeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({} <-> {}, priority {})",
            self.name(),
            self.host_shape(),
            self.managed_type(),
            self.priority()
        )
    }
}

#[derive(Debug)]
struct PriorityBucket {
    priority: i32,
    rules: Vec<Arc<dyn TypeConverter>>,
}

/// Rules grouped by priority, scanned highest first and in registration
/// order within a priority.
///
/// Filled once during start-up, then shared read-only by the bridge.
#[derive(Debug, Default)]
pub struct ConverterCatalog {
    buckets: Vec<PriorityBucket>,
}

impl ConverterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: Arc<dyn TypeConverter>) {
        let p = rule.priority();
        tracing::trace!(rule = rule.name(), priority = p, "register converter");
        match self.buckets.binary_search_by(|b| p.cmp(&b.priority)) {
            Ok(idx) => self.buckets[idx].rules.push(rule),
            Err(idx) => self.buckets.insert(
                idx,
                PriorityBucket {
                    priority: p,
                    rules: vec![rule],
                },
            ),
        }
    }

    /// All rules in scan order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<dyn TypeConverter>> {
        self.buckets.iter().flat_map(|b| b.rules.iter())
    }

    /// Highest-priority rule reading `shape` that can produce `required`.
    pub fn find_by_host_shape(
        &self,
        shape: Shape,
        required: &ManagedType,
    ) -> Option<&Arc<dyn TypeConverter>> {
        self.rules()
            .find(|r| r.host_shape().accepts(shape) && r.can_produce(required))
    }

    /// Highest-priority rule able to render an object of type `actual`.
    pub fn find_by_managed_type(&self, actual: &ManagedType) -> Option<&Arc<dyn TypeConverter>> {
        self.rules().find(|r| r.can_convert(actual))
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

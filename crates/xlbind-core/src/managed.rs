//! The managed side of the bridge: runtime type tags and dynamically typed
//! objects.
//!
//! An [`Object`] is a shared, type-erased payload plus the [`ManagedType`]
//! it was created as. Identity is the address of the shared payload, so two
//! clones of one `Object` are the same object while two separately created
//! objects never are, even when their payloads compare equal.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use xlbind_common::TaggedValue;

/// Metadata for a user class: its name and optional parent.
///
/// Classes are compared by name; the registry guarantees names are unique.
#[derive(Debug)]
pub struct ClassInfo {
    name: String,
    parent: Option<Arc<ClassInfo>>,
    /// Named constants, in declaration order. Non-empty only for enums.
    constants: Vec<String>,
}

static ENUM_ROOT: Lazy<Arc<ClassInfo>> = Lazy::new(|| ClassInfo::new("Enum"));

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: None,
            constants: Vec::new(),
        })
    }

    pub fn extends(name: impl Into<String>, parent: &Arc<ClassInfo>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: Some(Arc::clone(parent)),
            constants: Vec::new(),
        })
    }

    /// An enum class with the given constants. Every enum extends
    /// [`ClassInfo::enum_root`].
    pub fn enumeration(name: impl Into<String>, constants: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: Some(Arc::clone(&*ENUM_ROOT)),
            constants: constants.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// The common parent of all enum classes.
    pub fn enum_root() -> &'static Arc<ClassInfo> {
        &ENUM_ROOT
    }

    pub fn is_enum(&self) -> bool {
        self.parent.is_some() && self.is_subclass_of(&ENUM_ROOT)
    }

    pub fn constants(&self) -> &[String] {
        &self.constants
    }

    /// Position of the constant called exactly `name`.
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.constants.iter().position(|c| c == name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ClassInfo>> {
        self.parent.as_ref()
    }

    /// Number of classes in the chain from the root down to `self`.
    pub fn depth(&self) -> u32 {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }

    /// True if `self` is `ancestor` or inherits from it.
    pub fn is_subclass_of(&self, ancestor: &ClassInfo) -> bool {
        let mut current = Some(self);
        while let Some(c) = current {
            if c.name == ancestor.name {
                return true;
            }
            current = c.parent.as_deref();
        }
        false
    }
}

impl PartialEq for ClassInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassInfo {}

impl Hash for ClassInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Static type of a managed value, as declared by parameters, return types
/// and converter rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ManagedType {
    /// Root of the hierarchy; every type is assignable to it.
    Any,
    /// Absence of a value. Also what blank host cells convert to.
    Void,
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Double,
    Text,
    /// A host value passed through untouched.
    Tagged,
    Array(Box<ManagedType>),
    List(Box<ManagedType>),
    Set(Box<ManagedType>),
    Class(Arc<ClassInfo>),
}

impl ManagedType {
    pub fn array(elem: ManagedType) -> Self {
        ManagedType::Array(Box::new(elem))
    }

    pub fn list(elem: ManagedType) -> Self {
        ManagedType::List(Box::new(elem))
    }

    pub fn set(elem: ManagedType) -> Self {
        ManagedType::Set(Box::new(elem))
    }

    pub fn class(info: &Arc<ClassInfo>) -> Self {
        ManagedType::Class(Arc::clone(info))
    }

    /// Element type of an array, list or set.
    pub fn element(&self) -> Option<&ManagedType> {
        match self {
            ManagedType::Array(e) | ManagedType::List(e) | ManagedType::Set(e) => Some(e),
            _ => None,
        }
    }

    /// "is-a": can a value of type `other` be used where `self` is declared?
    ///
    /// Containers are covariant in their element type; classes follow the
    /// parent chain; everything else must match exactly.
    pub fn is_assignable_from(&self, other: &ManagedType) -> bool {
        match (self, other) {
            (ManagedType::Any, _) => true,
            (ManagedType::Array(a), ManagedType::Array(b))
            | (ManagedType::List(a), ManagedType::List(b))
            | (ManagedType::Set(a), ManagedType::Set(b)) => a.is_assignable_from(b),
            (ManagedType::Class(a), ManagedType::Class(b)) => b.is_subclass_of(a),
            (a, b) => a == b,
        }
    }

    /// Ranking used to order overloads: higher is more specific.
    ///
    /// Integral types outrank `Double`, and narrower integers outrank wider
    /// ones, so an integral host number picks the narrowest numeric overload
    /// first.
    pub fn specificity(&self) -> u32 {
        match self {
            ManagedType::Any => 0,
            ManagedType::Tagged => 1,
            ManagedType::Void | ManagedType::Bool | ManagedType::Text | ManagedType::Double => 3,
            ManagedType::Long => 4,
            ManagedType::Int => 5,
            ManagedType::Short => 6,
            ManagedType::Byte => 7,
            ManagedType::Array(e) | ManagedType::List(e) | ManagedType::Set(e) => {
                1 + e.specificity()
            }
            ManagedType::Class(c) => 1 + c.depth(),
        }
    }
}

impl fmt::Display for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedType::Any => write!(f, "Object"),
            ManagedType::Void => write!(f, "void"),
            ManagedType::Bool => write!(f, "boolean"),
            ManagedType::Byte => write!(f, "byte"),
            ManagedType::Short => write!(f, "short"),
            ManagedType::Int => write!(f, "int"),
            ManagedType::Long => write!(f, "long"),
            ManagedType::Double => write!(f, "double"),
            ManagedType::Text => write!(f, "String"),
            ManagedType::Tagged => write!(f, "TaggedValue"),
            ManagedType::Array(e) => write!(f, "{e}[]"),
            ManagedType::List(e) => write!(f, "List<{e}>"),
            ManagedType::Set(e) => write!(f, "Set<{e}>"),
            ManagedType::Class(c) => write!(f, "{}", c.name()),
        }
    }
}

/// Payload of an enum value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumConstant {
    pub ordinal: usize,
    pub name: String,
}

/// Identity of an [`Object`]: the address of its shared payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

/// A live managed value.
#[derive(Clone)]
pub struct Object {
    ty: ManagedType,
    value: Arc<dyn Any + Send + Sync>,
}

impl Object {
    pub fn new<T: Any + Send + Sync>(ty: ManagedType, value: T) -> Self {
        Self {
            ty,
            value: Arc::new(value),
        }
    }

    /// Wrap a payload that is already shared elsewhere; identity is kept.
    pub fn from_arc(ty: ManagedType, value: Arc<dyn Any + Send + Sync>) -> Self {
        Self { ty, value }
    }

    pub fn instance<T: Any + Send + Sync>(class: &Arc<ClassInfo>, value: T) -> Self {
        Self::new(ManagedType::class(class), value)
    }

    pub fn double(n: f64) -> Self {
        Self::new(ManagedType::Double, n)
    }

    pub fn byte(n: i8) -> Self {
        Self::new(ManagedType::Byte, n)
    }

    pub fn short(n: i16) -> Self {
        Self::new(ManagedType::Short, n)
    }

    /// The constant of `class` called `name`, if `class` is an enum that
    /// declares it.
    pub fn enum_constant(class: &Arc<ClassInfo>, name: &str) -> Option<Self> {
        if !class.is_enum() {
            return None;
        }
        let ordinal = class.ordinal_of(name)?;
        Some(Self::instance(
            class,
            EnumConstant {
                ordinal,
                name: name.to_string(),
            },
        ))
    }

    pub fn int(n: i32) -> Self {
        Self::new(ManagedType::Int, n)
    }

    pub fn long(n: i64) -> Self {
        Self::new(ManagedType::Long, n)
    }

    pub fn bool(b: bool) -> Self {
        Self::new(ManagedType::Bool, b)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::new(ManagedType::Text, s.into())
    }

    pub fn void() -> Self {
        Self::new(ManagedType::Void, ())
    }

    pub fn tagged(v: TaggedValue) -> Self {
        Self::new(ManagedType::Tagged, v)
    }

    /// An immutable one-dimensional array of `elem`.
    pub fn array(elem: ManagedType, items: Vec<Object>) -> Self {
        Self::new(ManagedType::array(elem), items)
    }

    pub fn list(elem: ManagedType, items: Vec<Object>) -> Self {
        Self::new(ManagedType::list(elem), ManagedList::new(items))
    }

    pub fn set(elem: ManagedType, items: Vec<Object>) -> Self {
        Self::new(ManagedType::set(elem), ManagedSet::from_items(items))
    }

    pub fn managed_type(&self) -> &ManagedType {
        &self.ty
    }

    pub fn identity(&self) -> ObjectId {
        ObjectId(Arc::as_ptr(&self.value) as *const () as usize)
    }

    pub fn same_identity(&self, other: &Object) -> bool {
        self.identity() == other.identity()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.downcast_ref::<f64>().copied()
    }

    pub fn as_i8(&self) -> Option<i8> {
        self.downcast_ref::<i8>().copied()
    }

    pub fn as_i16(&self) -> Option<i16> {
        self.downcast_ref::<i16>().copied()
    }

    pub fn as_enum(&self) -> Option<&EnumConstant> {
        self.downcast_ref::<EnumConstant>()
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.downcast_ref::<i32>().copied()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.downcast_ref::<i64>().copied()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.downcast_ref::<bool>().copied()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.downcast_ref::<String>().map(String::as_str)
    }

    pub fn as_tagged(&self) -> Option<&TaggedValue> {
        self.downcast_ref::<TaggedValue>()
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        self.downcast_ref::<Vec<Object>>().map(Vec::as_slice)
    }

    pub fn as_list(&self) -> Option<&ManagedList> {
        self.downcast_ref::<ManagedList>()
    }

    pub fn as_set(&self) -> Option<&ManagedSet> {
        self.downcast_ref::<ManagedSet>()
    }

    /// Scalars compare by value, everything else by identity.
    pub fn value_eq(&self, other: &Object) -> bool {
        if self.same_identity(other) {
            return true;
        }
        match (&self.ty, &other.ty) {
            (ManagedType::Double, ManagedType::Double) => self.as_f64() == other.as_f64(),
            (ManagedType::Byte, ManagedType::Byte) => self.as_i8() == other.as_i8(),
            (ManagedType::Short, ManagedType::Short) => self.as_i16() == other.as_i16(),
            (ManagedType::Int, ManagedType::Int) => self.as_i32() == other.as_i32(),
            (ManagedType::Class(a), ManagedType::Class(b)) if a == b && a.is_enum() => {
                self.as_enum().is_some_and(|e| Some(e) == other.as_enum())
            }
            (ManagedType::Long, ManagedType::Long) => self.as_i64() == other.as_i64(),
            (ManagedType::Bool, ManagedType::Bool) => self.as_bool() == other.as_bool(),
            (ManagedType::Text, ManagedType::Text) => self.as_str() == other.as_str(),
            (ManagedType::Void, ManagedType::Void) => true,
            (ManagedType::Tagged, ManagedType::Tagged) => self.as_tagged() == other.as_tagged(),
            _ => false,
        }
    }

    /// Short human-readable rendering used in logs and heap dumps.
    pub fn describe(&self) -> String {
        if let Some(n) = self.as_f64() {
            return n.to_string();
        }
        if let Some(n) = self.as_i32() {
            return n.to_string();
        }
        if let Some(n) = self.as_i8() {
            return n.to_string();
        }
        if let Some(n) = self.as_i16() {
            return n.to_string();
        }
        if let Some(e) = self.as_enum() {
            return format!("{}.{}", self.ty, e.name);
        }
        if let Some(n) = self.as_i64() {
            return n.to_string();
        }
        if let Some(b) = self.as_bool() {
            return b.to_string();
        }
        if let Some(s) = self.as_str() {
            return format!("{s:?}");
        }
        if let Some(v) = self.as_tagged() {
            return format!("{v:?}");
        }
        if let Some(items) = self.as_array() {
            return format!("{}[{}]", self.ty, items.len());
        }
        if let Some(list) = self.as_list() {
            return format!("{}(size {})", self.ty, list.len());
        }
        if let Some(set) = self.as_set() {
            return format!("{}(size {})", self.ty, set.len());
        }
        format!("{}@{:x}", self.ty, self.identity().0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.ty.to_string())
            .field("value", &self.describe())
            .finish()
    }
}

/// Growable, shared list. Mutation goes through the interior lock so that
/// a handle to the list can be driven from many recalculations.
#[derive(Debug, Default)]
pub struct ManagedList {
    items: RwLock<Vec<Object>>,
}

impl ManagedList {
    pub fn new(items: Vec<Object>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Object> {
        self.items.read().get(idx).cloned()
    }

    pub fn push(&self, item: Object) {
        self.items.write().push(item);
    }

    pub fn contains(&self, item: &Object) -> bool {
        self.items.read().iter().any(|o| o.value_eq(item))
    }

    /// Copy of the current contents, taken under one lock acquisition.
    pub fn snapshot(&self) -> Vec<Object> {
        self.items.read().clone()
    }
}

/// Insertion-ordered set. Scalars are de-duplicated by value, other objects
/// by identity.
#[derive(Debug, Default)]
pub struct ManagedSet {
    items: RwLock<Vec<Object>>,
}

impl ManagedSet {
    pub fn from_items(items: Vec<Object>) -> Self {
        let set = Self::default();
        for item in items {
            set.insert(item);
        }
        set
    }

    /// Returns false if an equal element was already present.
    pub fn insert(&self, item: Object) -> bool {
        let mut items = self.items.write();
        if items.iter().any(|o| o.value_eq(&item)) {
            return false;
        }
        items.push(item);
        true
    }

    pub fn contains(&self, item: &Object) -> bool {
        self.items.read().iter().any(|o| o.value_eq(item))
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Elements in iteration order, taken under one lock acquisition.
    pub fn snapshot(&self) -> Vec<Object> {
        self.items.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_per_allocation_not_per_value() {
        let a = Object::text("x");
        let b = Object::text("x");
        assert!(!a.same_identity(&b));
        assert!(a.value_eq(&b));
        let a2 = a.clone();
        assert!(a.same_identity(&a2));
    }

    #[test]
    fn assignability_walks_classes_and_containers() {
        let shape = ClassInfo::new("Shape");
        let circle = ClassInfo::extends("Circle", &shape);
        let shape_t = ManagedType::class(&shape);
        let circle_t = ManagedType::class(&circle);

        assert!(shape_t.is_assignable_from(&circle_t));
        assert!(!circle_t.is_assignable_from(&shape_t));
        assert!(ManagedType::Any.is_assignable_from(&circle_t));
        assert!(ManagedType::Any.is_assignable_from(&ManagedType::Void));
        assert!(
            ManagedType::array(ManagedType::Any)
                .is_assignable_from(&ManagedType::array(ManagedType::Int))
        );
        assert!(
            !ManagedType::array(ManagedType::Int)
                .is_assignable_from(&ManagedType::array(ManagedType::Any))
        );
        assert!(!ManagedType::Double.is_assignable_from(&ManagedType::Int));
    }

    #[test]
    fn specificity_orders_narrow_before_generic() {
        assert!(ManagedType::Int.specificity() > ManagedType::Double.specificity());
        assert!(ManagedType::Double.specificity() > ManagedType::Any.specificity());
        let base = ClassInfo::new("Base");
        let derived = ClassInfo::extends("Derived", &base);
        assert!(
            ManagedType::class(&derived).specificity() > ManagedType::class(&base).specificity()
        );
    }

    #[test]
    fn set_deduplicates_scalars_but_keeps_distinct_objects() {
        let set = ManagedSet::default();
        assert!(set.insert(Object::int(1)));
        assert!(!set.insert(Object::int(1)));
        let cls = ClassInfo::new("Thing");
        assert!(set.insert(Object::instance(&cls, 5_u8)));
        assert!(set.insert(Object::instance(&cls, 5_u8)));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn enum_constants_compare_by_value_and_extend_the_root() {
        let color = ClassInfo::enumeration("Color", &["RED", "GREEN"]);
        assert!(color.is_enum());
        assert!(!ClassInfo::enum_root().is_enum());
        assert!(!ClassInfo::new("Plain").is_enum());
        assert!(
            ManagedType::class(ClassInfo::enum_root()).is_assignable_from(&ManagedType::class(&color))
        );

        let a = Object::enum_constant(&color, "GREEN").unwrap();
        let b = Object::enum_constant(&color, "GREEN").unwrap();
        assert!(a.value_eq(&b));
        assert_eq!(a.as_enum().map(|e| e.ordinal), Some(1));
        assert_eq!(a.describe(), "Color.GREEN");
        assert!(Object::enum_constant(&color, "green").is_none());
        assert!(Object::enum_constant(&ClassInfo::new("Plain"), "RED").is_none());
    }

    #[test]
    fn narrow_integers_outrank_wider_ones() {
        assert!(ManagedType::Byte.specificity() > ManagedType::Short.specificity());
        assert!(ManagedType::Short.specificity() > ManagedType::Int.specificity());
        assert!(Object::short(7).value_eq(&Object::short(7)));
        assert!(!Object::short(7).value_eq(&Object::int(7)));
        assert_eq!(Object::byte(-3).describe(), "-3");
    }
}

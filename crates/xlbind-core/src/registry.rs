//! Class metadata: constructors and methods callable by name.
//!
//! Descriptors are registered once during start-up. Each class keeps its
//! methods grouped by name in declaration order, so resolving a call only
//! filters and sorts a short list instead of scanning the whole class.

use crate::error::BridgeResult;
use crate::managed::{ManagedType, Object};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Callable body of a method or constructor. The receiver is `None` for
/// static methods and constructors.
pub type MethodBody = Arc<dyn Fn(Option<&Object>, &[Object]) -> BridgeResult<Object> + Send + Sync>;

pub const CONSTRUCTOR_NAME: &str = "<init>";

pub struct MethodDescriptor {
    name: String,
    params: Vec<ManagedType>,
    variadic: bool,
    returns: ManagedType,
    is_static: bool,
    body: MethodBody,
}

impl MethodDescriptor {
    fn build<F>(name: &str, params: Vec<ManagedType>, returns: ManagedType, is_static: bool, body: F) -> Self
    where
        F: Fn(Option<&Object>, &[Object]) -> BridgeResult<Object> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            params,
            variadic: false,
            returns,
            is_static,
            body: Arc::new(body),
        }
    }

    pub fn instance<F>(name: &str, params: Vec<ManagedType>, returns: ManagedType, body: F) -> Self
    where
        F: Fn(Option<&Object>, &[Object]) -> BridgeResult<Object> + Send + Sync + 'static,
    {
        Self::build(name, params, returns, false, body)
    }

    pub fn static_fn<F>(name: &str, params: Vec<ManagedType>, returns: ManagedType, body: F) -> Self
    where
        F: Fn(Option<&Object>, &[Object]) -> BridgeResult<Object> + Send + Sync + 'static,
    {
        Self::build(name, params, returns, true, body)
    }

    /// The return type is filled in when the constructor is added to a
    /// class.
    pub fn constructor<F>(params: Vec<ManagedType>, body: F) -> Self
    where
        F: Fn(Option<&Object>, &[Object]) -> BridgeResult<Object> + Send + Sync + 'static,
    {
        Self::build(CONSTRUCTOR_NAME, params, ManagedType::Any, true, body)
    }

    /// Make the last parameter variadic. It must be declared as an array;
    /// zero or more trailing arguments are packed into it.
    pub fn variadic(mut self) -> Self {
        self.variadic = matches!(self.params.last(), Some(ManagedType::Array(_)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ManagedType] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn returns(&self) -> &ManagedType {
        &self.returns
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Element type packed into the variadic slot.
    pub fn vararg_element(&self) -> Option<&ManagedType> {
        if self.variadic {
            self.params.last().and_then(ManagedType::element)
        } else {
            None
        }
    }

    /// Does a call with `argc` arguments fit this signature?
    pub fn accepts_arity(&self, argc: usize) -> bool {
        if self.variadic {
            argc + 1 >= self.params.len()
        } else {
            argc == self.params.len()
        }
    }

    pub fn call(&self, receiver: Option<&Object>, args: &[Object]) -> BridgeResult<Object> {
        (self.body)(receiver, args)
    }

    fn same_signature(&self, other: &MethodDescriptor) -> bool {
        self.variadic == other.variadic && self.params == other.params
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static && !self.is_constructor() {
            write!(f, "static ")?;
        }
        write!(f, "{} {}(", self.returns, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match (self.variadic && i + 1 == self.params.len(), p.element()) {
                (true, Some(elem)) => write!(f, "{elem}...")?,
                _ => write!(f, "{p}")?,
            }
        }
        write!(f, ")")
    }
}

/// Everything callable on one managed type.
#[derive(Debug)]
pub struct ClassDescriptor {
    ty: ManagedType,
    name: String,
    aliases: Vec<String>,
    constructors: Vec<Arc<MethodDescriptor>>,
    methods: FxHashMap<String, Vec<Arc<MethodDescriptor>>>,
}

impl ClassDescriptor {
    pub fn builder(ty: ManagedType) -> ClassBuilder {
        ClassBuilder {
            name: type_key(&ty).to_string(),
            ty,
            aliases: Vec::new(),
            constructors: Vec::new(),
            methods: FxHashMap::default(),
        }
    }

    pub fn ty(&self) -> &ManagedType {
        &self.ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn constructors(&self) -> &[Arc<MethodDescriptor>] {
        &self.constructors
    }

    /// Methods declared directly on this class, in declaration order.
    pub fn declared(&self, name: &str) -> &[Arc<MethodDescriptor>] {
        self.methods.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub struct ClassBuilder {
    ty: ManagedType,
    name: String,
    aliases: Vec<String>,
    constructors: Vec<Arc<MethodDescriptor>>,
    methods: FxHashMap<String, Vec<Arc<MethodDescriptor>>>,
}

impl ClassBuilder {
    /// A short name also accepted wherever the type name is.
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn constructor(mut self, mut ctor: MethodDescriptor) -> Self {
        ctor.name = CONSTRUCTOR_NAME.to_string();
        ctor.is_static = true;
        ctor.returns = self.ty.clone();
        self.constructors.push(Arc::new(ctor));
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods
            .entry(method.name.clone())
            .or_default()
            .push(Arc::new(method));
        self
    }

    pub fn build(self) -> ClassDescriptor {
        ClassDescriptor {
            ty: self.ty,
            name: self.name,
            aliases: self.aliases,
            constructors: self.constructors,
            methods: self.methods,
        }
    }
}

/// Registry key of a managed type. Containers share one descriptor
/// whatever their element type.
pub fn type_key(ty: &ManagedType) -> &str {
    match ty {
        ManagedType::Class(c) => c.name(),
        ManagedType::List(_) => "List",
        ManagedType::Set(_) => "Set",
        ManagedType::Array(_) => "Array",
        ManagedType::Text => "String",
        ManagedType::Double => "Double",
        ManagedType::Byte => "Byte",
        ManagedType::Short => "Short",
        ManagedType::Int => "Integer",
        ManagedType::Long => "Long",
        ManagedType::Bool => "Boolean",
        ManagedType::Tagged => "TaggedValue",
        ManagedType::Void => "Void",
        ManagedType::Any => "Object",
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_name: FxHashMap<String, Arc<ClassDescriptor>>,
    aliases: FxHashMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ClassDescriptor) {
        for alias in &class.aliases {
            if let Some(prev) = self.aliases.insert(alias.clone(), class.name.clone())
                && prev != class.name
            {
                tracing::warn!(alias = %alias, from = %prev, to = %class.name, "type alias reassigned");
            }
        }
        let name = class.name.clone();
        if self.by_name.insert(name.clone(), Arc::new(class)).is_some() {
            tracing::warn!(ty = %name, "class registered twice, keeping the later one");
        }
    }

    /// Descriptor by registered name or alias.
    pub fn lookup(&self, name: &str) -> Option<&Arc<ClassDescriptor>> {
        self.by_name.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|canonical| self.by_name.get(canonical))
        })
    }

    pub fn descriptor_for(&self, ty: &ManagedType) -> Option<&Arc<ClassDescriptor>> {
        self.by_name.get(type_key(ty))
    }

    /// Methods called `name` visible on `ty`: its own first, then those
    /// inherited from each ancestor that are not overridden further down.
    pub fn methods_named(&self, ty: &ManagedType, name: &str) -> Vec<Arc<MethodDescriptor>> {
        let mut found: Vec<Arc<MethodDescriptor>> = Vec::new();
        let mut current = Some(ty.clone());
        while let Some(t) = current {
            if let Some(desc) = self.descriptor_for(&t) {
                for m in desc.declared(name) {
                    if !found.iter().any(|f| f.same_signature(m)) {
                        found.push(Arc::clone(m));
                    }
                }
            }
            current = match &t {
                ManagedType::Class(c) => c.parent().map(ManagedType::class),
                _ => None,
            };
        }
        found
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

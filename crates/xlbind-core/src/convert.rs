//! The standard rule set: scalars, blanks, pass-through host values and the
//! boxing fallback.
//!
//! [`install_standard`] registers these together with the array and
//! collection rules from [`crate::marshal`]. Embedders that want a different
//! set register rules one by one instead.

use crate::catalog::{ConvertContext, ConverterCatalog, TypeConverter, priority};
use crate::error::{BridgeError, BridgeResult};
use crate::managed::{ClassInfo, ManagedType, Object};
use crate::marshal::{ArrayConverter, JaggedArrayConverter, ListConverter, SetConverter};
use once_cell::sync::Lazy;
use std::sync::Arc;
use xlbind_common::{Shape, TaggedValue};

type IntoHost = fn(&Object) -> Option<TaggedValue>;
type FromHost = fn(&TaggedValue) -> BridgeResult<Object>;

/// A rule for a single scalar shape/type pair, driven by two plain
/// functions.
pub struct ScalarConverter {
    name: &'static str,
    shape: Shape,
    ty: ManagedType,
    priority: i32,
    into_host: IntoHost,
    from_host: FromHost,
}

impl ScalarConverter {
    pub fn new(
        name: &'static str,
        shape: Shape,
        ty: ManagedType,
        into_host: IntoHost,
        from_host: FromHost,
    ) -> Self {
        Self {
            name,
            shape,
            ty,
            priority: priority::STANDARD,
            into_host,
            from_host,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl TypeConverter for ScalarConverter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_shape(&self) -> Shape {
        self.shape
    }

    fn managed_type(&self) -> ManagedType {
        self.ty.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn to_tagged(&self, _cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        (self.into_host)(value).ok_or_else(|| {
            BridgeError::conversion(format!("{} cannot render {}", self.name, value.managed_type()))
        })
    }

    fn to_managed(
        &self,
        _cx: &ConvertContext<'_>,
        _expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        (self.from_host)(value)
    }
}

fn wrong_shape(target: &str, value: &TaggedValue) -> BridgeError {
    BridgeError::conversion(format!("cannot convert {} to {target}", value.shape()))
}

fn number_to_double(v: &TaggedValue) -> BridgeResult<Object> {
    match v {
        TaggedValue::Number(n) => Ok(Object::double(*n)),
        other => Err(wrong_shape("double", other)),
    }
}

/// Integral targets only take numbers that are exactly representable; a
/// fractional or out-of-range number is a conversion failure, not a
/// truncation.
fn integral(v: &TaggedValue, target: &str, min: f64, max: f64) -> BridgeResult<f64> {
    match v {
        TaggedValue::Number(n) if n.fract() == 0.0 && *n >= min && *n <= max => Ok(*n),
        TaggedValue::Number(n) => Err(BridgeError::conversion(format!("{n} is not a {target}"))),
        other => Err(wrong_shape(target, other)),
    }
}

fn number_to_byte(v: &TaggedValue) -> BridgeResult<Object> {
    integral(v, "byte", f64::from(i8::MIN), f64::from(i8::MAX)).map(|n| Object::byte(n as i8))
}

fn number_to_short(v: &TaggedValue) -> BridgeResult<Object> {
    integral(v, "short", f64::from(i16::MIN), f64::from(i16::MAX)).map(|n| Object::short(n as i16))
}

fn number_to_int(v: &TaggedValue) -> BridgeResult<Object> {
    integral(v, "int", f64::from(i32::MIN), f64::from(i32::MAX)).map(|n| Object::int(n as i32))
}

fn number_to_long(v: &TaggedValue) -> BridgeResult<Object> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    match v {
        TaggedValue::Number(n)
            if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 =>
        {
            Ok(Object::long(*n as i64))
        }
        TaggedValue::Number(n) => Err(BridgeError::conversion(format!("{n} is not a long"))),
        other => Err(wrong_shape("long", other)),
    }
}

fn text_to_byte(v: &TaggedValue) -> BridgeResult<Object> {
    match v {
        TaggedValue::Text(s) => s
            .parse::<i8>()
            .map(Object::byte)
            .map_err(|e| BridgeError::conversion(format!("{s:?} is not a byte: {e}"))),
        other => Err(wrong_shape("byte", other)),
    }
}

fn boolean_to_bool(v: &TaggedValue) -> BridgeResult<Object> {
    match v {
        TaggedValue::Boolean(b) => Ok(Object::bool(*b)),
        other => Err(wrong_shape("boolean", other)),
    }
}

fn text_to_text(v: &TaggedValue) -> BridgeResult<Object> {
    match v {
        TaggedValue::Text(s) => Ok(Object::text(s.clone())),
        other => Err(wrong_shape("String", other)),
    }
}

fn blank_to_void(v: &TaggedValue) -> BridgeResult<Object> {
    match v {
        TaggedValue::Empty | TaggedValue::Missing => Ok(Object::void()),
        other => Err(wrong_shape("void", other)),
    }
}

fn double_to_number(o: &Object) -> Option<TaggedValue> {
    o.as_f64().map(TaggedValue::Number)
}

fn byte_to_number(o: &Object) -> Option<TaggedValue> {
    o.as_i8().map(|n| TaggedValue::Number(f64::from(n)))
}

fn byte_to_text(o: &Object) -> Option<TaggedValue> {
    o.as_i8().map(|n| TaggedValue::Text(n.to_string()))
}

fn short_to_number(o: &Object) -> Option<TaggedValue> {
    o.as_i16().map(|n| TaggedValue::Number(f64::from(n)))
}

fn int_to_number(o: &Object) -> Option<TaggedValue> {
    o.as_i32().map(|n| TaggedValue::Number(f64::from(n)))
}

fn long_to_number(o: &Object) -> Option<TaggedValue> {
    o.as_i64().map(|n| TaggedValue::Number(n as f64))
}

fn bool_to_boolean(o: &Object) -> Option<TaggedValue> {
    o.as_bool().map(TaggedValue::Boolean)
}

fn text_to_host(o: &Object) -> Option<TaggedValue> {
    o.as_str().map(TaggedValue::text)
}

fn void_to_empty(o: &Object) -> Option<TaggedValue> {
    (o.managed_type() == &ManagedType::Void).then_some(TaggedValue::Empty)
}

/// Hands host values to parameters declared as [`ManagedType::Tagged`]
/// unchanged, whatever their shape.
pub struct TaggedPassthrough;

impl TypeConverter for TaggedPassthrough {
    fn name(&self) -> &'static str {
        "tagged"
    }

    fn host_shape(&self) -> Shape {
        Shape::Any
    }

    fn managed_type(&self) -> ManagedType {
        ManagedType::Tagged
    }

    fn can_produce(&self, required: &ManagedType) -> bool {
        *required == ManagedType::Tagged
    }

    fn to_tagged(&self, _cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        value
            .as_tagged()
            .cloned()
            .ok_or_else(|| BridgeError::conversion("object is not a host value"))
    }

    fn to_managed(
        &self,
        _cx: &ConvertContext<'_>,
        _expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        Ok(Object::tagged(value.clone()))
    }
}

/// Enum constants travel as their names. Matching is exact, so `"red"` is
/// not a constant of an enum declaring `RED`.
pub struct EnumConverter;

impl TypeConverter for EnumConverter {
    fn name(&self) -> &'static str {
        "enum"
    }

    fn host_shape(&self) -> Shape {
        Shape::Text
    }

    fn managed_type(&self) -> ManagedType {
        ManagedType::class(ClassInfo::enum_root())
    }

    fn priority(&self) -> i32 {
        priority::ENUM
    }

    fn can_produce(&self, required: &ManagedType) -> bool {
        matches!(required, ManagedType::Class(c) if c.is_enum())
    }

    fn to_tagged(&self, _cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        value
            .as_enum()
            .map(|e| TaggedValue::text(e.name.as_str()))
            .ok_or_else(|| BridgeError::conversion(format!("{} is not an enum", value.managed_type())))
    }

    fn to_managed(
        &self,
        _cx: &ConvertContext<'_>,
        expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        let name = value.as_text().ok_or_else(|| wrong_shape("enum", value))?;
        let ManagedType::Class(class) = expected else {
            return Err(BridgeError::conversion(format!("{expected} is not an enum")));
        };
        Object::enum_constant(class, name).ok_or_else(|| {
            BridgeError::conversion(format!("{} has no constant {name:?}", class.name()))
        })
    }
}

/// Boxing fallback: any object becomes a handle, and a handle becomes
/// whatever object it names provided the declared type accepts it.
pub struct ObjectConverter;

impl TypeConverter for ObjectConverter {
    fn name(&self) -> &'static str {
        "object"
    }

    fn host_shape(&self) -> Shape {
        Shape::Handle
    }

    fn managed_type(&self) -> ManagedType {
        ManagedType::Any
    }

    fn priority(&self) -> i32 {
        priority::OBJECT_FALLBACK
    }

    // The referent's type is only known once the handle is resolved.
    fn can_produce(&self, _required: &ManagedType) -> bool {
        true
    }

    fn to_tagged(&self, cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        if let Some(TaggedValue::HandleRef(h)) = value.as_tagged() {
            return Ok(TaggedValue::HandleRef(*h));
        }
        Ok(TaggedValue::HandleRef(cx.heap.intern(value)))
    }

    fn to_managed(
        &self,
        cx: &ConvertContext<'_>,
        expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        let handle = value.as_handle().ok_or_else(|| wrong_shape("object", value))?;
        let obj = cx.heap.resolve(handle)?;
        if expected.is_assignable_from(obj.managed_type()) {
            Ok(obj)
        } else {
            Err(BridgeError::conversion(format!(
                "handle {handle} refers to {}, not {expected}",
                obj.managed_type()
            )))
        }
    }
}

fn rule(r: impl TypeConverter) -> Arc<dyn TypeConverter> {
    Arc::new(r)
}

static STANDARD_RULES: Lazy<Vec<Arc<dyn TypeConverter>>> = Lazy::new(|| {
    // Double ahead of Int and Long: a number passed to an `Object`
    // parameter becomes a double.
    vec![
        rule(ScalarConverter::new(
            "double",
            Shape::Number,
            ManagedType::Double,
            double_to_number,
            number_to_double,
        )),
        rule(ScalarConverter::new(
            "int",
            Shape::Number,
            ManagedType::Int,
            int_to_number,
            number_to_int,
        )),
        rule(ScalarConverter::new(
            "long",
            Shape::Number,
            ManagedType::Long,
            long_to_number,
            number_to_long,
        )),
        rule(ScalarConverter::new(
            "short",
            Shape::Number,
            ManagedType::Short,
            short_to_number,
            number_to_short,
        )),
        rule(ScalarConverter::new(
            "byte",
            Shape::Number,
            ManagedType::Byte,
            byte_to_number,
            number_to_byte,
        )),
        rule(ScalarConverter::new(
            "boolean",
            Shape::Boolean,
            ManagedType::Bool,
            bool_to_boolean,
            boolean_to_bool,
        )),
        rule(ScalarConverter::new(
            "string",
            Shape::Text,
            ManagedType::Text,
            text_to_host,
            text_to_text,
        )),
        rule(ScalarConverter::new(
            "empty",
            Shape::Empty,
            ManagedType::Void,
            void_to_empty,
            blank_to_void,
        )),
        rule(ScalarConverter::new(
            "missing",
            Shape::Missing,
            ManagedType::Void,
            void_to_empty,
            blank_to_void,
        )),
        rule(TaggedPassthrough),
        rule(ArrayConverter),
        rule(ListConverter),
        rule(JaggedArrayConverter),
        rule(EnumConverter),
        rule(SetConverter),
        rule(ObjectConverter),
        rule(
            ScalarConverter::new("byte-text", Shape::Text, ManagedType::Byte, byte_to_text, text_to_byte)
                .with_priority(priority::TEXT_FALLBACK),
        ),
    ]
});

/// Register every standard rule into `catalog`.
pub fn install_standard(catalog: &mut ConverterCatalog) {
    for r in STANDARD_RULES.iter() {
        catalog.register(Arc::clone(r));
    }
    tracing::debug!(rules = catalog.len(), "standard converters installed");
}

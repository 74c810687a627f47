//! Array and collection rules: host grids to and from managed arrays,
//! jagged arrays, lists and sets.
//!
//! Element conversion goes back through the catalog one cell at a time.
//! Host ranges tend to be uniform, so each direction remembers the rule it
//! used last and reuses it while the next element has the same shape (going
//! in) or runtime type (going out).

use crate::catalog::{ConvertContext, TypeConverter, priority};
use crate::error::{BridgeError, BridgeResult};
use crate::managed::{ManagedType, Object};
use std::sync::Arc;
use xlbind_common::{Shape, TaggedValue, XlArray};

/// Convert a row or column of cells to objects of type `elem`.
pub fn line_to_objects(
    cx: &ConvertContext<'_>,
    cells: &[&TaggedValue],
    elem: &ManagedType,
) -> BridgeResult<Vec<Object>> {
    let mut out = Vec::with_capacity(cells.len());
    let mut last: Option<(Shape, &Arc<dyn TypeConverter>)> = None;
    for cell in cells {
        let shape = cell.shape();
        let rule = match last {
            Some((s, r)) if s == shape => r,
            _ => {
                let r = cx.catalog.find_by_host_shape(shape, elem).ok_or_else(|| {
                    BridgeError::NoCompatibleConverter {
                        shape,
                        managed: elem.to_string(),
                    }
                })?;
                last = Some((shape, r));
                r
            }
        };
        out.push(rule.to_managed(cx, elem, cell)?);
    }
    Ok(out)
}

/// Convert objects to cells. The runtime type picks the rule; `declared` is
/// the fallback when nothing matches it.
pub fn objects_to_cells(
    cx: &ConvertContext<'_>,
    items: &[Object],
    declared: &ManagedType,
) -> BridgeResult<Vec<TaggedValue>> {
    let mut out = Vec::with_capacity(items.len());
    let mut last: Option<(&ManagedType, &Arc<dyn TypeConverter>)> = None;
    for item in items {
        let actual = item.managed_type();
        let rule = match last {
            Some((t, r)) if t == actual => r,
            _ => {
                let r = cx
                    .catalog
                    .find_by_managed_type(actual)
                    .or_else(|| cx.catalog.find_by_managed_type(declared))
                    .ok_or_else(|| BridgeError::NoReturnConverter(actual.to_string()))?;
                last = Some((actual, r));
                r
            }
        };
        out.push(rule.to_tagged(cx, item)?);
    }
    Ok(out)
}

/// The cells of a one-dimensional host range. A blank 1×1 grid is an empty
/// sequence; areas cannot be flattened into one dimension.
fn host_line<'v>(value: &'v TaggedValue, target: &ManagedType) -> BridgeResult<Vec<&'v TaggedValue>> {
    let arr = value
        .as_array()
        .ok_or_else(|| BridgeError::conversion(format!("expected an array, got {}", value.shape())))?;
    if arr.is_blank() {
        return Ok(Vec::new());
    }
    arr.line().ok_or_else(|| {
        BridgeError::conversion(format!(
            "{}x{} area cannot be converted to {target}",
            arr.row_count(),
            arr.col_count()
        ))
    })
}

fn element_of(expected: &ManagedType) -> ManagedType {
    expected.element().cloned().unwrap_or(ManagedType::Any)
}

fn row_or_blank(cells: Vec<TaggedValue>) -> TaggedValue {
    if cells.is_empty() {
        TaggedValue::Array(XlArray::blank())
    } else {
        TaggedValue::Array(XlArray::row(cells))
    }
}

fn expect_payload<T>(value: Option<T>, obj: &Object, what: &str) -> BridgeResult<T> {
    value.ok_or_else(|| {
        BridgeError::conversion(format!("{} is not {what}", obj.managed_type()))
    })
}

/// One-dimensional arrays, rendered as a single row.
pub struct ArrayConverter;

impl TypeConverter for ArrayConverter {
    fn name(&self) -> &'static str {
        "array"
    }

    fn host_shape(&self) -> Shape {
        Shape::Array
    }

    fn managed_type(&self) -> ManagedType {
        ManagedType::array(ManagedType::Any)
    }

    fn can_produce(&self, required: &ManagedType) -> bool {
        matches!(required, ManagedType::Array(_) | ManagedType::Any)
    }

    fn to_tagged(&self, cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        let items = expect_payload(value.as_array(), value, "an array")?;
        let elem = element_of(value.managed_type());
        Ok(row_or_blank(objects_to_cells(cx, items, &elem)?))
    }

    fn to_managed(
        &self,
        cx: &ConvertContext<'_>,
        expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        let elem = element_of(expected);
        let line = host_line(value, expected)?;
        Ok(Object::array(elem.clone(), line_to_objects(cx, &line, &elem)?))
    }
}

/// Arrays of arrays. Output is padded to the longest row; input trims
/// trailing blanks from each row.
pub struct JaggedArrayConverter;

impl TypeConverter for JaggedArrayConverter {
    fn name(&self) -> &'static str {
        "jagged-array"
    }

    fn host_shape(&self) -> Shape {
        Shape::Array
    }

    fn managed_type(&self) -> ManagedType {
        ManagedType::array(ManagedType::array(ManagedType::Any))
    }

    fn priority(&self) -> i32 {
        priority::JAGGED
    }

    fn can_produce(&self, required: &ManagedType) -> bool {
        matches!(required, ManagedType::Array(inner) if matches!(**inner, ManagedType::Array(_)))
    }

    fn to_tagged(&self, cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        let outer = expect_payload(value.as_array(), value, "an array")?;
        let inner_ty = element_of(value.managed_type());
        let declared = element_of(&inner_ty);
        let mut rows = Vec::with_capacity(outer.len());
        for row in outer {
            let items = expect_payload(row.as_array(), row, "an array")?;
            rows.push(objects_to_cells(cx, items, &declared)?);
        }
        Ok(TaggedValue::Array(XlArray::new(rows)))
    }

    fn to_managed(
        &self,
        cx: &ConvertContext<'_>,
        expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        let inner_ty = element_of(expected);
        let elem = element_of(&inner_ty);
        let arr = value
            .as_array()
            .ok_or_else(|| BridgeError::conversion(format!("expected an array, got {}", value.shape())))?;
        if arr.is_blank() {
            return Ok(Object::array(inner_ty, Vec::new()));
        }
        let mut rows = Vec::with_capacity(arr.row_count());
        for row in arr.rows() {
            let used = row
                .iter()
                .rposition(|c| *c != TaggedValue::Empty)
                .map_or(0, |i| i + 1);
            let cells: Vec<&TaggedValue> = row[..used].iter().collect();
            rows.push(Object::array(elem.clone(), line_to_objects(cx, &cells, &elem)?));
        }
        Ok(Object::array(inner_ty, rows))
    }
}

/// Lists, rendered as a single row.
pub struct ListConverter;

impl TypeConverter for ListConverter {
    fn name(&self) -> &'static str {
        "list"
    }

    fn host_shape(&self) -> Shape {
        Shape::Array
    }

    fn managed_type(&self) -> ManagedType {
        ManagedType::list(ManagedType::Any)
    }

    fn can_produce(&self, required: &ManagedType) -> bool {
        matches!(required, ManagedType::List(_))
    }

    fn to_tagged(&self, cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        let list = expect_payload(value.as_list(), value, "a list")?;
        let elem = element_of(value.managed_type());
        Ok(row_or_blank(objects_to_cells(cx, &list.snapshot(), &elem)?))
    }

    fn to_managed(
        &self,
        cx: &ConvertContext<'_>,
        expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        let elem = element_of(expected);
        let line = host_line(value, expected)?;
        Ok(Object::list(elem.clone(), line_to_objects(cx, &line, &elem)?))
    }
}

/// Sets, rendered as a single column in iteration order.
pub struct SetConverter;

impl TypeConverter for SetConverter {
    fn name(&self) -> &'static str {
        "set"
    }

    fn host_shape(&self) -> Shape {
        Shape::Array
    }

    fn managed_type(&self) -> ManagedType {
        ManagedType::set(ManagedType::Any)
    }

    fn priority(&self) -> i32 {
        priority::COLLECTION
    }

    fn can_produce(&self, required: &ManagedType) -> bool {
        matches!(required, ManagedType::Set(_))
    }

    fn to_tagged(&self, cx: &ConvertContext<'_>, value: &Object) -> BridgeResult<TaggedValue> {
        let set = expect_payload(value.as_set(), value, "a set")?;
        let elem = element_of(value.managed_type());
        let cells = objects_to_cells(cx, &set.snapshot(), &elem)?;
        if cells.is_empty() {
            return Ok(TaggedValue::Array(XlArray::blank()));
        }
        Ok(TaggedValue::Array(XlArray::column(cells)))
    }

    fn to_managed(
        &self,
        cx: &ConvertContext<'_>,
        expected: &ManagedType,
        value: &TaggedValue,
    ) -> BridgeResult<Object> {
        let elem = element_of(expected);
        let line = host_line(value, expected)?;
        Ok(Object::set(elem.clone(), line_to_objects(cx, &line, &elem)?))
    }
}

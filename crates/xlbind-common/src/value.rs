use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

use crate::XlError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque reference to an object living on the bridge heap.
///
/// Rendered unsigned, the way the host displays it in a cell.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

impl ObjectHandle {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ObjectHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a grid is laid out. Drives marshalling into one-dimensional
/// managed sequences.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ArrayOrientation {
    Row,
    Column,
    Area,
}

/// A rectangular, row-major grid of host values.
///
/// Construction pads ragged rows on the right with [`TaggedValue::Empty`]
/// and never yields a zero-sized grid: the host cannot represent one, so an
/// empty input becomes a single `Empty` cell.
///
/// Serialized as its rows; deserializing goes back through [`XlArray::new`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(from = "Vec<Vec<TaggedValue>>", into = "Vec<Vec<TaggedValue>>")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct XlArray {
    rows: Vec<Vec<TaggedValue>>,
    width: usize,
    orientation: ArrayOrientation,
}

impl XlArray {
    pub fn new(mut rows: Vec<Vec<TaggedValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if rows.is_empty() || width == 0 {
            return Self::blank();
        }
        for row in rows.iter_mut() {
            row.resize(width, TaggedValue::Empty);
        }
        let orientation = if rows.len() == 1 {
            ArrayOrientation::Row
        } else if width <= 1 {
            ArrayOrientation::Column
        } else {
            ArrayOrientation::Area
        };
        Self {
            rows,
            width,
            orientation,
        }
    }

    /// A single-row grid.
    pub fn row(values: Vec<TaggedValue>) -> Self {
        Self::new(vec![values])
    }

    /// A single-column grid.
    pub fn column(values: Vec<TaggedValue>) -> Self {
        Self::new(values.into_iter().map(|v| vec![v]).collect())
    }

    /// The 1×1 grid holding only the empty marker.
    pub fn blank() -> Self {
        Self {
            rows: vec![vec![TaggedValue::Empty]],
            width: 1,
            orientation: ArrayOrientation::Row,
        }
    }

    pub fn rows(&self) -> &[Vec<TaggedValue>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<TaggedValue>> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.width
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&TaggedValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn orientation(&self) -> ArrayOrientation {
        self.orientation
    }

    pub fn is_row(&self) -> bool {
        self.orientation == ArrayOrientation::Row
    }

    pub fn is_column(&self) -> bool {
        self.orientation == ArrayOrientation::Column
    }

    pub fn is_area(&self) -> bool {
        self.orientation == ArrayOrientation::Area
    }

    /// True for the 1×1 grid holding only the empty marker.
    pub fn is_blank(&self) -> bool {
        self.rows.len() == 1
            && self.width == 1
            && self.get(0, 0) == Some(&TaggedValue::Empty)
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &TaggedValue> {
        self.rows.iter().flat_map(|r| r.iter())
    }

    /// The cells of a row or column grid in order; `None` for an area.
    pub fn line(&self) -> Option<Vec<&TaggedValue>> {
        match self.orientation {
            ArrayOrientation::Row => Some(self.rows.first()?.iter().collect()),
            ArrayOrientation::Column => Some(self.rows.iter().filter_map(|r| r.first()).collect()),
            ArrayOrientation::Area => None,
        }
    }
}

impl From<Vec<Vec<TaggedValue>>> for XlArray {
    fn from(rows: Vec<Vec<TaggedValue>>) -> Self {
        XlArray::new(rows)
    }
}

impl From<XlArray> for Vec<Vec<TaggedValue>> {
    fn from(arr: XlArray) -> Self {
        arr.rows
    }
}

impl Hash for XlArray {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rows.hash(state);
    }
}

/// The payload-free discriminant of a [`TaggedValue`].
///
/// Converter rules declare the shape they accept; `Any` accepts every shape.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shape {
    Number,
    Text,
    Boolean,
    Array,
    Handle,
    Error,
    Empty,
    Missing,
    Any,
}

impl Shape {
    /// Whether a value of shape `supplied` may be handed to something
    /// declared to accept `self`.
    pub fn accepts(self, supplied: Shape) -> bool {
        self == Shape::Any || self == supplied
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::Number => "Number",
            Shape::Text => "Text",
            Shape::Boolean => "Boolean",
            Shape::Array => "Array",
            Shape::Handle => "Handle",
            Shape::Error => "Error",
            Shape::Empty => "Empty",
            Shape::Missing => "Missing",
            Shape::Any => "Any",
        })
    }
}

/// Everything the calculation host can hold in a cell or pass as an
/// argument. Immutable once built.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    Array(XlArray),
    HandleRef(ObjectHandle),
    Error(XlError),
    Empty,   // blank cell / padding marker
    Missing, // omitted optional argument
}

impl Hash for TaggedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            TaggedValue::Number(n) => n.to_bits().hash(state),
            TaggedValue::Text(s) => s.hash(state),
            TaggedValue::Boolean(b) => b.hash(state),
            TaggedValue::Array(a) => a.hash(state),
            TaggedValue::HandleRef(h) => h.hash(state),
            TaggedValue::Error(e) => e.hash(state),
            TaggedValue::Empty => state.write_u8(0),
            TaggedValue::Missing => state.write_u8(1),
        }
    }
}

impl Eq for TaggedValue {}

impl Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Number(n) => write!(f, "{n}"),
            TaggedValue::Text(s) => write!(f, "{s}"),
            TaggedValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            TaggedValue::Array(a) => write!(f, "{:?}", a.rows()),
            TaggedValue::HandleRef(h) => write!(f, "#handle:{h}"),
            TaggedValue::Error(e) => write!(f, "{e}"),
            TaggedValue::Empty | TaggedValue::Missing => Ok(()),
        }
    }
}

impl TaggedValue {
    pub fn shape(&self) -> Shape {
        match self {
            TaggedValue::Number(_) => Shape::Number,
            TaggedValue::Text(_) => Shape::Text,
            TaggedValue::Boolean(_) => Shape::Boolean,
            TaggedValue::Array(_) => Shape::Array,
            TaggedValue::HandleRef(_) => Shape::Handle,
            TaggedValue::Error(_) => Shape::Error,
            TaggedValue::Empty => Shape::Empty,
            TaggedValue::Missing => Shape::Missing,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        TaggedValue::Text(s.into())
    }

    pub fn as_handle(&self) -> Option<ObjectHandle> {
        match self {
            TaggedValue::HandleRef(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TaggedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TaggedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&XlArray> {
        match self {
            TaggedValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TaggedValue::Error(_))
    }
}

impl From<f64> for TaggedValue {
    fn from(n: f64) -> Self {
        TaggedValue::Number(n)
    }
}

impl From<bool> for TaggedValue {
    fn from(b: bool) -> Self {
        TaggedValue::Boolean(b)
    }
}

impl From<&str> for TaggedValue {
    fn from(s: &str) -> Self {
        TaggedValue::Text(s.to_string())
    }
}

impl From<String> for TaggedValue {
    fn from(s: String) -> Self {
        TaggedValue::Text(s)
    }
}

impl From<ObjectHandle> for TaggedValue {
    fn from(h: ObjectHandle) -> Self {
        TaggedValue::HandleRef(h)
    }
}

impl From<XlArray> for TaggedValue {
    fn from(a: XlArray) -> Self {
        TaggedValue::Array(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_right_padded() {
        let arr = XlArray::new(vec![
            vec![TaggedValue::Boolean(true)],
            vec![
                TaggedValue::Boolean(false),
                TaggedValue::Boolean(false),
                TaggedValue::Boolean(true),
            ],
        ]);
        assert_eq!(arr.row_count(), 2);
        assert_eq!(arr.col_count(), 3);
        assert_eq!(arr.get(0, 1), Some(&TaggedValue::Empty));
        assert_eq!(arr.get(0, 2), Some(&TaggedValue::Empty));
        assert!(arr.is_area());
    }

    #[test]
    fn empty_input_becomes_single_blank_cell() {
        for arr in [XlArray::new(vec![]), XlArray::new(vec![vec![], vec![]]), XlArray::row(vec![])] {
            assert_eq!(arr.row_count(), 1);
            assert_eq!(arr.col_count(), 1);
            assert!(arr.is_blank());
        }
    }

    #[test]
    fn orientation_follows_shape() {
        let row = XlArray::row(vec![1.0.into(), 2.0.into()]);
        assert!(row.is_row());
        let col = XlArray::column(vec![1.0.into(), 2.0.into(), 3.0.into()]);
        assert!(col.is_column());
        assert_eq!(col.line().map(|l| l.len()), Some(3));
        let single = XlArray::row(vec![1.0.into()]);
        assert!(single.is_row());
        let area = XlArray::new(vec![vec![1.0.into(), 2.0.into()], vec![3.0.into()]]);
        assert!(area.is_area());
        assert!(area.line().is_none());
    }

    #[test]
    fn shapes_and_acceptance() {
        assert_eq!(TaggedValue::HandleRef(ObjectHandle(7)).shape(), Shape::Handle);
        assert!(Shape::Any.accepts(Shape::Text));
        assert!(Shape::Number.accepts(Shape::Number));
        assert!(!Shape::Number.accepts(Shape::Text));
    }

    #[test]
    fn handles_display_unsigned() {
        assert_eq!(ObjectHandle(u64::MAX).to_string(), "18446744073709551615");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn handles_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&ObjectHandle(12)).unwrap(), "12");
        let v: TaggedValue = serde_json::from_str(r#"{"HandleRef":12}"#).unwrap();
        assert_eq!(v, TaggedValue::HandleRef(ObjectHandle(12)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn grids_deserialize_through_the_constructor() {
        let v: TaggedValue = serde_json::from_str(r#"{"Array":[]}"#).unwrap();
        let arr = v.as_array().unwrap();
        assert!(arr.is_blank());
        assert_eq!(arr.line().map(|l| l.len()), Some(1));

        let ragged: XlArray = serde_json::from_str(r#"[[{"Number":1.0}],[{"Number":2.0},"Empty"]]"#).unwrap();
        assert_eq!((ragged.row_count(), ragged.col_count()), (2, 2));
        assert!(ragged.is_area());
        assert_eq!(serde_json::to_string(&XlArray::blank()).unwrap(), r#"[["Empty"]]"#);
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A concrete leaf value.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view of this value, when it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(_) | Value::Text(_) => None,
        }
    }

    pub fn is_numerical(&self) -> bool {
        self.as_f64().is_some()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// A concrete sample conforming to some [`Domain`](crate::Domain).
///
/// Boxes produce tuples of `Real` coordinates (even in one dimension),
/// discrete boxes tuples of `Int`, arrays and variable lists tuples of
/// element points, structs records keyed by field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Point {
    Leaf(Value),
    Tuple(Vec<Point>),
    Record(BTreeMap<String, Point>),
}

impl Point {
    /// Look up a struct field.
    pub fn field(&self, name: &str) -> Option<&Point> {
        match self {
            Point::Record(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Look up a tuple element.
    pub fn get(&self, index: usize) -> Option<&Point> {
        match self {
            Point::Tuple(items) => items.get(index),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Point::Leaf(_) => 1,
            Point::Tuple(items) => items.len(),
            Point::Record(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Point::Leaf(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric value of a leaf or of a one-coordinate tuple such as a 1-D box point.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Point::Leaf(v) => v.as_f64(),
            Point::Tuple(items) if items.len() == 1 => items[0].scalar(),
            _ => None,
        }
    }

    /// Walk a dotted path of field names and indices, e.g. `cars.1.heading`.
    pub fn at_path(&self, path: &str) -> Option<&Point> {
        path.split('.')
            .filter(|seg| !seg.is_empty())
            .try_fold(self, |point, seg| match seg.parse::<usize>() {
                Ok(i) if matches!(point, Point::Tuple(_)) => point.get(i),
                _ => point.field(seg),
            })
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Point::Leaf(_) => "leaf",
            Point::Tuple(_) => "tuple",
            Point::Record(_) => "record",
        }
    }
}

impl From<Value> for Point {
    fn from(v: Value) -> Self {
        Point::Leaf(v)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Leaf(v) => write!(f, "{v}"),
            Point::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Point::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, item)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The numeric-sampler view of a point: `[0,1]` continuous coordinates
/// followed by the integer-interval coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardVector {
    pub continuous: Vec<f64>,
    pub discrete: Vec<i64>,
}

impl StandardVector {
    pub fn new(continuous: Vec<f64>, discrete: Vec<i64>) -> Self {
        Self {
            continuous,
            discrete,
        }
    }

    pub fn continuous(continuous: Vec<f64>) -> Self {
        Self {
            continuous,
            discrete: Vec::new(),
        }
    }

    pub fn discrete(discrete: Vec<i64>) -> Self {
        Self {
            continuous: Vec::new(),
            discrete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_unwraps_single_coordinate_tuple() {
        let p = Point::Tuple(vec![Point::Leaf(Value::Real(2.5))]);
        assert_eq!(p.scalar(), Some(2.5));

        let two = Point::Tuple(vec![
            Point::Leaf(Value::Real(1.0)),
            Point::Leaf(Value::Real(2.0)),
        ]);
        assert_eq!(two.scalar(), None);
    }

    #[test]
    fn test_at_path_mixes_fields_and_indices() {
        let mut car = BTreeMap::new();
        car.insert(
            "heading".to_string(),
            Point::Tuple(vec![Point::Leaf(Value::Real(0.5))]),
        );
        let cars = Point::Tuple(vec![Point::Record(BTreeMap::new()), Point::Record(car)]);
        let mut root = BTreeMap::new();
        root.insert("cars".to_string(), cars);
        let root = Point::Record(root);

        let heading = root.at_path("cars.1.heading").unwrap();
        assert_eq!(heading.scalar(), Some(0.5));
        assert!(root.at_path("cars.7").is_none());
    }

    #[test]
    fn test_value_numeric_view() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert!(Value::Text("red".into()).as_f64().is_none());
        assert!(!Value::Bool(true).is_numerical());
    }
}

//! Structural domain model.
//!
//! A [`Domain`] is declared once and never mutated. Leaves are constants,
//! categorical sets, continuous boxes and integer boxes; composites are
//! structs, fixed-shape arrays and variable-length lists. Samplers route
//! sub-domains by the capability queries defined here rather than by
//! inspecting the variant directly.

use std::collections::BTreeMap;

use crate::error::DomainError;
use crate::value::{Point, Value};

/// The kind of a domain. Read-only: build domains through [`Domain`]'s constructors.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainKind {
    /// A single fixed value.
    Constant(Value),
    /// A finite, unordered set of opaque values.
    Categorical(Vec<Value>),
    /// A product of closed real intervals `[lo, hi]`.
    Box(Vec<(f64, f64)>),
    /// A product of inclusive integer intervals.
    DiscreteBox(Vec<(i64, i64)>),
    /// Named heterogeneous fields, iterated in sorted name order.
    Struct(BTreeMap<String, Domain>),
    /// A fixed-shape homogeneous array of one element domain.
    Array { element: Box<Domain>, shape: Vec<usize> },
    /// An element domain repeated `min_len..=max_len` times.
    VariableList {
        element: Box<Domain>,
        min_len: usize,
        max_len: usize,
    },
}

/// A structured parameter (sub)space.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    kind: DomainKind,
}

impl Domain {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self {
            kind: DomainKind::Constant(value.into()),
        }
    }

    pub fn categorical<V: Into<Value>>(
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self, DomainError> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(DomainError::EmptyCategorical);
        }
        Ok(Self {
            kind: DomainKind::Categorical(values),
        })
    }

    /// One-dimensional continuous range `[lo, hi]`.
    pub fn interval(lo: f64, hi: f64) -> Result<Self, DomainError> {
        Self::boxed([(lo, hi)])
    }

    /// Continuous box over several intervals.
    pub fn boxed(intervals: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, DomainError> {
        let intervals: Vec<(f64, f64)> = intervals.into_iter().collect();
        if intervals.is_empty() {
            return Err(DomainError::EmptyBox);
        }
        for &(lo, hi) in &intervals {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(DomainError::NonFiniteBound { lo, hi });
            }
            if lo > hi {
                return Err(DomainError::InvertedInterval { lo, hi });
            }
        }
        Ok(Self {
            kind: DomainKind::Box(intervals),
        })
    }

    /// One-dimensional inclusive integer range.
    pub fn discrete_range(lo: i64, hi: i64) -> Result<Self, DomainError> {
        Self::discrete_box([(lo, hi)])
    }

    pub fn discrete_box(
        intervals: impl IntoIterator<Item = (i64, i64)>,
    ) -> Result<Self, DomainError> {
        let intervals: Vec<(i64, i64)> = intervals.into_iter().collect();
        if intervals.is_empty() {
            return Err(DomainError::EmptyBox);
        }
        for &(lo, hi) in &intervals {
            if lo > hi {
                return Err(DomainError::InvertedIntegerInterval { lo, hi });
            }
        }
        Ok(Self {
            kind: DomainKind::DiscreteBox(intervals),
        })
    }

    pub fn structure<K: Into<String>>(fields: impl IntoIterator<Item = (K, Domain)>) -> Self {
        Self {
            kind: DomainKind::Struct(fields.into_iter().map(|(k, d)| (k.into(), d)).collect()),
        }
    }

    pub fn array(element: Domain, shape: impl Into<Vec<usize>>) -> Result<Self, DomainError> {
        let shape = shape.into();
        if shape.is_empty() {
            return Err(DomainError::EmptyShape);
        }
        if element.contains_variable_list() {
            return Err(DomainError::NestedVariableList { container: "an array" });
        }
        Ok(Self {
            kind: DomainKind::Array {
                element: Box::new(element),
                shape,
            },
        })
    }

    pub fn variable_list(element: Domain, min_len: usize, max_len: usize) -> Result<Self, DomainError> {
        if min_len > max_len {
            return Err(DomainError::InvertedLength {
                min: min_len,
                max: max_len,
            });
        }
        if element.contains_variable_list() {
            return Err(DomainError::NestedVariableList {
                container: "a variable list",
            });
        }
        Ok(Self {
            kind: DomainKind::VariableList {
                element: Box::new(element),
                min_len,
                max_len,
            },
        })
    }

    pub fn kind(&self) -> &DomainKind {
        &self.kind
    }

    /// Unchecked construction for restrictions of an already valid domain.
    pub(crate) fn from_kind(kind: DomainKind) -> Self {
        Self { kind }
    }

    /// Short human-readable label used in diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            DomainKind::Constant(v) => format!("Constant({v})"),
            DomainKind::Categorical(values) => format!("Categorical({} values)", values.len()),
            DomainKind::Box(iv) => format!("Box({}d)", iv.len()),
            DomainKind::DiscreteBox(iv) => format!("DiscreteBox({}d)", iv.len()),
            DomainKind::Struct(fields) => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("Struct{{{}}}", names.join(", "))
            }
            DomainKind::Array { element, shape } => {
                format!("Array({}, {:?})", element.describe(), shape)
            }
            DomainKind::VariableList {
                element,
                min_len,
                max_len,
            } => format!("VariableList({}, {min_len}..={max_len})", element.describe()),
        }
    }

    // ── Capability queries ───────────────────────────────────────────

    /// Number of `[0,1]` coordinates, or `None` if some part of the domain
    /// has no standardized form (categorical leaves, variable lists).
    pub fn standardized_dimension(&self) -> Option<usize> {
        match &self.kind {
            DomainKind::Constant(_) | DomainKind::DiscreteBox(_) => Some(0),
            DomainKind::Categorical(_) | DomainKind::VariableList { .. } => None,
            DomainKind::Box(iv) => Some(iv.len()),
            DomainKind::Struct(fields) => fields.values().map(Domain::standardized_dimension).sum(),
            DomainKind::Array { element, shape } => element
                .standardized_dimension()
                .map(|d| d * shape_count(shape)),
        }
    }

    /// Integer intervals of the discrete coordinates, or `None` when not standardizable.
    pub fn standardized_intervals(&self) -> Option<Vec<(i64, i64)>> {
        match &self.kind {
            DomainKind::Constant(_) | DomainKind::Box(_) => Some(Vec::new()),
            DomainKind::Categorical(_) | DomainKind::VariableList { .. } => None,
            DomainKind::DiscreteBox(iv) => Some(iv.clone()),
            DomainKind::Struct(fields) => {
                let mut out = Vec::new();
                for d in fields.values() {
                    out.extend(d.standardized_intervals()?);
                }
                Some(out)
            }
            DomainKind::Array { element, shape } => {
                let inner = element.standardized_intervals()?;
                let n = shape_count(shape);
                Some(inner.iter().copied().cycle().take(inner.len() * n).collect())
            }
        }
    }

    pub fn is_standardizable(&self) -> bool {
        self.standardized_dimension().is_some() && self.standardized_intervals().is_some()
    }

    /// Only continuous coordinates (at least one), no integer ones.
    pub fn is_continuous_standardizable(&self) -> bool {
        matches!(self.standardized_dimension(), Some(d) if d > 0)
            && matches!(self.standardized_intervals(), Some(iv) if iv.is_empty())
    }

    /// Only integer coordinates (at least one), no continuous ones.
    pub fn is_discrete_standardizable(&self) -> bool {
        self.standardized_dimension() == Some(0)
            && matches!(self.standardized_intervals(), Some(iv) if !iv.is_empty())
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, DomainKind::Categorical(_))
    }

    pub fn contains_variable_list(&self) -> bool {
        match &self.kind {
            DomainKind::VariableList { .. } => true,
            DomainKind::Struct(fields) => fields.values().any(Domain::contains_variable_list),
            DomainKind::Array { element, .. } => element.contains_variable_list(),
            _ => false,
        }
    }

    // ── Membership ───────────────────────────────────────────────────

    pub fn contains(&self, point: &Point) -> bool {
        self.check(point).is_ok()
    }

    /// Verify that `point` conforms to this domain, reporting the first offending path.
    pub fn check(&self, point: &Point) -> Result<(), DomainError> {
        self.check_at(point, "")
    }

    fn check_at(&self, point: &Point, path: &str) -> Result<(), DomainError> {
        match (&self.kind, point) {
            (DomainKind::Constant(c), Point::Leaf(v)) if c == v => Ok(()),
            (DomainKind::Categorical(values), Point::Leaf(v)) if values.contains(v) => Ok(()),
            (DomainKind::Box(iv), Point::Tuple(items)) if items.len() == iv.len() => {
                for (i, (&(lo, hi), item)) in iv.iter().zip(items).enumerate() {
                    match item {
                        Point::Leaf(Value::Real(x)) if *x >= lo && *x <= hi => {}
                        other => {
                            return Err(DomainError::mismatch(
                                &join_index(path, i),
                                format!("real in [{lo}, {hi}]"),
                                other.to_string(),
                            ))
                        }
                    }
                }
                Ok(())
            }
            (DomainKind::DiscreteBox(iv), Point::Tuple(items)) if items.len() == iv.len() => {
                for (i, (&(lo, hi), item)) in iv.iter().zip(items).enumerate() {
                    match item {
                        Point::Leaf(Value::Int(x)) if *x >= lo && *x <= hi => {}
                        other => {
                            return Err(DomainError::mismatch(
                                &join_index(path, i),
                                format!("integer in [{lo}, {hi}]"),
                                other.to_string(),
                            ))
                        }
                    }
                }
                Ok(())
            }
            (DomainKind::Struct(fields), Point::Record(record)) => {
                if fields.len() != record.len() || !fields.keys().all(|k| record.contains_key(k)) {
                    let expected: Vec<&str> = fields.keys().map(String::as_str).collect();
                    let found: Vec<&str> = record.keys().map(String::as_str).collect();
                    return Err(DomainError::mismatch(
                        path,
                        format!("fields {expected:?}"),
                        format!("fields {found:?}"),
                    ));
                }
                for (name, dom) in fields {
                    dom.check_at(&record[name], &join_field(path, name))?;
                }
                Ok(())
            }
            (DomainKind::Array { element, shape }, point) => {
                check_array(element, shape, point, path)
            }
            (
                DomainKind::VariableList {
                    element,
                    min_len,
                    max_len,
                },
                Point::Tuple(items),
            ) => {
                if items.len() < *min_len || items.len() > *max_len {
                    return Err(DomainError::mismatch(
                        path,
                        format!("list of length {min_len}..={max_len}"),
                        format!("length {}", items.len()),
                    ));
                }
                for (i, item) in items.iter().enumerate() {
                    element.check_at(item, &join_index(path, i))?;
                }
                Ok(())
            }
            (_, point) => Err(DomainError::mismatch(path, self.describe(), point.to_string())),
        }
    }

    // ── Variable-length support ──────────────────────────────────────

    /// Length ranges of every variable list, in traversal order.
    pub fn list_length_ranges(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        self.collect_lengths(&mut out);
        out
    }

    fn collect_lengths(&self, out: &mut Vec<(usize, usize)>) {
        match &self.kind {
            DomainKind::VariableList {
                min_len, max_len, ..
            } => out.push((*min_len, *max_len)),
            DomainKind::Struct(fields) => {
                for d in fields.values() {
                    d.collect_lengths(out);
                }
            }
            _ => {}
        }
    }

    /// Integer box over all list lengths, or `None` when the domain has no variable lists.
    pub fn length_domain(&self) -> Option<Domain> {
        let ranges = self.list_length_ranges();
        if ranges.is_empty() {
            return None;
        }
        Some(Domain {
            kind: DomainKind::DiscreteBox(
                ranges
                    .into_iter()
                    .map(|(lo, hi)| (lo as i64, hi as i64))
                    .collect(),
            ),
        })
    }

    /// Fixed-dimension domain obtained by pinning every variable list to a length.
    pub fn with_fixed_lengths(&self, lengths: &[usize]) -> Result<Domain, DomainError> {
        let expected = self.list_length_ranges().len();
        if lengths.len() != expected {
            return Err(DomainError::LengthCountMismatch {
                expected,
                actual: lengths.len(),
            });
        }
        let mut iter = lengths.iter().copied();
        Ok(self.fix_lengths(&mut iter))
    }

    fn fix_lengths(&self, lengths: &mut impl Iterator<Item = usize>) -> Domain {
        match &self.kind {
            DomainKind::VariableList { element, .. } => {
                let len = lengths.next().unwrap_or(0);
                Domain {
                    kind: DomainKind::Array {
                        element: element.clone(),
                        shape: vec![len],
                    },
                }
            }
            DomainKind::Struct(fields) => Domain {
                kind: DomainKind::Struct(
                    fields
                        .iter()
                        .map(|(k, d)| (k.clone(), d.fix_lengths(lengths)))
                        .collect(),
                ),
            },
            _ => self.clone(),
        }
    }
}

pub(crate) fn shape_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

pub(crate) fn join_field(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

pub(crate) fn join_index(path: &str, i: usize) -> String {
    format!("{path}[{i}]")
}

fn check_array(element: &Domain, shape: &[usize], point: &Point, path: &str) -> Result<(), DomainError> {
    match (shape.split_first(), point) {
        (None, p) => element.check_at(p, path),
        (Some((&n, rest)), Point::Tuple(items)) if items.len() == n => {
            for (i, item) in items.iter().enumerate() {
                check_array(element, rest, item, &join_index(path, i))?;
            }
            Ok(())
        }
        (Some((&n, _)), other) => Err(DomainError::mismatch(
            path,
            format!("tuple of {n} elements"),
            format!("{} of {}", other.kind_name(), other.len()),
        )),
    }
}

/// Row-major element references of an array point.
pub(crate) fn array_elements<'a>(
    shape: &[usize],
    point: &'a Point,
    path: &str,
    out: &mut Vec<(String, &'a Point)>,
) -> Result<(), DomainError> {
    match (shape.split_first(), point) {
        (None, p) => {
            out.push((path.to_string(), p));
            Ok(())
        }
        (Some((&n, rest)), Point::Tuple(items)) if items.len() == n => {
            for (i, item) in items.iter().enumerate() {
                array_elements(rest, item, &join_index(path, i), out)?;
            }
            Ok(())
        }
        (Some((&n, _)), other) => Err(DomainError::mismatch(
            path,
            format!("tuple of {n} elements"),
            format!("{} of {}", other.kind_name(), other.len()),
        )),
    }
}

/// Rebuild nested array tuples from row-major elements.
pub(crate) fn build_array(shape: &[usize], elements: &mut impl Iterator<Item = Point>) -> Point {
    match shape.split_first() {
        None => elements.next().unwrap_or(Point::Tuple(Vec::new())),
        Some((&n, rest)) => Point::Tuple((0..n).map(|_| build_array(rest, elements)).collect()),
    }
}

/// Row-major index paths of an array shape, e.g. `[0][1]`.
pub(crate) fn array_paths(shape: &[usize], path: &str) -> Vec<String> {
    match shape.split_first() {
        None => vec![path.to_string()],
        Some((&n, rest)) => (0..n)
            .flat_map(|i| array_paths(rest, &join_index(path, i)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car() -> Domain {
        Domain::structure([
            (
                "position",
                Domain::boxed([(-10.0, 10.0), (-10.0, 10.0), (0.0, 1.0)]).unwrap(),
            ),
            ("heading", Domain::interval(0.0, std::f64::consts::PI).unwrap()),
        ])
    }

    #[test]
    fn test_empty_categorical_rejected() {
        let values: Vec<Value> = vec![];
        assert_eq!(
            Domain::categorical(values).unwrap_err(),
            DomainError::EmptyCategorical
        );
    }

    #[test]
    fn test_inverted_box_rejected() {
        assert!(matches!(
            Domain::interval(5.0, 1.0),
            Err(DomainError::InvertedInterval { .. })
        ));
        assert!(matches!(
            Domain::discrete_range(3, 2),
            Err(DomainError::InvertedIntegerInterval { .. })
        ));
        assert!(Domain::interval(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_capabilities_of_leaves() {
        let b = Domain::interval(0.0, 1.0).unwrap();
        assert!(b.is_continuous_standardizable());
        assert!(!b.is_discrete_standardizable());

        let d = Domain::discrete_range(0, 12).unwrap();
        assert!(d.is_discrete_standardizable());
        assert!(!d.is_continuous_standardizable());

        let c = Domain::categorical(["red", "green"]).unwrap();
        assert!(c.is_categorical());
        assert!(!c.is_standardizable());

        let k = Domain::constant(3.0);
        assert!(k.is_standardizable());
        assert!(!k.is_continuous_standardizable());
        assert!(!k.is_discrete_standardizable());
    }

    #[test]
    fn test_capabilities_of_composites() {
        let cars = Domain::array(car(), [2]).unwrap();
        assert_eq!(cars.standardized_dimension(), Some(8));
        assert!(cars.is_continuous_standardizable());

        let mixed = Domain::structure([
            ("x", Domain::interval(0.0, 1.0).unwrap()),
            ("n", Domain::discrete_range(0, 3).unwrap()),
        ]);
        assert!(mixed.is_standardizable());
        assert!(!mixed.is_continuous_standardizable());
        assert!(!mixed.is_discrete_standardizable());

        let with_cat = Domain::structure([
            ("x", Domain::interval(0.0, 1.0).unwrap()),
            ("color", Domain::categorical(["red"]).unwrap()),
        ]);
        assert_eq!(with_cat.standardized_dimension(), None);
    }

    #[test]
    fn test_array_intervals_repeat_per_element() {
        let d = Domain::array(Domain::discrete_box([(0, 1), (5, 9)]).unwrap(), [3]).unwrap();
        let iv = d.standardized_intervals().unwrap();
        assert_eq!(iv.len(), 6);
        assert_eq!(iv[2], (0, 1));
        assert_eq!(iv[5], (5, 9));
    }

    #[test]
    fn test_nested_variable_list_rejected() {
        let list = Domain::variable_list(Domain::interval(0.0, 1.0).unwrap(), 0, 2).unwrap();
        assert!(matches!(
            Domain::array(list.clone(), [2]),
            Err(DomainError::NestedVariableList { .. })
        ));
        assert!(Domain::variable_list(list, 0, 1).is_err());
        assert!(matches!(
            Domain::variable_list(Domain::constant(1i64), 3, 1),
            Err(DomainError::InvertedLength { .. })
        ));
    }

    #[test]
    fn test_check_reports_path() {
        let d = Domain::structure([("cars", Domain::array(car(), [2]).unwrap())]);
        let mut bad_car = BTreeMap::new();
        bad_car.insert(
            "position".to_string(),
            Point::Tuple(vec![
                Point::Leaf(Value::Real(0.0)),
                Point::Leaf(Value::Real(0.0)),
                Point::Leaf(Value::Real(4.0)),
            ]),
        );
        bad_car.insert(
            "heading".to_string(),
            Point::Tuple(vec![Point::Leaf(Value::Real(1.0))]),
        );
        let cars = Point::Tuple(vec![Point::Record(bad_car.clone()), Point::Record(bad_car)]);
        let mut root = BTreeMap::new();
        root.insert("cars".to_string(), cars);

        match d.check(&Point::Record(root)) {
            Err(DomainError::PointMismatch { path, .. }) => {
                assert_eq!(path, "cars[0].position[2]")
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_lengths_replace_lists() {
        let d = Domain::structure([
            ("a", Domain::discrete_range(0, 12).unwrap()),
            (
                "b",
                Domain::variable_list(Domain::interval(0.0, 1.0).unwrap(), 0, 2).unwrap(),
            ),
        ]);
        let lengths = d.length_domain().unwrap();
        assert_eq!(lengths.standardized_intervals().unwrap(), vec![(0, 2)]);

        let fixed = d.with_fixed_lengths(&[2]).unwrap();
        assert!(!fixed.contains_variable_list());
        assert_eq!(fixed.standardized_dimension(), Some(2));
        assert!(d.with_fixed_lengths(&[]).is_err());
    }
}

//! Predicate-driven partitioning and positional rejoin of points.

use std::collections::BTreeMap;

use crate::domain::{shape_count, Domain, DomainKind};
use crate::error::DomainError;
use crate::value::Point;

impl Domain {
    /// Split off the largest parts of this domain satisfying `predicate`.
    ///
    /// Returns the matching restriction and the remainder; either side is
    /// `None` when empty. Structs recurse per field and arrays through their
    /// element domain, keeping the array shape on both sides. An array with
    /// no elements has no coordinates to claim and stays in the remainder.
    pub fn partition(&self, predicate: &dyn Fn(&Domain) -> bool) -> (Option<Domain>, Option<Domain>) {
        if predicate(self) {
            return (Some(self.clone()), None);
        }
        match self.kind() {
            DomainKind::Struct(fields) if !fields.is_empty() => {
                let mut matched = BTreeMap::new();
                let mut rest = BTreeMap::new();
                for (name, dom) in fields {
                    let (m, r) = dom.partition(predicate);
                    if let Some(m) = m {
                        matched.insert(name.clone(), m);
                    }
                    if let Some(r) = r {
                        rest.insert(name.clone(), r);
                    }
                }
                let wrap = |fields: BTreeMap<String, Domain>| {
                    (!fields.is_empty()).then(|| Domain::from_kind(DomainKind::Struct(fields)))
                };
                (wrap(matched), wrap(rest))
            }
            DomainKind::Array { shape, .. } if shape_count(shape) == 0 => (None, Some(self.clone())),
            DomainKind::Array { element, shape } => {
                let (m, r) = element.partition(predicate);
                let wrap = |element: Domain| {
                    Domain::from_kind(DomainKind::Array {
                        element: Box::new(element),
                        shape: shape.clone(),
                    })
                };
                (m.map(wrap), r.map(wrap))
            }
            _ => (None, Some(self.clone())),
        }
    }

    /// Merge points drawn from the components of a partition back into one point.
    ///
    /// Records merge field-wise and tuples element-wise; two leaves at the
    /// same position are a conflict.
    pub fn rejoin(points: impl IntoIterator<Item = Point>) -> Result<Point, DomainError> {
        let mut iter = points.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| DomainError::Rejoin("no component points".to_string()))?;
        iter.try_fold(first, |acc, p| merge(acc, p, ""))
    }
}

fn merge(left: Point, right: Point, path: &str) -> Result<Point, DomainError> {
    match (left, right) {
        (Point::Record(mut a), Point::Record(b)) => {
            for (name, pb) in b {
                let merged = match a.remove(&name) {
                    Some(pa) => merge(pa, pb, &crate::domain::join_field(path, &name))?,
                    None => pb,
                };
                a.insert(name, merged);
            }
            Ok(Point::Record(a))
        }
        (Point::Tuple(a), Point::Tuple(b)) if a.len() == b.len() => a
            .into_iter()
            .zip(b)
            .enumerate()
            .map(|(i, (pa, pb))| merge(pa, pb, &crate::domain::join_index(path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Point::Tuple),
        (a, b) => Err(DomainError::Rejoin(format!(
            "conflicting {} and {} at '{}'",
            a.kind_name(),
            b.kind_name(),
            if path.is_empty() { "<root>" } else { path }
        ))),
    }
}

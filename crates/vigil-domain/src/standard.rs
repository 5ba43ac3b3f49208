use std::collections::BTreeMap;

use crate::domain::{array_elements, build_array, join_field, shape_count, Domain, DomainKind};
use crate::error::DomainError;
use crate::value::{Point, StandardVector, Value};

impl Domain {
    /// Map a point to `[0,1]` continuous coordinates plus raw integer coordinates.
    pub fn standardize(&self, point: &Point) -> Result<StandardVector, DomainError> {
        if !self.is_standardizable() {
            return Err(DomainError::NotStandardizable(self.describe()));
        }
        self.check(point)?;
        let mut out = StandardVector::default();
        self.standardize_into(point, "", &mut out)?;
        Ok(out)
    }

    fn standardize_into(
        &self,
        point: &Point,
        path: &str,
        out: &mut StandardVector,
    ) -> Result<(), DomainError> {
        match (self.kind(), point) {
            (DomainKind::Constant(_), _) => Ok(()),
            (DomainKind::Box(iv), Point::Tuple(items)) => {
                for (&(lo, hi), item) in iv.iter().zip(items) {
                    let x = item.scalar().unwrap_or(lo);
                    let u = if hi > lo { (x - lo) / (hi - lo) } else { 0.0 };
                    out.continuous.push(u);
                }
                Ok(())
            }
            (DomainKind::DiscreteBox(_), Point::Tuple(items)) => {
                for item in items {
                    if let Some(Value::Int(n)) = item.as_value() {
                        out.discrete.push(*n);
                    }
                }
                Ok(())
            }
            (DomainKind::Struct(fields), Point::Record(record)) => {
                for (name, dom) in fields {
                    if let Some(item) = record.get(name) {
                        dom.standardize_into(item, &join_field(path, name), out)?;
                    }
                }
                Ok(())
            }
            (DomainKind::Array { element, shape }, point) => {
                let mut elements = Vec::new();
                array_elements(shape, point, path, &mut elements)?;
                for (elem_path, elem) in elements {
                    element.standardize_into(elem, &elem_path, out)?;
                }
                Ok(())
            }
            _ => Err(DomainError::NotStandardizable(self.describe())),
        }
    }

    /// Inverse of [`standardize`](Self::standardize).
    ///
    /// Continuous coordinates are clamped to `[0,1]` and integer coordinates
    /// to their intervals before mapping back.
    pub fn unstandardize(&self, vector: &StandardVector) -> Result<Point, DomainError> {
        let (Some(dim), Some(intervals)) = (self.standardized_dimension(), self.standardized_intervals())
        else {
            return Err(DomainError::NotStandardizable(self.describe()));
        };
        if vector.continuous.len() != dim || vector.discrete.len() != intervals.len() {
            return Err(DomainError::StandardLengthMismatch {
                expected_continuous: dim,
                expected_discrete: intervals.len(),
                actual_continuous: vector.continuous.len(),
                actual_discrete: vector.discrete.len(),
            });
        }
        let mut continuous = vector.continuous.as_slice();
        let mut discrete = vector.discrete.as_slice();
        Ok(self.unstandardize_from(&mut continuous, &mut discrete))
    }

    fn unstandardize_from(&self, continuous: &mut &[f64], discrete: &mut &[i64]) -> Point {
        match self.kind() {
            DomainKind::Constant(c) => Point::Leaf(c.clone()),
            DomainKind::Box(iv) => {
                let (head, rest) = continuous.split_at(iv.len());
                *continuous = rest;
                Point::Tuple(
                    iv.iter()
                        .zip(head)
                        .map(|(&(lo, hi), &u)| {
                            let x = lo + u.clamp(0.0, 1.0) * (hi - lo);
                            Point::Leaf(Value::Real(x.clamp(lo, hi)))
                        })
                        .collect(),
                )
            }
            DomainKind::DiscreteBox(iv) => {
                let (head, rest) = discrete.split_at(iv.len());
                *discrete = rest;
                Point::Tuple(
                    iv.iter()
                        .zip(head)
                        .map(|(&(lo, hi), &n)| Point::Leaf(Value::Int(n.clamp(lo, hi))))
                        .collect(),
                )
            }
            DomainKind::Struct(fields) => {
                let mut record = BTreeMap::new();
                for (name, dom) in fields {
                    record.insert(name.clone(), dom.unstandardize_from(continuous, discrete));
                }
                Point::Record(record)
            }
            DomainKind::Array { element, shape } => {
                let elements: Vec<Point> = (0..shape_count(shape))
                    .map(|_| element.unstandardize_from(continuous, discrete))
                    .collect();
                build_array(shape, &mut elements.into_iter())
            }
            // Excluded by the capability check in `unstandardize`.
            DomainKind::Categorical(_) | DomainKind::VariableList { .. } => {
                Point::Tuple(Vec::new())
            }
        }
    }
}

//! Flat coordinate view of points, used for table columns.
//!
//! Every domain has a fixed flat width. A variable list occupies one length
//! coordinate plus `max_len` element slots; slots beyond the drawn length
//! flatten to `None`.

use crate::domain::{
    array_elements, array_paths, build_array, join_field, join_index, shape_count, Domain,
    DomainKind,
};
use crate::error::DomainError;
use crate::value::{Point, Value};

impl Domain {
    /// Number of flat coordinates of any point of this domain.
    pub fn fixed_flattened_dimension(&self) -> usize {
        match self.kind() {
            DomainKind::Constant(_) | DomainKind::Categorical(_) => 1,
            DomainKind::Box(iv) => iv.len(),
            DomainKind::DiscreteBox(iv) => iv.len(),
            DomainKind::Struct(fields) => fields.values().map(Domain::fixed_flattened_dimension).sum(),
            DomainKind::Array { element, shape } => {
                element.fixed_flattened_dimension() * shape_count(shape)
            }
            DomainKind::VariableList {
                element, max_len, ..
            } => 1 + element.fixed_flattened_dimension() * max_len,
        }
    }

    pub fn flatten(&self, point: &Point) -> Result<Vec<Option<Value>>, DomainError> {
        let mut out = Vec::with_capacity(self.fixed_flattened_dimension());
        self.flatten_into(point, "", &mut out)?;
        Ok(out)
    }

    fn flatten_into(
        &self,
        point: &Point,
        path: &str,
        out: &mut Vec<Option<Value>>,
    ) -> Result<(), DomainError> {
        match (self.kind(), point) {
            (DomainKind::Constant(_) | DomainKind::Categorical(_), Point::Leaf(v)) => {
                out.push(Some(v.clone()));
                Ok(())
            }
            (DomainKind::Box(iv), Point::Tuple(items)) if items.len() == iv.len() => {
                push_leaves(items, path, out)
            }
            (DomainKind::DiscreteBox(iv), Point::Tuple(items)) if items.len() == iv.len() => {
                push_leaves(items, path, out)
            }
            (DomainKind::Struct(fields), Point::Record(record)) => {
                for (name, dom) in fields {
                    let field_path = join_field(path, name);
                    let item = record.get(name).ok_or_else(|| {
                        DomainError::mismatch(&field_path, dom.describe(), "missing field")
                    })?;
                    dom.flatten_into(item, &field_path, out)?;
                }
                Ok(())
            }
            (DomainKind::Array { element, shape }, point) => {
                let mut elements = Vec::new();
                array_elements(shape, point, path, &mut elements)?;
                for (elem_path, elem) in elements {
                    element.flatten_into(elem, &elem_path, out)?;
                }
                Ok(())
            }
            (
                DomainKind::VariableList {
                    element, max_len, ..
                },
                Point::Tuple(items),
            ) if items.len() <= *max_len => {
                out.push(Some(Value::Int(items.len() as i64)));
                for (i, item) in items.iter().enumerate() {
                    element.flatten_into(item, &join_index(path, i), out)?;
                }
                let missing = (max_len - items.len()) * element.fixed_flattened_dimension();
                out.extend(std::iter::repeat(None).take(missing));
                Ok(())
            }
            (_, point) => Err(DomainError::mismatch(path, self.describe(), point.to_string())),
        }
    }

    pub fn unflatten(&self, coords: &[Option<Value>]) -> Result<Point, DomainError> {
        let expected = self.fixed_flattened_dimension();
        if coords.len() != expected {
            return Err(DomainError::FlatLengthMismatch {
                expected,
                actual: coords.len(),
            });
        }
        let mut cursor = coords;
        self.unflatten_from(&mut cursor, "")
    }

    fn unflatten_from(&self, cursor: &mut &[Option<Value>], path: &str) -> Result<Point, DomainError> {
        match self.kind() {
            DomainKind::Constant(c) => {
                take(cursor, path)?;
                Ok(Point::Leaf(c.clone()))
            }
            DomainKind::Categorical(values) => {
                let v = take(cursor, path)?;
                if !values.contains(&v) {
                    return Err(DomainError::mismatch(path, self.describe(), v.to_string()));
                }
                Ok(Point::Leaf(v))
            }
            DomainKind::Box(iv) => {
                let mut items = Vec::with_capacity(iv.len());
                for i in 0..iv.len() {
                    let coord_path = join_index(path, i);
                    let v = take(cursor, &coord_path)?;
                    let x = v
                        .as_f64()
                        .ok_or_else(|| DomainError::mismatch(&coord_path, "real", v.to_string()))?;
                    items.push(Point::Leaf(Value::Real(x)));
                }
                Ok(Point::Tuple(items))
            }
            DomainKind::DiscreteBox(iv) => {
                let mut items = Vec::with_capacity(iv.len());
                for i in 0..iv.len() {
                    let coord_path = join_index(path, i);
                    match take(cursor, &coord_path)? {
                        Value::Int(n) => items.push(Point::Leaf(Value::Int(n))),
                        other => {
                            return Err(DomainError::mismatch(&coord_path, "integer", other.to_string()))
                        }
                    }
                }
                Ok(Point::Tuple(items))
            }
            DomainKind::Struct(fields) => {
                let mut record = std::collections::BTreeMap::new();
                for (name, dom) in fields {
                    record.insert(name.clone(), dom.unflatten_from(cursor, &join_field(path, name))?);
                }
                Ok(Point::Record(record))
            }
            DomainKind::Array { element, shape } => {
                let mut elements = Vec::with_capacity(shape_count(shape));
                for elem_path in array_paths(shape, path) {
                    elements.push(element.unflatten_from(cursor, &elem_path)?);
                }
                Ok(build_array(shape, &mut elements.into_iter()))
            }
            DomainKind::VariableList {
                element,
                min_len,
                max_len,
            } => {
                let length_path = join_field(path, "length");
                let len = match take(cursor, &length_path)? {
                    Value::Int(n) if n >= *min_len as i64 && n <= *max_len as i64 => n as usize,
                    other => {
                        return Err(DomainError::mismatch(
                            &length_path,
                            format!("length in {min_len}..={max_len}"),
                            other.to_string(),
                        ))
                    }
                };
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    items.push(element.unflatten_from(cursor, &join_index(path, i))?);
                }
                let skip = (max_len - len) * element.fixed_flattened_dimension();
                *cursor = &cursor[skip..];
                Ok(Point::Tuple(items))
            }
        }
    }

    /// Deterministic name of flat coordinate `index`, e.g. `cars[1].position[0]`.
    pub fn meaning_of_flat_coordinate(&self, index: usize) -> Option<String> {
        self.flat_columns().into_iter().nth(index).map(|(name, _)| name)
    }

    /// Whether flat coordinate `index` holds numbers.
    pub fn coordinate_is_numerical(&self, index: usize) -> Option<bool> {
        self.flat_columns().into_iter().nth(index).map(|(_, numeric)| numeric)
    }

    /// Name and numeric tag of every flat coordinate, in order.
    pub fn flat_columns(&self) -> Vec<(String, bool)> {
        let mut out = Vec::with_capacity(self.fixed_flattened_dimension());
        self.columns_into("", &mut out);
        out
    }

    fn columns_into(&self, path: &str, out: &mut Vec<(String, bool)>) {
        let leaf_name = || {
            if path.is_empty() {
                "value".to_string()
            } else {
                path.to_string()
            }
        };
        match self.kind() {
            DomainKind::Constant(v) => out.push((leaf_name(), v.is_numerical())),
            DomainKind::Categorical(_) => out.push((leaf_name(), false)),
            DomainKind::Box(iv) => {
                out.extend((0..iv.len()).map(|i| (join_index(path, i), true)));
            }
            DomainKind::DiscreteBox(iv) => {
                out.extend((0..iv.len()).map(|i| (join_index(path, i), true)));
            }
            DomainKind::Struct(fields) => {
                for (name, dom) in fields {
                    dom.columns_into(&join_field(path, name), out);
                }
            }
            DomainKind::Array { element, shape } => {
                for elem_path in array_paths(shape, path) {
                    element.columns_into(&elem_path, out);
                }
            }
            DomainKind::VariableList {
                element, max_len, ..
            } => {
                out.push((join_field(path, "length"), true));
                for i in 0..*max_len {
                    element.columns_into(&join_index(path, i), out);
                }
            }
        }
    }
}

fn push_leaves(items: &[Point], path: &str, out: &mut Vec<Option<Value>>) -> Result<(), DomainError> {
    for (i, item) in items.iter().enumerate() {
        match item {
            Point::Leaf(v) => out.push(Some(v.clone())),
            other => {
                return Err(DomainError::mismatch(
                    &join_index(path, i),
                    "leaf",
                    other.kind_name(),
                ))
            }
        }
    }
    Ok(())
}

fn take(cursor: &mut &[Option<Value>], path: &str) -> Result<Value, DomainError> {
    match cursor.split_first() {
        Some((Some(v), rest)) => {
            *cursor = rest;
            Ok(v.clone())
        }
        Some((None, _)) => Err(DomainError::mismatch(path, "a value", "missing")),
        None => Err(DomainError::mismatch(path, "a value", "end of vector")),
    }
}

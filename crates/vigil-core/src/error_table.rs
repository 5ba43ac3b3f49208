//! Error and safe tables: one row per classified sample, one column per
//! flattened coordinate plus the robustness value.
//!
//! Rows remember the index of the sample they came from, so analysis results
//! map back to the recorded points. Tables export to CSV and can be persisted
//! incrementally, one appended line per new row.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::DMatrix;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use vigil_domain::{Domain, DomainError, Point, Value};

use crate::config::AnalysisParams;
use crate::monitor::Robustness;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("no column named '{0}'")]
    UnknownColumn(String),

    #[error("robustness has {found} values but the table records {expected}")]
    RhoWidth { expected: usize, found: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub numerical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Index of the recorded sample this row came from.
    pub sample_index: usize,
    pub values: Vec<Option<Value>>,
    pub rho: Robustness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RhoShape {
    Scalar,
    Vector(usize),
}

impl RhoShape {
    fn of(rho: &Robustness) -> Self {
        match rho {
            Robustness::Scalar(_) => RhoShape::Scalar,
            Robustness::Vector(v) => RhoShape::Vector(v.len()),
        }
    }

    fn width(self) -> usize {
        match self {
            RhoShape::Scalar => 1,
            RhoShape::Vector(n) => n,
        }
    }
}

/// Principal directions of the numeric columns of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaResult {
    pub columns: Vec<String>,
    /// Column means.
    pub pivot: Vec<f64>,
    /// Unit directions, by descending explained variance.
    pub directions: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
}

/// Results of [`ErrorTable::analyze`]. Indices are row indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableAnalysis {
    pub k_closest: Option<Vec<usize>>,
    pub random: Option<Vec<usize>>,
    pub pca: Option<PcaResult>,
}

#[derive(Debug, Clone)]
pub struct ErrorTable {
    domain: Domain,
    columns: Vec<Column>,
    rows: Vec<TableRow>,
    ignored: BTreeSet<usize>,
    rho_shape: Option<RhoShape>,
}

impl ErrorTable {
    pub fn new(domain: &Domain) -> Self {
        let columns = domain
            .flat_columns()
            .into_iter()
            .map(|(name, numerical)| Column { name, numerical })
            .collect();
        Self {
            domain: domain.clone(),
            columns,
            rows: Vec::new(),
            ignored: BTreeSet::new(),
            rho_shape: None,
        }
    }

    pub fn append(
        &mut self,
        point: &Point,
        rho: Robustness,
        sample_index: usize,
    ) -> Result<(), TableError> {
        let shape = RhoShape::of(&rho);
        match self.rho_shape {
            Some(expected) if expected != shape => {
                return Err(TableError::RhoWidth {
                    expected: expected.width(),
                    found: shape.width(),
                })
            }
            Some(_) => {}
            None => self.rho_shape = Some(shape),
        }
        let values = self.domain.flatten(point)?;
        for (i, v) in values.iter().enumerate() {
            if v.is_none() {
                self.ignored.insert(i);
            }
        }
        self.rows.push(TableRow {
            sample_index,
            values,
            rho,
        });
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_by_name(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx].as_ref()).collect())
    }

    /// Columns that held a missing value in at least one row.
    pub fn ignored_columns(&self) -> Vec<&str> {
        self.ignored
            .iter()
            .map(|&i| self.columns[i].name.as_str())
            .collect()
    }

    /// Names of the robustness columns.
    pub fn rho_columns(&self) -> Vec<String> {
        match self.rho_shape {
            None | Some(RhoShape::Scalar) => vec!["rho".to_string()],
            Some(RhoShape::Vector(n)) => (0..n).map(|i| format!("rho[{i}]")).collect(),
        }
    }

    fn select(&self, names: Option<&[String]>) -> Result<Vec<usize>, TableError> {
        match names {
            None => Ok((0..self.columns.len()).collect()),
            Some(names) => names
                .iter()
                .map(|n| {
                    self.column_index(n)
                        .ok_or_else(|| TableError::UnknownColumn(n.clone()))
                })
                .collect(),
        }
    }

    /// Split the chosen columns (all when `None`) into numerical and categorical indices.
    pub fn split_columns(
        &self,
        names: Option<&[String]>,
    ) -> Result<(Vec<usize>, Vec<usize>), TableError> {
        let selected = self.select(names)?;
        Ok(selected.into_iter().partition(|&i| self.columns[i].numerical))
    }

    /// `count` distinct row indices, or every row when the table is smaller.
    pub fn random_samples<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<usize> {
        let n = self.rows.len();
        if count >= n {
            return (0..n).collect();
        }
        let mut picked = rand::seq::index::sample(rng, n, count).into_vec();
        picked.sort_unstable();
        picked
    }

    /// Row indices of the tightest cluster of `k` rows.
    ///
    /// Numeric columns are z-standardized and compared by Euclidean distance
    /// over the coordinates both rows have. Each differing categorical value
    /// adds `1 / columns`. The row whose `k` nearest rows have the smallest
    /// total distance wins, and those rows are returned nearest first.
    pub fn k_closest_samples(
        &self,
        names: Option<&[String]>,
        k: Option<usize>,
    ) -> Result<Vec<usize>, TableError> {
        let n = self.rows.len();
        let (numerical, categorical) = self.split_columns(names)?;
        let total_columns = numerical.len() + categorical.len();
        if n == 0 || total_columns == 0 {
            return Ok(Vec::new());
        }
        let k = match k {
            None => return Ok((0..n).collect()),
            Some(k) if k >= n => return Ok((0..n).collect()),
            Some(k) => k,
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let standardized: Vec<Vec<Option<f64>>> = numerical
            .iter()
            .filter_map(|&c| self.standardize_column(c))
            .collect();
        let norm = total_columns as f64;

        let distance = |i: usize, j: usize| {
            let sq: f64 = standardized
                .iter()
                .filter_map(|col| match (col[i], col[j]) {
                    (Some(a), Some(b)) => Some((a - b).powi(2)),
                    _ => None,
                })
                .sum();
            let differing = categorical
                .iter()
                .filter(|&&c| self.rows[i].values[c] != self.rows[j].values[c])
                .count();
            sq.sqrt() + differing as f64 / norm
        };

        let nearest: Vec<(f64, Vec<usize>)> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut order: Vec<(f64, usize)> = (0..n).map(|j| (distance(i, j), j)).collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                order.truncate(k);
                let sum = order.iter().map(|(d, _)| d).sum();
                (sum, order.into_iter().map(|(_, j)| j).collect())
            })
            .collect();

        Ok(nearest
            .into_iter()
            .enumerate()
            .min_by(|(ia, a), (ib, b)| a.0.total_cmp(&b.0).then(ia.cmp(ib)))
            .map(|(_, (_, rows))| rows)
            .unwrap_or_default())
    }

    // None when the column has no spread to standardize by.
    fn standardize_column(&self, col: usize) -> Option<Vec<Option<f64>>> {
        let raw: Vec<Option<f64>> = self
            .rows
            .iter()
            .map(|r| r.values[col].as_ref().and_then(Value::as_f64))
            .collect();
        let present: Vec<f64> = raw.iter().flatten().copied().collect();
        if present.len() < 2 {
            return None;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        let var = present.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
            / (present.len() - 1) as f64;
        let std = var.sqrt();
        if !(std > 0.0) {
            return None;
        }
        Some(raw.into_iter().map(|x| x.map(|x| (x - mean) / std)).collect())
    }

    /// Principal components of the chosen numeric columns, leaving out
    /// columns that ever held a missing value.
    pub fn pca_analysis(
        &self,
        names: Option<&[String]>,
        n_components: usize,
    ) -> Result<Option<PcaResult>, TableError> {
        let (numerical, _) = self.split_columns(names)?;
        let cols: Vec<usize> = numerical
            .into_iter()
            .filter(|c| !self.ignored.contains(c))
            .collect();
        let rows: Vec<Vec<f64>> = self
            .rows
            .iter()
            .filter_map(|r| {
                cols.iter()
                    .map(|&c| r.values[c].as_ref().and_then(Value::as_f64))
                    .collect::<Option<Vec<f64>>>()
            })
            .collect();
        let (n, p) = (rows.len(), cols.len());
        let n_components = n_components.min(n).min(p);
        if n_components == 0 {
            return Ok(None);
        }

        let data = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
        let pivot: Vec<f64> = (0..p).map(|j| data.column(j).mean()).collect();
        let centered = DMatrix::from_fn(n, p, |i, j| data[(i, j)] - pivot[j]);
        let cov = centered.transpose() * &centered / (n.max(2) - 1) as f64;
        let eigen = cov.symmetric_eigen();

        let mut order: Vec<usize> = (0..p).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let mut directions = Vec::with_capacity(n_components);
        let mut explained_variance = Vec::with_capacity(n_components);
        for &idx in order.iter().take(n_components) {
            let mut dir: Vec<f64> = eigen.eigenvectors.column(idx).iter().copied().collect();
            let largest = dir
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0);
            if largest < 0.0 {
                dir.iter_mut().for_each(|x| *x = -*x);
            }
            directions.push(dir);
            explained_variance.push(eigen.eigenvalues[idx].max(0.0));
        }

        Ok(Some(PcaResult {
            columns: cols.iter().map(|&c| self.columns[c].name.clone()).collect(),
            pivot,
            directions,
            explained_variance,
        }))
    }

    pub fn analyze<R: Rng + ?Sized>(
        &self,
        params: &AnalysisParams,
        rng: &mut R,
    ) -> Result<TableAnalysis, TableError> {
        let k_closest = params
            .k_closest
            .as_ref()
            .map(|p| self.k_closest_samples(p.columns.as_deref(), p.k))
            .transpose()?;
        let random = params
            .random
            .as_ref()
            .map(|p| self.random_samples(p.count, rng));
        let pca = match &params.pca {
            Some(p) => self.pca_analysis(p.columns.as_deref(), p.n_components)?,
            None => None,
        };
        Ok(TableAnalysis {
            k_closest,
            random,
            pca,
        })
    }

    fn header_line(&self) -> String {
        std::iter::once("index".to_string())
            .chain(self.columns.iter().map(|c| csv_field(&c.name)))
            .chain(self.rho_columns().iter().map(|c| csv_field(c)))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn row_line(&self, row: &TableRow) -> String {
        std::iter::once(row.sample_index.to_string())
            .chain(row.values.iter().map(|v| match v {
                Some(v) => csv_field(&v.to_string()),
                None => String::new(),
            }))
            .chain(row.rho.values().iter().map(f64::to_string))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Write the header and every row to `path`, replacing its contents.
    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{}", self.header_line())?;
        for row in &self.rows {
            writeln!(out, "{}", self.row_line(row))?;
        }
        out.flush()?;
        Ok(())
    }

    /// Persist the newest row: header and row for the first one, a single
    /// appended line after that.
    pub fn append_csv(&self, path: &Path) -> Result<(), TableError> {
        let Some(last) = self.rows.last() else {
            return Ok(());
        };
        if self.rows.len() == 1 || !path.exists() {
            return self.write_csv(path);
        }
        let mut file = OpenOptions::new().append(true).open(path)?;
        writeln!(file, "{}", self.row_line(last))?;
        Ok(())
    }
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn scene() -> Domain {
        Domain::structure([
            ("x", Domain::interval(0.0, 10.0).unwrap()),
            ("weather", Domain::categorical(["rain", "sun"]).unwrap()),
        ])
    }

    fn point(x: f64, weather: &str) -> Point {
        Point::Record(BTreeMap::from([
            ("x".to_string(), Point::Tuple(vec![Point::from(Value::Real(x))])),
            ("weather".to_string(), Point::from(Value::Text(weather.to_string()))),
        ]))
    }

    #[test]
    fn test_columns_follow_flat_coordinates() {
        let table = ErrorTable::new(&scene());
        let names: Vec<_> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["weather", "x[0]"]);
        assert!(!table.columns()[0].numerical);
        assert!(table.columns()[1].numerical);
        assert_eq!(table.rho_columns(), vec!["rho"]);
    }

    #[test]
    fn test_rho_width_is_fixed_by_first_row() {
        let mut table = ErrorTable::new(&scene());
        table.append(&point(1.0, "sun"), vec![1.0, 2.0].into(), 0).unwrap();
        assert_eq!(table.rho_columns(), vec!["rho[0]", "rho[1]"]);
        assert!(matches!(
            table.append(&point(2.0, "sun"), 0.5.into(), 1),
            Err(TableError::RhoWidth { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_k_closest_finds_tight_cluster() {
        let mut table = ErrorTable::new(&scene());
        for (i, (x, w)) in [(0.0, "sun"), (9.0, "rain"), (9.1, "rain"), (9.2, "rain"), (4.0, "sun")]
            .into_iter()
            .enumerate()
        {
            table.append(&point(x, w), (-1.0).into(), i).unwrap();
        }
        let mut closest = table.k_closest_samples(None, Some(3)).unwrap();
        closest.sort_unstable();
        assert_eq!(closest, vec![1, 2, 3]);
        assert_eq!(table.k_closest_samples(None, None).unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(table
            .k_closest_samples(Some(&["speed".to_string()]), Some(2))
            .is_err());
    }

    #[test]
    fn test_pca_direction_along_line() {
        let domain = Domain::boxed([(0.0, 10.0), (0.0, 10.0)]).unwrap();
        let mut table = ErrorTable::new(&domain);
        for i in 0..5 {
            let t = i as f64;
            let p = Point::Tuple(vec![
                Point::from(Value::Real(t)),
                Point::from(Value::Real(2.0 * t)),
            ]);
            table.append(&p, 0.0.into(), i).unwrap();
        }
        let pca = table.pca_analysis(None, 3).unwrap().unwrap();
        assert_eq!(pca.directions.len(), 2);
        assert_eq!(pca.pivot, vec![2.0, 4.0]);
        let d = &pca.directions[0];
        let s = 5.0_f64.sqrt();
        assert!((d[0] - 1.0 / s).abs() < 1e-9 && (d[1] - 2.0 / s).abs() < 1e-9);
    }

    #[test]
    fn test_random_samples_are_distinct_rows() {
        let mut table = ErrorTable::new(&scene());
        for i in 0..10 {
            table.append(&point(i as f64, "sun"), 1.0.into(), i).unwrap();
        }
        let mut rng = vigil_explore::sampler_rng(0, 0);
        let picked = table.random_samples(4, &mut rng);
        assert_eq!(picked.len(), 4);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table.random_samples(50, &mut rng).len(), 10);
    }

    #[test]
    fn test_csv_header_then_appended_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.csv");
        let mut table = ErrorTable::new(&scene());
        table.append(&point(2.5, "rain"), (-0.5).into(), 3).unwrap();
        table.append_csv(&path).unwrap();
        table.append(&point(1.0, "a,b"), (-1.0).into(), 7).unwrap();
        table.append_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["index,weather,x[0],rho", "3,rain,2.5,-0.5", "7,\"a,b\",1,-1"]);
    }
}

//! Vigil Domain: typed structural description of scenario parameter spaces.
//!
//! Provides the [`Domain`] sum type with validating constructors, the
//! structured [`Point`] samples it describes, and the conversions numeric
//! samplers and result tables rely on: standardization to `[0,1]`/integer
//! vectors, flat coordinate vectors with column names, and predicate
//! partitioning with positional rejoin.

pub mod domain;
pub mod error;
mod flat;
mod partition;
mod standard;
pub mod value;

pub use domain::{Domain, DomainKind};
pub use error::DomainError;
pub use value::{Point, StandardVector, Value};

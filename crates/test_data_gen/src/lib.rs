//! Relational fixture generator for dbsample tests.
//!
//! Produces deterministic schemas with random foreign-key graphs
//! (including self references and cycles through nullable columns) and
//! rows whose non-NULL references always point at an existing parent row.
//!
//! # Example
//!
//! ```rust
//! use test_data_gen::{Generator, Scale};
//!
//! let fixture = Generator::new(42, Scale::Small).generate();
//! assert!(!fixture.tables.is_empty());
//! ```

pub mod fake;
pub mod generator;
pub mod schema;

pub use generator::{Generator, Scale};
pub use schema::{ColumnKind, ColumnSpec, Fixture, FkSpec, TableSpec, Value};

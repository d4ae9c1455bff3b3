//! Membership reports: the row model and the queries that fill it.

pub mod model;
pub mod query;

pub use model::{FilterSelection, Report, SearchOutcome, COLUMNS};
pub use query::ReportBuilder;

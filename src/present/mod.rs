//! Presentation: the on-screen table, CSV export and the emailed report.

pub mod csv;
pub mod html;
pub mod mail;
pub mod table;

pub use table::ReportView;

//! Spreadsheet export.

mod spreadsheet;

pub use spreadsheet::*;

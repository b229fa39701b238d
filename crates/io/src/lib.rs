// File I/O: fragment loading, key lists, CSV and JSON output

pub mod csv;
pub mod json;

//! CSV data source and JSON result artifacts for wsrf.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{ExperimentName, Table};
pub use error::IoError;
pub use reader::TableReader;
pub use writer::ResultWriter;

//! Writers for the artefacts of a batch run: GraphML chain files, DOT
//! operation DAGs and the CSV result matrix.

mod csv;
mod dot;
mod graphml;

pub use csv::CsvReport;
pub use csv::ThreadReport;
pub use dot::write_dot;
pub use graphml::write_graphml;

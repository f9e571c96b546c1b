//! flashmatch-io: Sample readers and template writers for flashmatch.
//!
//! This crate reads the matched charge/flash sample and the lifetime
//! inputs from delimited text, and writes templates as JSON and per-event
//! scores as CSV.
//!

mod error;
mod events;
pub mod lifetime;
mod scores;
mod table;
mod template;

pub use error::{Error, Result};
pub use events::{parse_events, EventCsvReader};
pub use scores::ScoreCsvWriter;
pub use table::Delimiter;
pub use template::{ReportedCoefficients, TemplateDocument, TemplateWriter};

// Diary ingestion: raw tab-delimited lines to typed food records.

pub mod extract;
pub mod reader;
pub mod schema;

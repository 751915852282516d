pub mod common;
pub mod ingest;

pub use common::*;
pub use ingest::*;

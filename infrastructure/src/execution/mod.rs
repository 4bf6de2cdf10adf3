//! Execution backend adapters

mod process_backend;

pub use process_backend::ProcessBackend;

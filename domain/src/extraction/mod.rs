//! Locating a structured payload inside raw worker output.
//!
//! Workers are third-party CLIs that wrap their answer in banners, prose,
//! fenced blocks or transcript chrome. The [`OutputExtractor`] strips known
//! wrappers and then tries each [`ExtractionStrategy`] in order.

pub mod extractor;
pub mod scan;
pub mod strategy;
pub mod wrapper;

pub use extractor::{Candidate, Extraction, OutputExtractor};
pub use strategy::ExtractionStrategy;
pub use wrapper::WrapperProfile;

//! Acceptance checks for extracted worker payloads.

pub mod profile;
pub mod rejection;
pub mod rules;
pub mod template;
pub mod validator;

pub use profile::OutputProfile;
pub use rejection::{Rejection, RejectionKind};
pub use rules::ValidationRules;
pub use template::is_schema_template;
pub use validator::{ResultValidator, ValidatedPayload};

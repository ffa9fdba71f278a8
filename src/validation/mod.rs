// file: src/validation/mod.rs
// description: manifest schema registry and artifact validation exports
// reference: internal module structure

pub mod format;
pub mod registry;
pub mod validator;

pub use format::check_format;
pub use registry::{KeyShape, KeySpec, ManifestSchema, REPORT_FILE_NAME, SchemaRegistry};
pub use validator::{ValidationResult, Validator, Violation, ViolationKind};

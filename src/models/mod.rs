// Ledger request/outcome models
pub mod common;
pub mod grant;
pub mod package_ext; // Extension methods for entity::packages
pub mod recovery;
pub mod sweep;

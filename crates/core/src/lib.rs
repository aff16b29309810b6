//! Domain logic shared by the DLLP administration tools.
//!
//! Everything in this crate is synchronous and free of external service
//! access; the directory and cloud adapters live in their own crates.

pub mod contacts;
pub mod csv;
pub mod error;
pub mod import_hook;
pub mod ldap_filter;
pub mod office365;
pub mod quota_csv;
pub mod registry;

pub use error::CoreError;

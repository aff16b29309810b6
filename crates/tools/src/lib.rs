//! Configuration, orchestration and binaries of the DLLP administration
//! tools.

pub mod config;
pub mod connect;
pub mod import_batch;
pub mod logging;

//! Database schema initialization

pub mod init;

pub use init::*;

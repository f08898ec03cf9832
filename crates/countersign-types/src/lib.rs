//! core types for countersign - an ssh certificate authority signing daemon.
//!
//! this crate provides the fundamental data structures used throughout
//! countersign:
//! - [`KeyFingerprint`]: stable identifier for public keys
//! - [`RequestId`]: opaque token naming a pending certificate request
//! - [`EnvironmentPolicy`]: per-environment signing policy

#![warn(missing_docs)]

mod config;
mod fingerprint;
mod request_id;

pub use config::{ConfigError, EnvironmentPolicy, load_environments};
pub use fingerprint::{FINGERPRINT_LEN, FingerprintError, KeyFingerprint};
pub use request_id::{REQUEST_ID_LEN, RequestId, RequestIdError};

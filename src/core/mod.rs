//! Core types shared by every part of fwbundle.
//!
//! The only thing living here today is the error system:
//! - [`FwError`] - enumerated failure modes of discovery, graph construction, rendering
//!   and execution
//! - [`ErrorContext`] - user-facing wrapper with a suggestion and details
//! - [`user_friendly_error`] - converts any `anyhow::Error` into an [`ErrorContext`]

pub mod error;

pub use error::{ErrorContext, FwError, format_error_chain, user_friendly_error};

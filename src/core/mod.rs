//! Core types shared by every nvmw component.
//!
//! At the moment this is the error layer: [`NvmwError`] for typed failures and
//! [`ErrorContext`] / [`user_friendly_error`] for what the CLI prints.

pub mod error;

pub use error::{ErrorContext, NvmwError, user_friendly_error};

//! velero-watchdog library crate.
//!
//! Samples the Velero backup subsystem of a Kubernetes cluster on a fixed
//! cycle, detects changes and forwards alert text to notification
//! channels.

pub mod checker;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod scheduler;
pub mod services;
pub mod source;
pub mod utils;

pub use error::{Error, Result};

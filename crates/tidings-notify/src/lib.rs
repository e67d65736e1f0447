//! # tidings-notify
//!
//! Notifier implementations. [`LocalNotifier`] delivers payloads by invoking
//! registered callbacks directly on the publishing task.

#![deny(unsafe_code)]

pub mod local;

pub use local::LocalNotifier;

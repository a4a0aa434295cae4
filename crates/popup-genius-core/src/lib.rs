//! Core types, config, errors, and wire protocol for PopupGenius.

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

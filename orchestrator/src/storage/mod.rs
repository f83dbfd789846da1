//! Persistent settings

pub mod settings;

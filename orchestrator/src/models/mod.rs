//! Data models

pub mod analysis;
pub mod blue_green;
pub mod result;
pub mod state;

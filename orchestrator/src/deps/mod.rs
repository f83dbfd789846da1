//! Component dependency resolution and configuration wiring

pub mod graph;
pub mod manager;

pub use graph::{ComponentSpec, DependencyEdge, DependencyGraph};
pub use manager::{DependencyHealthReport, DependencyManager};

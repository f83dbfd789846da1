//! Full-stack deployment orchestration

pub mod fsm;
pub mod journey;
pub mod plan;
pub mod stack;

pub use plan::DeploymentPlan;
pub use stack::{DeploymentStatusReport, StackOrchestrator};

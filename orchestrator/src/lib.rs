//! CodeFlow Orchestrator Library
//!
//! Deploys a full-stack application (frontend, api, database) as one unit:
//! dependency-ordered provisioning with configuration injection, health
//! gating, end-to-end validation, rollback and blue/green traffic shifting.

pub mod app;
pub mod blue_green;
pub mod deps;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod probe;
pub mod provision;
pub mod storage;
pub mod store;
pub mod utils;

//! Integration tests

mod test_blue_green;
mod test_dependencies;
mod test_fsm;
mod test_orchestrator;

//! Schema-driven generation services: form state, prompt assembly, and the generation state machine.

pub mod capability;
pub mod catalog;
pub mod config;
pub mod error;
pub mod form;
pub mod gemini;
pub mod orchestrator;
pub mod prompt;
pub mod results;
pub mod routes;
pub mod schema;

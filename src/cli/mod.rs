//! CLI command implementations
//!
//! - `validate`: spec validation
//! - `graph`: graph export, impact analysis and slices
//! - `schema`: formula parsing and JSON Schema output
//! - `util`: shared loading and output helpers

pub mod graph;
pub mod schema;
pub mod util;
pub mod validate;

pub use graph::{cmd_graph, cmd_impact, cmd_slice};
pub use schema::{cmd_parse, cmd_schema};
pub use validate::cmd_validate;

/// How a successful command run should exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Ran fine but found an invalid spec or a breaking change
    Failure,
}

impl Outcome {
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

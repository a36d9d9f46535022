// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # meshspec
//!
//! Static analysis for declarative application specs.
//!
//! ## Core Concept
//!
//! A **spec** describes an application as data: entities and their fields,
//! derived values, commands with pre/postconditions, scenarios, invariants,
//! state machines, roles, and a handful of event-driven sections. Logic
//! lives in a small **formula** language embedded in the spec. meshspec
//! takes such a spec and:
//!
//! - **Parses** formulas into a typed expression tree
//! - **Builds** a dependency graph between every named element
//! - **Answers** impact questions ("what breaks if I remove X?")
//! - **Slices** out the context one command needs
//! - **Validates** the whole document and reports every problem at once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use meshspec::{validate_spec, ChangeType, Graph, NodeId, Spec};
//!
//! let spec = Spec::from_yaml(r#"
//! entities:
//!   Invoice:
//!     fields:
//!       amount: { type: decimal }
//! commands:
//!   create_invoice:
//!     pre:
//!       - expr: "amount > 0"
//!     post:
//!       - action: { create: Invoice }
//! scenarios:
//!   SC-001:
//!     when: { call: create_invoice }
//! "#)?.compiled();
//!
//! let report = validate_spec(&spec, false);
//! assert!(report.is_valid);
//!
//! let graph = Graph::build(&spec);
//! let impact = graph.analyze_impact(&NodeId::entity("Invoice"), ChangeType::Remove)?;
//! assert!(impact.affected_functions.contains("create_invoice"));
//! assert!(impact.is_breaking());
//! ```
//!
//! ## Formula language
//!
//! ```text
//! self.total * 0.2
//! sum(items.price where item.active)
//! if status = 'open' then amount else 0
//! role in ["admin", "owner"] and not archived
//! ```
//!
//! See [`formula`] for the grammar.

// Core modules
pub mod config;
pub mod error;
pub mod expr;
pub mod naming;
pub mod spec;

// Analysis modules
pub mod formula;
pub mod graph;
pub mod validate;

// Re-exports for convenience
pub use config::{MeshConfig, ProjectConfig, ValidationConfig};
pub use error::{Error, ParseError, Result};
pub use expr::{AggOp, BinaryOp, Expression, LiteralValue, UnaryOp};
pub use formula::parse;
pub use graph::{
    ChangeType, Edge, Graph, GraphBuilder, ImpactAnalysis, NodeId, NodeKind, Relation, Slice,
};
pub use naming::Confidence;
pub use spec::{Formula, Spec};
pub use validate::{
    validate_spec, validate_with_config, Category, Diagnostic, FixPatch, Severity,
    ValidationReport,
};

/// Version of meshspec
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

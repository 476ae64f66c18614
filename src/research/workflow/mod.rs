// SPDX-License-Identifier: MIT

//! Research workflow
//!
//! - `state` - the typed record a run carries between steps
//! - `graph` - the static transition table and its validation
//! - `nodes` - one node per step, each wrapping a capability
//! - `executor` - the engine that walks the graph

pub mod executor;
pub mod graph;
pub mod nodes;
pub mod state;

pub use executor::{
    Capabilities, EngineLimits, ResearchEngine, RunOutcome, RunStatus, WorkflowEvent,
};
pub use graph::{Graph, Step, Target};
pub use state::ResearchState;

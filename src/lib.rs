// SPDX-License-Identifier: MIT

//! Research assistant backend
//!
//! `adk` holds the model clients and error types, `research` the sources,
//! capabilities, workflow engine, store and HTTP server built on them.

pub mod adk;
pub mod research;

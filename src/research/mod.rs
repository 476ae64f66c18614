// SPDX-License-Identifier: MIT

pub mod config;
pub mod critic;
pub mod retriever;
pub mod server;
pub mod sources;
pub mod store;
pub mod summarizer;
pub mod workflow;

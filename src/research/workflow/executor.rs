// SPDX-License-Identifier: MIT

//! Research workflow executor
//!
//! Walks the transition table from the entry step, moving the state through
//! one node at a time. Runs are bounded three ways: a summarize retry bound
//! carried by the graph conditions, a step cap, and a wall-clock cap. A run
//! that stops early still flushes the persist step once.
//!
//! Cancellation is observed between steps only. The wall-clock cap may cut
//! short a fetch, summarize or critic step, but never a persist in progress.

use crate::adk::error::WorkflowError;
use crate::research::config::ResearchConfig;
use crate::research::critic::Critic;
use crate::research::retriever::Retriever;
use crate::research::store::ResearchStore;
use crate::research::summarizer::Summarizer;
use crate::research::workflow::graph::{Graph, Step, Target};
use crate::research::workflow::nodes::{CriticNode, FetchNode, Node, PersistNode, SummarizeNode};
use crate::research::workflow::state::ResearchState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The four backends a run depends on
#[derive(Clone)]
pub struct Capabilities {
    pub retriever: Arc<dyn Retriever>,
    pub summarizer: Arc<dyn Summarizer>,
    pub critic: Arc<dyn Critic>,
    pub store: Arc<dyn ResearchStore>,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_summarize_attempts: u32,
    pub max_steps: u32,
    pub run_timeout: Duration,
}

impl EngineLimits {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            max_summarize_attempts: config.max_summarize_attempts,
            max_steps: config.max_steps,
            run_timeout: config.run_timeout(),
        }
    }
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self::from_config(&ResearchConfig::default())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    TimedOut,
    StepLimit,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::TimedOut => "timed_out",
            RunStatus::StepLimit => "step_limit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub state: ResearchState,
    /// Steps in execution order, including a flushed persist
    pub steps: Vec<Step>,
}

/// Progress events emitted while a run executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RunStarted {
        run_id: String,
        query: String,
    },
    StepStarted {
        step: Step,
    },
    StepFinished {
        step: Step,
    },
    Transition {
        from: Step,
        to: String,
    },
    Verdict {
        ok: bool,
        reason: String,
    },
    Completed {
        status: RunStatus,
        summary: Option<String>,
        saved: Option<bool>,
        summarize_attempts: u32,
        warnings: Vec<String>,
    },
}

/// Executes the research graph
pub struct ResearchEngine {
    graph: Graph,
    nodes: HashMap<Step, Arc<dyn Node>>,
    limits: EngineLimits,
}

impl ResearchEngine {
    /// Bind nodes to a graph. Fails if the graph is malformed or a step has
    /// no node.
    pub fn new(
        graph: Graph,
        nodes: Vec<Arc<dyn Node>>,
        limits: EngineLimits,
    ) -> Result<Self, WorkflowError> {
        graph.validate()?;

        let nodes: HashMap<Step, Arc<dyn Node>> =
            nodes.into_iter().map(|n| (n.step(), n)).collect();
        for step in graph.steps() {
            if !nodes.contains_key(&step) {
                return Err(WorkflowError::MissingNode(step.to_string()));
            }
        }

        Ok(Self {
            graph,
            nodes,
            limits,
        })
    }

    /// The standard research engine over the given capabilities
    pub fn from_capabilities(
        caps: Capabilities,
        config: &ResearchConfig,
    ) -> Result<Self, WorkflowError> {
        let step_timeout = config.step_timeout();
        let nodes: Vec<Arc<dyn Node>> = vec![
            Arc::new(FetchNode::new(
                caps.retriever,
                config.sources.clone(),
                step_timeout,
            )),
            Arc::new(SummarizeNode::new(
                caps.summarizer,
                config.summary_max_words,
                step_timeout,
            )),
            Arc::new(CriticNode::new(caps.critic)),
            Arc::new(PersistNode::new(caps.store, step_timeout)),
        ];

        Self::new(Graph::research(), nodes, EngineLimits::from_config(config))
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Run to completion without cancellation or events
    pub async fn run(&self, state: ResearchState) -> RunOutcome {
        self.run_with(state, CancellationToken::new(), None).await
    }

    /// Run with a cancellation token and an optional event sink
    pub async fn run_with(
        &self,
        mut state: ResearchState,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<WorkflowEvent>>,
    ) -> RunOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.limits.run_timeout;
        let mut steps = Vec::new();
        let mut status = RunStatus::Completed;
        let mut current = Target::Step(self.graph.entry());

        log::info!(
            "[{}] Starting research run for session {}: {}",
            run_id,
            state.session_id,
            state.query
        );
        emit(
            &events,
            WorkflowEvent::RunStarted {
                run_id: run_id.clone(),
                query: state.query.clone(),
            },
        )
        .await;

        while let Target::Step(step) = current {
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }
            if Instant::now() >= deadline {
                status = RunStatus::TimedOut;
                break;
            }
            if steps.len() as u32 >= self.limits.max_steps {
                status = RunStatus::StepLimit;
                break;
            }

            let node = &self.nodes[&step];
            log::info!("[{}] Executing step: {}", run_id, step);
            emit(&events, WorkflowEvent::StepStarted { step }).await;

            // A started persist always runs to completion
            if step == Step::Persist {
                state = node.run(state).await;
            } else {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, node.run(state.clone())).await {
                    Ok(next_state) => state = next_state,
                    Err(_) => {
                        status = RunStatus::TimedOut;
                        break;
                    }
                }
            }

            steps.push(step);
            emit(&events, WorkflowEvent::StepFinished { step }).await;

            if step == Step::Critic {
                if let Some(verdict) = &state.critic_review {
                    emit(
                        &events,
                        WorkflowEvent::Verdict {
                            ok: verdict.ok,
                            reason: verdict.reason.clone(),
                        },
                    )
                    .await;
                }
            }

            let next = match self
                .graph
                .next(step, &state, self.limits.max_summarize_attempts)
            {
                Some(next) => next,
                None => {
                    log::error!("[{}] No transition out of step {}", run_id, step);
                    state
                        .warnings
                        .push(format!("No transition out of step {}", step));
                    Target::End
                }
            };

            if step == Step::Critic && state.critic_rejected() && next != Target::Step(Step::Summarize)
            {
                let reason = state
                    .critic_review
                    .as_ref()
                    .map(|v| v.reason.clone())
                    .unwrap_or_default();
                log::warn!(
                    "[{}] Retry bound reached after {} summarize attempts; accepting rejected summary",
                    run_id,
                    state.summarize_attempts
                );
                state.warnings.push(format!(
                    "Summary accepted after {} attempts despite critic rejection: {}",
                    state.summarize_attempts, reason
                ));
            }

            log::info!("[{}] Transition: {} -> {}", run_id, step, next);
            emit(
                &events,
                WorkflowEvent::Transition {
                    from: step,
                    to: next.to_string(),
                },
            )
            .await;
            current = next;
        }

        let warning = match status {
            RunStatus::Completed => None,
            RunStatus::Cancelled => Some("Run cancelled before completion".to_string()),
            RunStatus::TimedOut => Some(format!(
                "Run exceeded its time limit of {:?}",
                self.limits.run_timeout
            )),
            RunStatus::StepLimit => Some(format!(
                "Run exceeded its limit of {} steps",
                self.limits.max_steps
            )),
        };
        if let Some(warning) = warning {
            log::warn!("[{}] {}", run_id, warning);
            state.warnings.push(warning);
            state = self.flush(&run_id, state, &mut steps, &events).await;
        }

        log::info!(
            "[{}] Run finished: {} after {} steps",
            run_id,
            status.as_str(),
            steps.len()
        );
        emit(
            &events,
            WorkflowEvent::Completed {
                status,
                summary: state.summary.clone(),
                saved: state.saved,
                summarize_attempts: state.summarize_attempts,
                warnings: state.warnings.clone(),
            },
        )
        .await;

        RunOutcome {
            run_id,
            status,
            state,
            steps,
        }
    }

    /// Run persist once for a run that stopped early, unless it already ran
    async fn flush(
        &self,
        run_id: &str,
        state: ResearchState,
        steps: &mut Vec<Step>,
        events: &Option<mpsc::Sender<WorkflowEvent>>,
    ) -> ResearchState {
        if state.saved.is_some() || steps.contains(&Step::Persist) {
            return state;
        }
        let Some(persist) = self.nodes.get(&Step::Persist) else {
            return state;
        };

        log::info!("[{}] Flushing persist step", run_id);
        emit(events, WorkflowEvent::StepStarted { step: Step::Persist }).await;
        let state = persist.run(state).await;
        steps.push(Step::Persist);
        emit(events, WorkflowEvent::StepFinished { step: Step::Persist }).await;
        state
    }
}

async fn emit(events: &Option<mpsc::Sender<WorkflowEvent>>, event: WorkflowEvent) {
    if let Some(tx) = events {
        // A dropped receiver only stops the progress feed
        let _ = tx.send(event).await;
    }
}

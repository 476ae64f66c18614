// SPDX-License-Identifier: MIT

//! Static transition table for the research workflow
//!
//! The graph is data: a list of `(from, condition) -> to` rows. The first
//! row whose condition holds decides the next step. Tables are validated
//! once, when the engine is built.

use crate::adk::error::WorkflowError;
use crate::research::workflow::state::ResearchState;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// A workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Fetch,
    Summarize,
    Critic,
    Persist,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Fetch, Step::Summarize, Step::Critic, Step::Persist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Summarize => "summarize",
            Step::Critic => "critic",
            Step::Persist => "persist",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a transition leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Step(Step),
    End,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Step(step) => step.fmt(f),
            Target::End => f.write_str("end"),
        }
    }
}

/// Guard on a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    /// The critic rejected and another summarize attempt is allowed
    Revise,
    /// The critic accepted, gave no verdict, or attempts are exhausted
    Accept,
}

impl Condition {
    pub fn holds(&self, state: &ResearchState, max_summarize_attempts: u32) -> bool {
        let revise =
            state.critic_rejected() && state.summarize_attempts < max_summarize_attempts;
        match self {
            Condition::Always => true,
            Condition::Revise => revise,
            Condition::Accept => !revise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Step,
    pub when: Condition,
    pub to: Target,
}

const fn edge(from: Step, when: Condition, to: Target) -> Transition {
    Transition { from, when, to }
}

/// fetch -> summarize -> critic -(revise)-> summarize
///                              -(accept)-> persist -> end
pub const RESEARCH_TRANSITIONS: &[Transition] = &[
    edge(Step::Fetch, Condition::Always, Target::Step(Step::Summarize)),
    edge(Step::Summarize, Condition::Always, Target::Step(Step::Critic)),
    edge(Step::Critic, Condition::Revise, Target::Step(Step::Summarize)),
    edge(Step::Critic, Condition::Accept, Target::Step(Step::Persist)),
    edge(Step::Persist, Condition::Always, Target::End),
];

#[derive(Debug, Clone)]
pub struct Graph {
    entry: Step,
    transitions: Vec<Transition>,
}

impl Graph {
    pub fn new(entry: Step, transitions: Vec<Transition>) -> Self {
        Self { entry, transitions }
    }

    /// The research workflow graph
    pub fn research() -> Self {
        Self::new(Step::Fetch, RESEARCH_TRANSITIONS.to_vec())
    }

    pub fn entry(&self) -> Step {
        self.entry
    }

    /// Steps that appear in the table, in first-seen order
    pub fn steps(&self) -> Vec<Step> {
        let mut seen = Vec::new();
        for t in &self.transitions {
            for step in [Some(t.from), step_of(t.to)].into_iter().flatten() {
                if !seen.contains(&step) {
                    seen.push(step);
                }
            }
        }
        if !seen.contains(&self.entry) {
            seen.insert(0, self.entry);
        }
        seen
    }

    /// Check that every step has an exit, is reachable from the entry, and
    /// can reach the terminal state
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let steps = self.steps();

        for step in &steps {
            if !self.transitions.iter().any(|t| t.from == *step) {
                return Err(WorkflowError::DeadEnd(step.to_string()));
            }
        }

        let reachable = self.reachable_from_entry();
        for step in &steps {
            if !reachable.contains(step) {
                return Err(WorkflowError::Unreachable(step.to_string()));
            }
        }

        let finishing = self.steps_reaching_end();
        for step in &steps {
            if !finishing.contains(step) {
                return Err(WorkflowError::NoTerminalPath(step.to_string()));
            }
        }

        Ok(())
    }

    fn reachable_from_entry(&self) -> HashSet<Step> {
        let mut seen = HashSet::from([self.entry]);
        let mut queue = VecDeque::from([self.entry]);
        while let Some(step) = queue.pop_front() {
            for t in self.transitions.iter().filter(|t| t.from == step) {
                if let Some(next) = step_of(t.to) {
                    if seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        seen
    }

    fn steps_reaching_end(&self) -> HashSet<Step> {
        let mut seen: HashSet<Step> = self
            .transitions
            .iter()
            .filter(|t| t.to == Target::End)
            .map(|t| t.from)
            .collect();
        let mut queue: VecDeque<Step> = seen.iter().copied().collect();
        while let Some(step) = queue.pop_front() {
            for t in self
                .transitions
                .iter()
                .filter(|t| t.to == Target::Step(step))
            {
                if seen.insert(t.from) {
                    queue.push_back(t.from);
                }
            }
        }
        seen
    }

    /// The first transition out of `from` whose condition holds.
    /// `None` only for tables that leave a state uncovered.
    pub fn next(
        &self,
        from: Step,
        state: &ResearchState,
        max_summarize_attempts: u32,
    ) -> Option<Target> {
        self.transitions
            .iter()
            .filter(|t| t.from == from)
            .find(|t| t.when.holds(state, max_summarize_attempts))
            .map(|t| t.to)
    }
}

fn step_of(target: Target) -> Option<Step> {
    match target {
        Target::Step(step) => Some(step),
        Target::End => None,
    }
}

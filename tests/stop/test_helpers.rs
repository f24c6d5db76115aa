//! Shared fixtures for stop BDD scenarios.

use std::cell::{Cell, RefCell};

use quiesce::test_support::{ScriptedAgentError, ScriptedCollaborators};
use quiesce::{
    DrainReport, Ineligible, Instance, InstanceBuilder, InstancePlan, StopError, StopOutcome,
};
use rstest::fixture;

#[derive(Clone, Debug)]
pub enum StopResult {
    Stopped(Option<DrainReport>),
    Ineligible(Ineligible),
    Cancelled,
    DrainFailed(String),
    StopFailed(String),
}

impl StopResult {
    pub fn from_result(result: Result<StopOutcome, StopError<ScriptedAgentError>>) -> Self {
        match result {
            Ok(StopOutcome::Stopped { drain }) => Self::Stopped(drain),
            Ok(StopOutcome::Ineligible(reason)) => Self::Ineligible(reason),
            Err(StopError::Cancelled(_)) => Self::Cancelled,
            Err(err @ StopError::Drain(_)) => Self::DrainFailed(err.to_string()),
            Err(err @ StopError::Stop(_)) => Self::StopFailed(err.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct StopContext {
    pub collaborators: ScriptedCollaborators,
    pub instance: RefCell<InstanceBuilder>,
    pub needs_recreate: Cell<bool>,
    pub skip_drain: Cell<bool>,
    pub cancel_on: Cell<Option<usize>>,
    pub outcome: RefCell<Option<StopResult>>,
}

impl StopContext {
    pub fn update_instance(&self, update: impl FnOnce(InstanceBuilder) -> InstanceBuilder) {
        let current = self.instance.borrow().clone();
        *self.instance.borrow_mut() = update(current);
    }

    pub fn plan(&self) -> InstancePlan {
        InstancePlan::new(self.instance.borrow().clone().build())
            .with_needs_recreate(self.needs_recreate.get())
    }

    pub fn outcome(&self) -> Option<StopResult> {
        self.outcome.borrow().clone()
    }
}

#[fixture]
pub fn stop_context() -> StopContext {
    StopContext {
        collaborators: ScriptedCollaborators::new(),
        instance: RefCell::new(Instance::builder("web")),
        needs_recreate: Cell::new(false),
        skip_drain: Cell::new(false),
        cancel_on: Cell::new(None),
        outcome: RefCell::new(None),
    }
}

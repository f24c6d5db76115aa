//! Core library for draining and stopping director-managed instances.
//!
//! The crate exposes the collaborator contracts the stop sequence depends on
//! (agent client, task checkpoint, sleeper) and a [`Stopper`] that quiesces a
//! single instance's workload before asking its agent to stop it
//! (eligibility check → optional drain → stop).

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod drain;
pub mod instance;
pub mod skip_drain;
pub mod sleep;
pub mod stopper;
pub mod test_support;

pub use agent::{AgentClient, AgentFuture, AgentResolver, DrainSignal, DrainType};
pub use checkpoint::{NeverCancelled, TaskCancelled, TaskCheckpoint, TaskToken};
pub use config::{ConfigError, DrainConfig};
pub use drain::{DrainMode, DrainReport, classify};
pub use instance::{
    ApplySpec, Instance, InstanceBuilder, InstancePlan, ParseTargetStateError, TargetState,
    VmReference,
};
pub use skip_drain::{SkipDrain, SkipDrainError};
pub use sleep::{Sleeper, TokioSleeper};
pub use stopper::{Ineligible, StopError, StopOutcome, Stopper};

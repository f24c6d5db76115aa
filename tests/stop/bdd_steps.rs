//! BDD step definitions for the stop sequence.

use std::time::Duration;

use quiesce::{DrainMode, DrainType, Ineligible, Instance, Stopper, TargetState, VmReference};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{StopContext, StopResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a provisioned instance in group \"{group}\"")]
fn provisioned_instance(stop_context: &StopContext, group: String) {
    let name = group.trim().to_owned();
    stop_context
        .update_instance(|_| Instance::builder(name).vm(VmReference::new("vm-cid", "agent-id")));
}

#[given("a compilation worker")]
fn compilation_worker(stop_context: &StopContext) {
    stop_context.update_instance(|builder| {
        builder
            .vm(VmReference::new("vm-compile", "agent-compile"))
            .compilation(true)
    });
}

#[given("an instance without a VM")]
fn instance_without_vm(stop_context: &StopContext) {
    stop_context.update_instance(|_| Instance::builder("web"));
}

#[given("draining is skipped")]
fn draining_skipped(stop_context: &StopContext) {
    stop_context.skip_drain.set(true);
}

#[given("the instance needs recreating")]
fn needs_recreating(stop_context: &StopContext) {
    stop_context.needs_recreate.set(true);
}

#[given("the drain script answers \"{value}\"")]
fn drain_script_answers(stop_context: &StopContext, value: i64) {
    stop_context.collaborators.agent.push_signal(value);
}

#[given("the task is cancelled")]
fn task_cancelled(stop_context: &StopContext) {
    stop_context.cancel_on.set(Some(1));
}

#[given("the agent is unreachable during drain")]
fn agent_unreachable(stop_context: &StopContext) {
    stop_context.collaborators.agent.push_drain_failure();
}

#[given("the agent refuses to stop")]
fn agent_refuses_to_stop(stop_context: &StopContext) {
    stop_context.collaborators.agent.fail_stop();
}

#[when("I stop the instance with target state \"{state}\"")]
fn stop_instance(stop_context: &StopContext, state: String) -> Result<(), StepError> {
    let target_state: TargetState = state
        .parse()
        .map_err(|err| StepError::Assertion(format!("{err}")))?;
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;

    let collaborators = &stop_context.collaborators;
    let checkpoint = match stop_context.cancel_on.get() {
        Some(evaluation) => collaborators.checkpoint.clone().cancel_on(evaluation),
        None => collaborators.checkpoint.clone(),
    };
    let stopper = Stopper::new(collaborators.resolver(), checkpoint)
        .with_sleeper(collaborators.sleeper.clone());
    let plan = stop_context.plan();
    let skip_drain = stop_context.skip_drain.get();

    let result =
        runtime.block_on(async { stopper.stop(&plan, target_state, skip_drain).await });
    *stop_context.outcome.borrow_mut() = Some(StopResult::from_result(result));
    Ok(())
}

#[then("the stop succeeds")]
fn stop_succeeds(stop_context: &StopContext) -> Result<(), StepError> {
    match stop_context.outcome() {
        Some(StopResult::Stopped(_)) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a completed stop, got {other:?}"
        ))),
    }
}

#[then("the stop succeeds without draining")]
fn stop_succeeds_without_draining(stop_context: &StopContext) -> Result<(), StepError> {
    match stop_context.outcome() {
        Some(StopResult::Stopped(None)) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a stop with no drain report, got {other:?}"
        ))),
    }
}

#[then("the drain ran in \"{mode}\" mode")]
fn drain_ran_in_mode(stop_context: &StopContext, mode: String) -> Result<(), StepError> {
    let expected = match mode.trim() {
        "static" => DrainMode::Static,
        "dynamic" => DrainMode::Dynamic,
        other => {
            return Err(StepError::Assertion(format!("unknown drain mode: {other}")));
        }
    };
    match stop_context.outcome() {
        Some(StopResult::Stopped(Some(report))) if report.mode == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a {mode} drain, got {other:?}"
        ))),
    }
}

#[then("the instance is reported ineligible as \"{reason}\"")]
fn reported_ineligible(stop_context: &StopContext, reason: String) -> Result<(), StepError> {
    let expected = match reason.trim() {
        "compilation worker" => Ineligible::CompilationWorker,
        "no vm" => Ineligible::NoVm,
        other => {
            return Err(StepError::Assertion(format!("unknown reason: {other}")));
        }
    };
    match stop_context.outcome() {
        Some(StopResult::Ineligible(seen)) if seen == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected the instance to be ineligible ({reason}), got {other:?}"
        ))),
    }
}

#[then("the stop is cancelled")]
fn stop_cancelled(stop_context: &StopContext) -> Result<(), StepError> {
    match stop_context.outcome() {
        Some(StopResult::Cancelled) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected cancellation, got {other:?}"
        ))),
    }
}

#[then("the stop fails with a drain error")]
fn stop_fails_with_drain_error(stop_context: &StopContext) -> Result<(), StepError> {
    match stop_context.outcome() {
        Some(StopResult::DrainFailed(message)) if message.contains("agent unreachable") => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a drain failure, got {other:?}"
        ))),
    }
}

#[then("the stop fails with a stop error")]
fn stop_fails_with_stop_error(stop_context: &StopContext) -> Result<(), StepError> {
    match stop_context.outcome() {
        Some(StopResult::StopFailed(message)) if message.starts_with("stop request failed") => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected a stop failure, got {other:?}"
        ))),
    }
}

#[then("no drain call is made")]
fn no_drain_call(stop_context: &StopContext) -> Result<(), StepError> {
    let calls = stop_context.collaborators.log.all_drain_calls();
    if calls == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected no drain calls, got {calls}")))
    }
}

#[then("the agent is stopped once")]
fn agent_stopped_once(stop_context: &StopContext) -> Result<(), StepError> {
    let stops = stop_context.collaborators.log.stops();
    if stops == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected one stop call, got {stops}")))
    }
}

#[then("the agent is not stopped")]
fn agent_not_stopped(stop_context: &StopContext) -> Result<(), StepError> {
    let stops = stop_context.collaborators.log.stops();
    if stops == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected no stop call, got {stops}")))
    }
}

#[then("the agent is never contacted")]
fn agent_never_contacted(stop_context: &StopContext) -> Result<(), StepError> {
    let events = stop_context.collaborators.log.events();
    if events.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no agent interaction, got {events:?}"
        )))
    }
}

#[then("the drain type is \"{drain_type}\"")]
fn drain_type_is(stop_context: &StopContext, drain_type: String) -> Result<(), StepError> {
    let expected = match drain_type.trim() {
        "shutdown" => DrainType::Shutdown,
        "update" => DrainType::Update,
        other => {
            return Err(StepError::Assertion(format!("unknown drain type: {other}")));
        }
    };
    let calls = stop_context.collaborators.log.drain_calls(expected);
    if calls == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one {expected} drain call, got {calls}"
        )))
    }
}

#[then("the total wait is \"{secs}\" seconds")]
fn total_wait(stop_context: &StopContext, secs: u64) -> Result<(), StepError> {
    let waited: Duration = stop_context.collaborators.log.sleeps().iter().sum();
    if waited == Duration::from_secs(secs) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {secs}s of waiting, got {waited:?}"
        )))
    }
}

#[then("the checkpoint is consulted \"{count}\" times")]
fn checkpoint_consulted(stop_context: &StopContext, count: usize) -> Result<(), StepError> {
    let seen = stop_context.collaborators.log.checkpoints();
    if seen == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} checkpoint evaluations, got {seen}"
        )))
    }
}

#[then("the drain status is polled \"{count}\" times")]
fn status_polled(stop_context: &StopContext, count: usize) -> Result<(), StepError> {
    let seen = stop_context.collaborators.log.drain_calls(DrainType::Status);
    if seen == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} status polls, got {seen}"
        )))
    }
}

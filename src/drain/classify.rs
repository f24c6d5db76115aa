//! Chooses the drain script class for an instance that is going down.

use crate::agent::DrainType;
use crate::instance::{InstancePlan, TargetState};

/// Classifies the drain for `plan` under the operator's `target_state`.
///
/// Any change that may alter the instance's hardware, network, or disk after
/// the operation selects [`DrainType::Shutdown`]; otherwise the lighter
/// [`DrainType::Update`] script runs. Never returns [`DrainType::Status`].
#[must_use]
pub fn classify(target_state: TargetState, plan: &InstancePlan) -> DrainType {
    if is_shutting_down(target_state, plan) {
        DrainType::Shutdown
    } else {
        DrainType::Update
    }
}

const fn is_shutting_down(target_state: TargetState, plan: &InstancePlan) -> bool {
    matches!(target_state, TargetState::Stopped | TargetState::Detached)
        || plan.resource_pool_changed
        || plan.needs_recreate
        || plan.instance().persistent_disk_changed()
        || plan.networks_changed
}

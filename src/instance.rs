//! Read-only views of the instance being stopped and its computed plan.
//!
//! The director derives every flag on these types elsewhere (deployment and
//! instance-plan computation); the stopper only reads them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifies the VM hosting an instance and the agent running on it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct VmReference {
    /// Cloud identifier of the VM.
    pub cid: String,
    /// Identifier of the agent process running on the VM.
    pub agent_id: String,
}

impl VmReference {
    /// Creates a VM reference, trimming both identifiers.
    #[must_use]
    pub fn new(cid: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            cid: cid.into().trim().to_owned(),
            agent_id: agent_id.into().trim().to_owned(),
        }
    }
}

/// Last configuration document applied to an instance.
///
/// The stopper never inspects the document; it forwards it to the drain
/// script as context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplySpec(serde_json::Value);

impl ApplySpec {
    /// Wraps an existing JSON document.
    #[must_use]
    pub const fn new(document: serde_json::Value) -> Self {
        Self(document)
    }

    /// Returns the underlying document.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consumes the wrapper, returning the document.
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for ApplySpec {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// A deployed job instance under management.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    group: String,
    index: u32,
    id: Uuid,
    vm: Option<VmReference>,
    compilation: bool,
    persistent_disk_changed: bool,
    apply_spec: ApplySpec,
}

impl Instance {
    /// Starts a builder for an instance in the named instance group.
    #[must_use]
    pub fn builder(group: impl Into<String>) -> InstanceBuilder {
        InstanceBuilder::new(group)
    }

    /// Instance group (job) name.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Index of the instance within its group.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Stable instance identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// VM hosting the instance, if one has been provisioned.
    #[must_use]
    pub const fn vm(&self) -> Option<&VmReference> {
        self.vm.as_ref()
    }

    /// Whether a VM has been provisioned for the instance.
    #[must_use]
    pub const fn has_vm(&self) -> bool {
        self.vm.is_some()
    }

    /// Whether the instance is a transient compilation worker.
    #[must_use]
    pub const fn is_compilation_worker(&self) -> bool {
        self.compilation
    }

    /// Whether the instance's persistent disk changes in this operation.
    #[must_use]
    pub const fn persistent_disk_changed(&self) -> bool {
        self.persistent_disk_changed
    }

    /// Configuration document last applied to the instance.
    #[must_use]
    pub const fn apply_spec(&self) -> &ApplySpec {
        &self.apply_spec
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.group, self.id, self.index)
    }
}

/// Builder for [`Instance`].
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceBuilder {
    group: String,
    index: u32,
    id: Option<Uuid>,
    vm: Option<VmReference>,
    compilation: bool,
    persistent_disk_changed: bool,
    apply_spec: ApplySpec,
}

impl InstanceBuilder {
    /// Creates a builder for an instance of `group` at index zero with no VM.
    #[must_use]
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into().trim().to_owned(),
            index: 0,
            id: None,
            vm: None,
            compilation: false,
            persistent_disk_changed: false,
            apply_spec: ApplySpec::default(),
        }
    }

    /// Sets the index within the instance group.
    #[must_use]
    pub const fn index(mut self, value: u32) -> Self {
        self.index = value;
        self
    }

    /// Sets the instance identifier. A random v4 UUID is used otherwise.
    #[must_use]
    pub const fn id(mut self, value: Uuid) -> Self {
        self.id = Some(value);
        self
    }

    /// Sets the VM hosting the instance.
    #[must_use]
    pub fn vm(mut self, value: VmReference) -> Self {
        self.vm = Some(value);
        self
    }

    /// Marks the instance as a compilation worker.
    #[must_use]
    pub const fn compilation(mut self, value: bool) -> Self {
        self.compilation = value;
        self
    }

    /// Records whether the persistent disk changes.
    #[must_use]
    pub const fn persistent_disk_changed(mut self, value: bool) -> Self {
        self.persistent_disk_changed = value;
        self
    }

    /// Sets the last applied configuration document.
    #[must_use]
    pub fn apply_spec(mut self, value: impl Into<ApplySpec>) -> Self {
        self.apply_spec = value.into();
        self
    }

    /// Builds the instance.
    #[must_use]
    pub fn build(self) -> Instance {
        Instance {
            group: self.group,
            index: self.index,
            id: self.id.unwrap_or_else(Uuid::new_v4),
            vm: self.vm,
            compilation: self.compilation,
            persistent_disk_changed: self.persistent_disk_changed,
            apply_spec: self.apply_spec,
        }
    }
}

/// Transition computed for one instance within the current fleet operation.
#[derive(Clone, Debug, PartialEq)]
pub struct InstancePlan {
    instance: Instance,
    /// Whether the instance moves to a different resource pool.
    pub resource_pool_changed: bool,
    /// Whether the instance's VM is going to be recreated.
    pub needs_recreate: bool,
    /// Whether the instance's network configuration changes.
    pub networks_changed: bool,
}

impl InstancePlan {
    /// Creates a plan with no structural changes for `instance`.
    #[must_use]
    pub const fn new(instance: Instance) -> Self {
        Self {
            instance,
            resource_pool_changed: false,
            needs_recreate: false,
            networks_changed: false,
        }
    }

    /// Records a resource pool change.
    #[must_use]
    pub const fn with_resource_pool_changed(mut self, value: bool) -> Self {
        self.resource_pool_changed = value;
        self
    }

    /// Records that the VM must be recreated.
    #[must_use]
    pub const fn with_needs_recreate(mut self, value: bool) -> Self {
        self.needs_recreate = value;
        self
    }

    /// Records a network change.
    #[must_use]
    pub const fn with_networks_changed(mut self, value: bool) -> Self {
        self.networks_changed = value;
        self
    }

    /// The instance this plan applies to.
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }
}

/// Operator-requested end state for an instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// The instance keeps running after the operation.
    Started,
    /// The instance's jobs are stopped but the VM is kept.
    Stopped,
    /// The instance's VM is deleted while its disks are kept.
    Detached,
}

impl TargetState {
    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Detached => "detached",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetState {
    type Err = ParseTargetStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "started" => Ok(Self::Started),
            "stopped" => Ok(Self::Stopped),
            "detached" => Ok(Self::Detached),
            other => Err(ParseTargetStateError {
                value: other.to_owned(),
            }),
        }
    }
}

/// Raised when a target state string is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown target state '{value}': expected started, stopped, or detached")]
pub struct ParseTargetStateError {
    /// The rejected input.
    pub value: String,
}

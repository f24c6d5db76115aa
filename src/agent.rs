//! Contract for the remote agent running on each managed VM.
//!
//! Transport is not this crate's concern: implementations wrap whatever
//! messaging channel the director uses and surface failures through their
//! associated error type.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::instance::{ApplySpec, VmReference};

/// Selects which drain behaviour the agent runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainType {
    /// Structural change: the instance's hardware, network, or disk may differ
    /// afterwards.
    Shutdown,
    /// Software-only change.
    Update,
    /// Re-poll of a drain already in progress. Never an initial drain type.
    Status,
}

impl DrainType {
    /// Wire name of the drain type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Update => "update",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for DrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value returned by a drain call.
///
/// A nonnegative value is terminal: wait that many seconds, then stop. A
/// negative value means the drain is still running; its magnitude is the
/// suggested number of seconds before asking again.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrainSignal(i64);

impl DrainSignal {
    /// Wraps a raw drain result.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw value reported by the agent.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this is the final answer of the drain script.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.0 >= 0
    }

    /// Whether the script asked for a fixed wait with no polling.
    #[must_use]
    pub const fn is_static(self) -> bool {
        self.0 > 0
    }

    /// Time to wait before acting on this signal.
    #[must_use]
    pub const fn wait(self) -> Duration {
        Duration::from_secs(self.0.unsigned_abs())
    }
}

impl From<i64> for DrainSignal {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DrainSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Future returned by agent operations.
pub type AgentFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Handle bound to a single instance's agent.
pub trait AgentClient {
    /// Communication error raised by the transport.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Asks the agent to run (or report on) its drain script.
    ///
    /// `apply_spec` is supplied for the initial shutdown and update calls and
    /// omitted for status re-polls.
    fn drain<'a>(
        &'a self,
        drain_type: DrainType,
        apply_spec: Option<&'a ApplySpec>,
    ) -> AgentFuture<'a, DrainSignal, Self::Error>;

    /// Stops the jobs running on the instance.
    fn stop(&self) -> AgentFuture<'_, (), Self::Error>;
}

/// Resolves agent handles for specific VMs.
pub trait AgentResolver {
    /// Client type produced by the resolver.
    type Client: AgentClient;

    /// Obtains a handle bound to the agent on `vm`.
    fn bind_to(&self, vm: &VmReference) -> Self::Client;
}

impl<R: AgentResolver + ?Sized> AgentResolver for &R {
    type Client = R::Client;

    fn bind_to(&self, vm: &VmReference) -> Self::Client {
        (**self).bind_to(vm)
    }
}

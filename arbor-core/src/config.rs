//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration document.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scheduler;

/// How the scheduler's deferred flush gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushDriver {
    /// The host drains the queue itself with [`scheduler::flush_jobs`] or
    /// [`scheduler::run_until_idle`], typically once per run-loop tick.
    #[default]
    Manual,

    /// The flush is spawned onto the current `tokio::task::LocalSet` and runs
    /// as soon as the synchronous frame that queued it yields. Only code
    /// driven through `scheduler::run_local` or `scheduler::within_local_set`
    /// gets a spawned flush; elsewhere jobs wait for the host.
    TokioLocal,
}

/// Scheduler settings, installed per thread with [`scheduler::configure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Flush execution strategy.
    pub driver: FlushDriver,

    /// Upper bound on flush cycles drained by [`scheduler::run_until_idle`].
    pub max_flush_cycles: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            driver: FlushDriver::Manual,
            max_flush_cycles: 100,
        }
    }
}

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Maximum nesting of `patch` calls before the reconciler stops descending.
    pub depth_limit: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self { depth_limit: 512 }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub scheduler: SchedulerConfig,
    pub renderer: RendererConfig,
}

impl RuntimeConfig {
    /// Parse a configuration document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Install the scheduler part of this configuration on the current thread.
    ///
    /// The renderer part is passed explicitly to
    /// [`create_renderer_with_config`](crate::renderer::create_renderer_with_config).
    pub fn install(&self) {
        scheduler::configure(self.scheduler.clone());
    }
}

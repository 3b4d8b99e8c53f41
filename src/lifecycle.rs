//! Worker lifecycle and the host that drives it.
//!
//! The host plays the part of the browser runtime: it runs the controller's
//! install and activate work at each transition, waits for that work to
//! finish before moving on, and only routes fetches through the controller
//! once the worker is activated.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Mutex;

use crate::controller::{FetchOutcome, InstallReport, OfflineCacheController, ResponseSource, Served};
use crate::error::{Error, Result};
use crate::http::Request;
use crate::network::Network;
use crate::storage::CacheStorage;

/// Service worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Created, install not yet started.
    Parsed = 0,
    /// Install work running.
    Installing = 1,
    /// Installed and waiting to activate.
    Installed = 2,
    /// Activate work running.
    Activating = 3,
    /// Controlling requests.
    Activated = 4,
    /// Install failed or the worker was replaced.
    Redundant = 5,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Parsed,
            1 => Self::Installing,
            2 => Self::Installed,
            3 => Self::Activating,
            4 => Self::Activated,
            _ => Self::Redundant,
        }
    }

    /// Returns true if fetches are routed through the controller.
    #[must_use]
    pub const fn can_intercept_fetch(self) -> bool {
        matches!(self, Self::Activated)
    }

    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Redundant)
    }

    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime that owns a controller and drives its lifecycle.
pub struct ServiceWorkerHost<S: CacheStorage, N: Network> {
    controller: OfflineCacheController<S, N>,
    state: AtomicU8,
    transition: Mutex<()>,
}

impl<S: CacheStorage, N: Network> ServiceWorkerHost<S, N> {
    /// Wraps a controller in a freshly parsed worker.
    #[must_use]
    pub fn new(controller: OfflineCacheController<S, N>) -> Self {
        Self {
            controller,
            state: AtomicU8::new(WorkerState::Parsed as u8),
            transition: Mutex::new(()),
        }
    }

    /// Returns the hosted controller.
    #[must_use]
    pub const fn controller(&self) -> &OfflineCacheController<S, N> {
        &self.controller
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        log::debug!("Worker {} -> {state}", self.controller.cache_name());
        self.state.store(state as u8, Ordering::Release);
    }

    fn expect_state(&self, expected: WorkerState) -> Result<()> {
        let found = self.state();
        if found == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.as_str(),
                found: found.to_string(),
            })
        }
    }

    /// Runs the install transition.
    ///
    /// On failure the worker becomes redundant and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is freshly parsed,
    /// or the controller's install error.
    pub async fn install(&self) -> Result<InstallReport> {
        let _guard = self.transition.lock().await;
        self.expect_state(WorkerState::Parsed)?;
        self.set_state(WorkerState::Installing);
        match self.controller.on_install().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                Ok(report)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Runs the activate transition and starts controlling requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is installed, or the
    /// controller's activate error (the worker then stays installed).
    pub async fn activate(&self) -> Result<Vec<String>> {
        let _guard = self.transition.lock().await;
        self.expect_state(WorkerState::Installed)?;
        self.set_state(WorkerState::Activating);
        match self.controller.on_activate().await {
            Ok(deleted) => {
                self.set_state(WorkerState::Activated);
                Ok(deleted)
            }
            Err(e) => {
                self.set_state(WorkerState::Installed);
                Err(e)
            }
        }
    }

    /// Installs, then activates right away when `skip_waiting` is configured.
    ///
    /// Returns the state reached.
    ///
    /// # Errors
    ///
    /// Returns the first transition error.
    pub async fn start(&self) -> Result<WorkerState> {
        self.install().await?;
        if self.controller.config().skip_waiting {
            self.activate().await?;
        } else {
            log::info!(
                "{} installed and waiting to activate",
                self.controller.cache_name()
            );
        }
        Ok(self.state())
    }

    /// Marks the worker as replaced; it stops intercepting requests.
    pub async fn retire(&self) {
        let _guard = self.transition.lock().await;
        self.set_state(WorkerState::Redundant);
    }

    /// Serves a request the way the runtime would.
    ///
    /// Requests the controller does not intercept, and every request made
    /// before activation, go straight to the network.
    ///
    /// # Errors
    ///
    /// Returns a network error only for requests that bypass the controller.
    pub async fn handle(&self, request: &Request) -> Result<Served> {
        if self.state().can_intercept_fetch() {
            if let FetchOutcome::Respond(served) = self.controller.on_fetch(request).await {
                return Ok(served);
            }
        } else {
            self.controller.stats().record_passthrough();
        }

        let response = self.controller.network().fetch(request).await?;
        Ok(Served {
            response,
            source: ResponseSource::Network,
        })
    }
}

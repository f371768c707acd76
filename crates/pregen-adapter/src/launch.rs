//! Starting and observing the target process
//!
//! The target's entry point runs inside the isolated loader so that the
//! patched server type is the one it constructs.

use crate::capability::TargetHost;
use crate::error::LaunchError;
use crate::loader::{ForeignModuleLoader, IsolatedLoader};
use crate::runtime::{ForeignRuntime, Value};
use std::sync::Arc;
use std::time::Duration;

/// Name of the target's main thread
pub const SERVER_THREAD: &str = "Server thread";

/// The target as a process the driver starts and waits for
pub trait TargetProcess: Send + Sync {
    /// Run the entry point with `args`; returns once the entry point does
    ///
    /// # Errors
    /// Returns [`LaunchError`] if the entry point cannot be found or raises.
    fn launch(&self, args: &[String]) -> Result<(), LaunchError>;

    /// Whether the target's main thread is running
    fn is_alive(&self) -> bool;

    /// Wait for the main thread to exit; `true` if it did within `timeout`
    fn wait_for_exit(&self, timeout: Duration) -> bool;
}

/// Line-oriented command input of the target
pub trait CommandSink: Send + Sync {
    /// Send one command line
    ///
    /// # Errors
    /// Returns the IO error if the line cannot be delivered.
    fn send(&self, line: &str) -> std::io::Result<()>;
}

/// Runs the archive's entry point under an [`IsolatedLoader`]
pub struct Launcher {
    loader: Arc<IsolatedLoader>,
    runtime: Arc<dyn ForeignRuntime>,
    thread: String,
}

impl Launcher {
    /// Create launcher observing [`SERVER_THREAD`]
    #[must_use]
    pub fn new(loader: Arc<IsolatedLoader>, runtime: Arc<dyn ForeignRuntime>) -> Self {
        Self {
            loader,
            runtime,
            thread: SERVER_THREAD.to_string(),
        }
    }

    /// Observe a differently named main thread
    #[inline]
    #[must_use]
    pub fn with_thread(mut self, name: impl Into<String>) -> Self {
        self.thread = name.into();
        self
    }
}

impl TargetProcess for Launcher {
    fn launch(&self, args: &[String]) -> Result<(), LaunchError> {
        let entry = self.loader.entry_point().ok_or(LaunchError::NoEntryPoint)?;
        let ty = self.loader.load(&entry).map_err(|source| LaunchError::Load {
            name: entry.clone(),
            source,
        })?;
        let main = self
            .runtime
            .entry_method(&ty)
            .ok_or_else(|| LaunchError::MissingEntryMethod(entry.clone()))?;

        tracing::info!(entry = %entry, args = args.len(), "starting target entry point");
        self.runtime
            .invoke(&main, None, &[Value::StrArray(args.to_vec())])
            .map_err(LaunchError::EntryPoint)?;
        tracing::debug!(entry = %entry, "entry point returned");
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.runtime.thread_alive(&self.thread)
    }

    fn wait_for_exit(&self, timeout: Duration) -> bool {
        self.runtime.join_thread(&self.thread, timeout)
    }
}

impl TargetHost for Launcher {
    fn is_alive(&self) -> bool {
        TargetProcess::is_alive(self)
    }
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("loader", &self.loader)
            .field("thread", &self.thread)
            .finish_non_exhaustive()
    }
}

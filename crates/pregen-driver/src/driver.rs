//! The generation driver
//!
//! [`Driver`] owns the lifecycle of one target: start it, wait until it
//! reports ready, generate chunks over a region per dimension, and stop it.
//! Every state change goes through the transition table in
//! [`crate::state`].
//!
//! All operations take `&self`; [`Driver::schedule_shutdown`] may be called
//! from any thread and ends readiness polling, pacing and generation loops
//! at the next chunk boundary.

use crate::config::DriverSettings;
use crate::error::{DriverError, Result};
use crate::pacing::Pacer;
use crate::progress::{LogObserver, ProgressObserver, ProgressTracker};
use crate::region::{ChunkPos, Region};
use crate::signal::ShutdownSignal;
use crate::state::{validate_transition, DriverState};
use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;
use pregen_adapter::{Adapter, CommandSink, Dimension, TargetOps, TargetProcess};
use std::sync::Arc;

/// Name of the thread running the target's entry point
const LAUNCH_THREAD: &str = "pregen-launch";

/// Console command that shuts the target down
const STOP_COMMAND: &str = "stop";

/// Drives one target through start, readiness, generation and stop
pub struct Driver {
    target: Arc<dyn TargetProcess>,
    ops: Arc<dyn TargetOps>,
    console: Option<Arc<dyn CommandSink>>,
    settings: DriverSettings,
    state: Mutex<DriverState>,
    shutdown: Arc<ShutdownSignal>,
    last_completed: Mutex<Option<(Dimension, ChunkPos)>>,
    observer: Arc<dyn ProgressObserver>,
}

impl Driver {
    /// Driver over a target process and its operations
    #[must_use]
    pub fn new(target: Arc<dyn TargetProcess>, ops: Arc<dyn TargetOps>) -> Self {
        Self {
            target,
            ops,
            console: None,
            settings: DriverSettings::default(),
            state: Mutex::new(DriverState::NotStarted),
            shutdown: Arc::new(ShutdownSignal::new()),
            last_completed: Mutex::new(None),
            observer: Arc::new(LogObserver),
        }
    }

    /// Driver over a prepared adapter
    #[must_use]
    pub fn for_adapter(adapter: &Adapter) -> Self {
        Self::new(adapter.process(), adapter.ops())
    }

    /// Console used to send `stop`
    #[must_use]
    pub fn with_console(mut self, console: Arc<dyn CommandSink>) -> Self {
        self.console = Some(console);
        self
    }

    /// Replace timeouts and pacing
    #[must_use]
    pub fn with_settings(mut self, settings: DriverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Receive progress reports instead of logging them
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> DriverState {
        *self.state.lock()
    }

    /// Settings in effect
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Signal tripped by [`Driver::schedule_shutdown`]
    #[inline]
    #[must_use]
    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    /// Last chunk generated, with its dimension
    #[inline]
    #[must_use]
    pub fn last_completed(&self) -> Option<(Dimension, ChunkPos)> {
        *self.last_completed.lock()
    }

    /// Whether the target's main thread is alive
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.target.is_alive()
    }

    /// Ask every running or future wait and loop to end early
    pub fn schedule_shutdown(&self) {
        self.shutdown.request();
    }

    fn transition(&self, to: DriverState) -> Result<()> {
        let mut state = self.state.lock();
        validate_transition(*state, to)?;
        if *state != to {
            tracing::debug!(from = %*state, to = %to, "driver transition");
        }
        *state = to;
        Ok(())
    }

    /// Move to `Failed` and hand the error back
    fn fail(&self, err: DriverError) -> DriverError {
        let mut state = self.state.lock();
        if validate_transition(*state, DriverState::Failed).is_ok() {
            tracing::debug!(from = %*state, error = %err, "driver failed");
            *state = DriverState::Failed;
        }
        err
    }

    /// Run the target's entry point and wait for it to return
    ///
    /// The entry point runs on its own thread. It must return within the
    /// startup timeout and leave the target's main thread running.
    ///
    /// # Errors
    /// Returns [`DriverError::StartupTimeout`], [`DriverError::Launch`],
    /// [`DriverError::LaunchPanicked`] or [`DriverError::TargetExited`];
    /// the driver is then `Failed`.
    pub fn start(&self, args: &[String]) -> Result<()> {
        self.transition(DriverState::Starting)?;
        tracing::info!(args = ?args, "starting target");

        let (tx, rx) = channel::bounded(1);
        let target = Arc::clone(&self.target);
        let args = args.to_vec();
        std::thread::Builder::new()
            .name(LAUNCH_THREAD.to_string())
            .spawn(move || {
                let _ = tx.send(target.launch(&args));
            })
            .map_err(|e| self.fail(DriverError::Spawn(e)))?;

        let timeout = self.settings.startup_timeout;
        match rx.recv_timeout(timeout) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.fail(DriverError::Launch(e))),
            Err(RecvTimeoutError::Timeout) => {
                return Err(self.fail(DriverError::StartupTimeout {
                    secs: timeout.as_secs(),
                }))
            }
            Err(RecvTimeoutError::Disconnected) => return Err(self.fail(DriverError::LaunchPanicked)),
        }
        if !self.target.is_alive() {
            return Err(self.fail(DriverError::TargetExited));
        }

        tracing::info!("target started");
        self.transition(DriverState::WaitingReady)
    }

    /// Whether the target reports ready
    ///
    /// # Errors
    /// Returns the capability failure.
    pub fn is_ready(&self) -> Result<bool> {
        Ok(self.ops.is_ready()?)
    }

    /// Poll readiness until it holds or the attempts run out
    ///
    /// An unavailable target counts as not ready yet.
    ///
    /// # Errors
    /// Returns [`DriverError::NotReady`] after the last attempt,
    /// [`DriverError::TargetExited`] if the target dies while starting,
    /// [`DriverError::Interrupted`] on shutdown, or a capability failure.
    pub fn wait_until_ready(&self) -> Result<()> {
        let state = self.state();
        if state != DriverState::WaitingReady {
            return Err(DriverError::IllegalTransition {
                from: state,
                to: DriverState::WaitingReady,
            });
        }
        tracing::info!("waiting for target to become ready");

        let attempts = self.settings.ready_attempts;
        for attempt in 1..=attempts {
            if self.shutdown.is_requested() {
                return Err(DriverError::Interrupted(DriverState::WaitingReady));
            }
            match self.ops.is_ready() {
                Ok(true) => {
                    tracing::info!(attempt, "target ready");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.is_target_unavailable() => {
                    tracing::debug!(attempt, error = %e, "target not reachable yet");
                }
                Err(e) => return Err(self.fail(e.into())),
            }
            if !self.target.is_alive() {
                return Err(self.fail(DriverError::TargetExited));
            }
            if attempt < attempts && self.shutdown.wait_timeout(self.settings.ready_poll_interval) {
                return Err(DriverError::Interrupted(DriverState::WaitingReady));
            }
        }
        Err(self.fail(DriverError::NotReady { attempts }))
    }

    /// Generate every chunk of `region` in `dimension`
    ///
    /// With `resume_from` the loop continues after that chunk (see
    /// [`Region::resume`]). Returns `true` if the whole region was
    /// generated and `false` if the loop ended early because the target
    /// stopped or shutdown was scheduled; [`Driver::last_completed`] then
    /// holds the last chunk generated.
    ///
    /// # Errors
    /// Returns [`DriverError::IllegalTransition`] before the target is
    /// ready, or the capability failure while the target is alive.
    pub fn generate(&self, dimension: Dimension, region: Region, resume_from: Option<ChunkPos>) -> Result<bool> {
        self.transition(DriverState::Generating)?;

        let plan = match resume_from {
            Some(last) => region.resume(last),
            None => region.plan(),
        };
        let mut tracker = ProgressTracker::new(dimension, region.area(), plan.skipped());
        let mut pacer = Pacer::new(self.settings.max_generation_rate);
        tracing::info!(
            dimension = %dimension,
            total = region.area(),
            remaining = plan.remaining(),
            "generating chunks from {} to {}",
            region.min(),
            region.max(),
        );

        for pos in plan {
            if !pacer.pace(&self.shutdown) {
                tracing::info!(dimension = %dimension, "generation interrupted by shutdown");
                return Ok(false);
            }
            match self.ops.generate_chunk(dimension, pos.x, pos.z) {
                Ok(()) => {
                    *self.last_completed.lock() = Some((dimension, pos));
                    if let Some(report) = tracker.advance() {
                        self.observer.on_progress(&report);
                    }
                }
                Err(e) if !self.target.is_alive() => {
                    tracing::warn!(dimension = %dimension, chunk = %pos, error = %e, "target stopped during generation");
                    return Ok(false);
                }
                Err(e) => return Err(self.fail(e.into())),
            }
            if !self.target.is_alive() {
                tracing::warn!(dimension = %dimension, chunk = %pos, "target stopped during generation");
                return Ok(false);
            }
            if self.shutdown.is_requested() {
                tracing::info!(dimension = %dimension, chunk = %pos, "generation interrupted by shutdown");
                return Ok(false);
            }
        }

        tracing::info!(dimension = %dimension, "done generating chunks");
        Ok(true)
    }

    /// Stop the target
    ///
    /// Sends `stop` through the console when configured to and waits for the
    /// main thread to exit. Stopping twice is a no-op.
    ///
    /// # Errors
    /// Returns [`DriverError::Command`] if the command cannot be delivered.
    pub fn stop(&self) -> Result<()> {
        if self.state() == DriverState::Stopped {
            return Ok(());
        }
        self.transition(DriverState::Stopping)?;

        if self.settings.send_stop && self.target.is_alive() {
            match &self.console {
                Some(console) => {
                    tracing::info!("sending stop command to target");
                    console
                        .send(STOP_COMMAND)
                        .map_err(|e| self.fail(DriverError::Command(e)))?;
                    if !self.target.wait_for_exit(self.settings.startup_timeout) {
                        tracing::warn!("target still running after stop command");
                    }
                }
                None => tracing::warn!("no console attached, target left running"),
            }
        }

        self.transition(DriverState::Stopped)?;
        tracing::info!(running = self.target.is_alive(), "driver stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("state", &self.state())
            .field("settings", &self.settings)
            .field("last_completed", &self.last_completed())
            .field("console", &self.console.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregen_adapter::{CompatibilityError, LaunchError};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Scripted {
        alive: AtomicBool,
        calls: AtomicUsize,
        fail_at: Option<usize>,
    }

    impl TargetProcess for Scripted {
        fn launch(&self, _: &[String]) -> std::result::Result<(), LaunchError> {
            self.alive.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn wait_for_exit(&self, _: Duration) -> bool {
            !self.is_alive()
        }
    }

    impl TargetOps for Scripted {
        fn is_ready(&self) -> pregen_adapter::Result<bool> {
            Ok(true)
        }

        fn generate_chunk(&self, _: Dimension, _: i32, _: i32) -> pregen_adapter::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_at == Some(n) {
                return Err(CompatibilityError::TargetUnavailable("scripted".into()));
            }
            Ok(())
        }
    }

    fn driver(target: &Arc<Scripted>) -> Driver {
        Driver::new(target.clone(), target.clone())
    }

    #[test]
    fn generate_requires_readiness() {
        let target = Arc::new(Scripted::default());
        let driver = driver(&target);
        let err = driver.generate(Dimension::Overworld, Region::new(0, 0, 0, 0), None).unwrap_err();
        assert!(matches!(err, DriverError::IllegalTransition { from: DriverState::NotStarted, .. }));
    }

    #[test]
    fn error_while_alive_fails_run() {
        let target = Arc::new(Scripted {
            fail_at: Some(3),
            ..Scripted::default()
        });
        let driver = driver(&target);
        driver.start(&[]).unwrap();
        driver.wait_until_ready().unwrap();
        let err = driver.generate(Dimension::Overworld, Region::new(0, 0, 4, 4), None).unwrap_err();
        assert!(matches!(err, DriverError::Compatibility(_)));
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(driver.last_completed(), Some((Dimension::Overworld, ChunkPos::new(0, 1))));
        driver.stop().unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[test]
    fn shutdown_ends_loop_after_current_chunk() {
        let target = Arc::new(Scripted::default());
        let driver = driver(&target);
        driver.start(&[]).unwrap();
        driver.wait_until_ready().unwrap();
        driver.schedule_shutdown();
        let finished = driver.generate(Dimension::End, Region::new(0, 0, 9, 9), None).unwrap();
        assert!(!finished);
        assert!(target.calls.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn stop_without_console_leaves_target() {
        let target = Arc::new(Scripted::default());
        let driver = driver(&target).with_settings(DriverSettings {
            send_stop: true,
            ..DriverSettings::default()
        });
        driver.start(&[]).unwrap();
        driver.stop().unwrap();
        driver.stop().unwrap();
        assert!(driver.is_running());
        assert_eq!(driver.state(), DriverState::Stopped);
    }
}

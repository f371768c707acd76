//! One complete generation run
//!
//! A [`Session`] starts the target, waits for readiness, generates every
//! configured dimension in order and always stops the target afterwards.
//! With a [`ProgressStore`] attached it resumes an interrupted run and
//! records where the current one was interrupted.

use crate::config::DriverConfig;
use crate::driver::Driver;
use crate::error::Result;
use crate::region::{ChunkPos, Region};
use crate::store::{JsonProgressStore, ProgressRecord, ProgressStore};
use pregen_adapter::Dimension;
use std::sync::Arc;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every dimension was generated completely
    Completed,
    /// Generation ended early
    Interrupted {
        /// Dimension being generated
        dimension: Dimension,
        /// Last chunk generated in it
        last_completed: Option<ChunkPos>,
    },
}

/// Generation run over a region and a list of dimensions
pub struct Session {
    driver: Arc<Driver>,
    region: Region,
    dimensions: Vec<Dimension>,
    store: Option<Arc<dyn ProgressStore>>,
}

impl Session {
    /// Session over the configured region and dimensions
    ///
    /// Progress is kept in the configured file when `save_progress` is set.
    #[must_use]
    pub fn new(driver: Arc<Driver>, config: &DriverConfig) -> Self {
        let store = config
            .save_progress
            .then(|| Arc::new(JsonProgressStore::new(&config.progress_file)) as Arc<dyn ProgressStore>);
        Self {
            driver,
            region: config.region,
            dimensions: config.dimensions.clone(),
            store,
        }
    }

    /// Keep progress in `store`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Driver used by this session
    #[inline]
    #[must_use]
    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// Run to completion or interruption, then stop the target
    ///
    /// # Errors
    /// Returns the first driver or store failure. The target is stopped
    /// either way; a failure to stop after an earlier error is only logged.
    pub fn run(&self, args: &[String]) -> Result<SessionOutcome> {
        let outcome = self.drive(args);
        let stopped = self.driver.stop();
        match outcome {
            Ok(outcome) => {
                stopped?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(stop) = stopped {
                    tracing::warn!(error = %stop, "failed to stop target after error");
                }
                Err(e)
            }
        }
    }

    fn drive(&self, args: &[String]) -> Result<SessionOutcome> {
        let resume = self.resume_point()?;

        self.driver.start(args)?;
        self.driver.wait_until_ready()?;

        let first = resume
            .as_ref()
            .and_then(|r| self.dimensions.iter().position(|d| *d == r.dimension))
            .unwrap_or(0);
        for &dimension in &self.dimensions[first..] {
            let from = resume
                .as_ref()
                .filter(|r| r.dimension == dimension)
                .map(ProgressRecord::position);
            if self.driver.generate(dimension, self.region, from)? {
                continue;
            }

            let last_completed = self
                .driver
                .last_completed()
                .filter(|(d, _)| *d == dimension)
                .map(|(_, pos)| pos)
                .or(from);
            if let (Some(store), Some(pos)) = (&self.store, last_completed) {
                store.save(&ProgressRecord::now(dimension, pos))?;
                tracing::info!(dimension = %dimension, chunk = %pos, "saved progress");
            }
            return Ok(SessionOutcome::Interrupted {
                dimension,
                last_completed,
            });
        }

        if let Some(store) = &self.store {
            store.clear()?;
        }
        tracing::info!(dimensions = self.dimensions.len(), "chunk generation done");
        Ok(SessionOutcome::Completed)
    }

    fn resume_point(&self) -> Result<Option<ProgressRecord>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let record = store.load()?;
        if let Some(r) = &record {
            if !self.dimensions.contains(&r.dimension) {
                tracing::warn!(dimension = %r.dimension, "saved progress is for a dimension not being generated, ignoring");
                return Ok(None);
            }
            tracing::info!(dimension = %r.dimension, chunk = %r.position(), saved_at = %r.saved_at, "resuming");
        }
        Ok(record)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("driver", &self.driver)
            .field("region", &self.region)
            .field("dimensions", &self.dimensions)
            .field("store", &self.store.is_some())
            .finish()
    }
}

//! Model file load and save on a worker thread.
//!
//! One task runs at a time. [`ModelIo::state`] is readable from any thread
//! (the audio thread included) without blocking; finished tasks are reported
//! through [`ModelIo::poll`].

use crate::models::ModelSet;
use crate::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelIoState {
    Idle = 0,
    Loading = 1,
    Saving = 2,
}

impl ModelIoState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ModelIoState::Loading,
            2 => ModelIoState::Saving,
            _ => ModelIoState::Idle,
        }
    }
}

/// Result of one finished task.
#[derive(Debug)]
pub struct ModelIoOutcome {
    /// `Loading` or `Saving`.
    pub stage: ModelIoState,
    pub path: PathBuf,
    pub result: Result<()>,
}

/// Runs [`ModelSet::load`] and [`ModelSet::save`] off the calling thread.
#[derive(Debug)]
pub struct ModelIo {
    state: Arc<AtomicU8>,
    done_tx: Sender<ModelIoOutcome>,
    done_rx: Receiver<ModelIoOutcome>,
}

impl ModelIo {
    pub fn new() -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            state: Arc::new(AtomicU8::new(ModelIoState::Idle as u8)),
            done_tx,
            done_rx,
        }
    }

    #[inline]
    pub fn state(&self) -> ModelIoState {
        ModelIoState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.state() != ModelIoState::Idle
    }

    /// Load `path` into `models` in the background.
    ///
    /// Fails with [`Error::ModelIoBusy`] while another task is running.
    pub fn start_load(&self, models: Arc<ModelSet>, path: impl AsRef<Path>) -> Result<()> {
        self.start(ModelIoState::Loading, path.as_ref(), move |path| models.load(path))
    }

    /// Save `models` to `path` in the background.
    pub fn start_save(&self, models: Arc<ModelSet>, path: impl AsRef<Path>) -> Result<()> {
        self.start(ModelIoState::Saving, path.as_ref(), move |path| models.save(path))
    }

    /// Next finished task, if any. Never blocks.
    pub fn poll(&self) -> Option<ModelIoOutcome> {
        self.done_rx.try_recv().ok()
    }

    /// Block until the next task finishes. `None` when nothing is running
    /// and nothing is left to report.
    pub fn wait(&self) -> Option<ModelIoOutcome> {
        if !self.is_busy() {
            return self.poll();
        }
        let outcome = self.done_rx.recv().ok();
        // the worker goes idle right after queueing its outcome
        while self.is_busy() {
            thread::yield_now();
        }
        outcome
    }

    fn start<F>(&self, stage: ModelIoState, path: &Path, task: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()> + Send + 'static,
    {
        if let Err(current) = self.state.compare_exchange(
            ModelIoState::Idle as u8,
            stage as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(Error::ModelIoBusy(ModelIoState::from_u8(current)));
        }

        let path = path.to_path_buf();
        let state = Arc::clone(&self.state);
        let done_tx = self.done_tx.clone();
        let spawned = thread::Builder::new()
            .name("duet-model-io".into())
            .spawn(move || {
                let result = task(&path);
                if let Err(e) = &result {
                    tracing::warn!("{:?} {} failed: {}", stage, path.display(), e);
                }
                // outcome is queued before the state goes idle
                let _ = done_tx.send(ModelIoOutcome {
                    stage,
                    path,
                    result,
                });
                state.store(ModelIoState::Idle as u8, Ordering::Release);
            });

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                self.state.store(ModelIoState::Idle as u8, Ordering::Release);
                Err(Error::Io(e))
            }
        }
    }
}

impl Default for ModelIo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::update_queue::ModelUpdate;
    use smallvec::smallvec;

    fn models() -> Arc<ModelSet> {
        let config = EngineConfig {
            seed: Some(9),
            ..Default::default()
        };
        Arc::new(ModelSet::new(&config))
    }

    fn trained() -> Arc<ModelSet> {
        let set = models();
        for note in [60u8, 62, 64, 60] {
            set.apply(&ModelUpdate::Onset {
                notes: smallvec![note],
                velocity: 90,
                polyphony: 1,
                ioi: Some(6_000),
            });
            set.apply(&ModelUpdate::Length { samples: 3_000 });
        }
        set
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [ModelIoState::Idle, ModelIoState::Loading, ModelIoState::Saving] {
            assert_eq!(ModelIoState::from_u8(state as u8), state);
        }
        assert_eq!(ModelIoState::from_u8(200), ModelIoState::Idle);
    }

    #[test]
    fn test_background_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.bin.gz");
        let io = ModelIo::new();
        assert_eq!(io.state(), ModelIoState::Idle);

        let source = trained();
        io.start_save(Arc::clone(&source), &path).unwrap();
        let saved = io.wait().unwrap();
        assert_eq!(saved.stage, ModelIoState::Saving);
        assert!(saved.result.is_ok());

        let target = models();
        io.start_load(Arc::clone(&target), &path).unwrap();
        let loaded = io.wait().unwrap();
        assert_eq!(loaded.stage, ModelIoState::Loading);
        assert_eq!(loaded.path, path);
        assert!(loaded.result.is_ok());
        assert_eq!(target.primary_size(), source.primary_size());

        assert!(io.wait().is_none());
        assert!(io.poll().is_none());
    }

    #[test]
    fn test_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let io = ModelIo::new();
        io.start_load(models(), dir.path().join("missing.txt")).unwrap();
        let outcome = io.wait().unwrap();
        assert!(outcome.result.is_err());
        assert!(!io.is_busy());
    }

    #[test]
    fn test_busy_rejects_second_task() {
        let io = ModelIo::new();
        io.state.store(ModelIoState::Saving as u8, Ordering::Release);
        assert!(io.is_busy());
        let err = io.start_load(models(), "unused.txt").unwrap_err();
        assert!(matches!(err, Error::ModelIoBusy(ModelIoState::Saving)));
        assert!(io.poll().is_none());
    }
}

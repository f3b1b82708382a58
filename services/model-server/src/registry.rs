//! Hot-swap store for the active (model, metadata, path) triple.
//!
//! Readers load an `Arc` snapshot without locking; a snapshot is always one
//! whole [`ServingState`], so model and metadata can never come from
//! different loads. Writers serialize on a mutex that is held only for the
//! pointer store, never for loading or hashing.

use crate::error::ServingError;
use crate::model::{Model, ModelMetadata};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub struct ServingState {
    /// 1 for the startup load, +1 per successful swap.
    pub generation: u64,
    pub path: PathBuf,
    pub model: Arc<Model>,
    pub metadata: ModelMetadata,
}

#[derive(Default)]
pub struct ModelRegistry {
    current: ArcSwapOption<ServingState>,
    // last generation handed out; guards writers
    writer: Mutex<u64>,
}

impl ModelRegistry {
    pub fn new() -> Self { Self::default() }

    /// Installs the startup model. Fails if anything is already installed.
    pub fn initialize(&self, path: PathBuf, model: Model, metadata: ModelMetadata) -> Result<Arc<ServingState>, ServingError> {
        let mut last = self.writer.lock();
        if *last != 0 { return Err(ServingError::AlreadyInitialized); }
        Ok(self.install(&mut last, path, model, metadata))
    }

    /// Atomically replaces the active state; concurrent readers see either the
    /// complete previous state or the complete new one.
    pub fn swap(&self, path: PathBuf, model: Model, metadata: ModelMetadata) -> Result<Arc<ServingState>, ServingError> {
        let mut last = self.writer.lock();
        if *last == 0 { return Err(ServingError::NoModelLoaded); }
        Ok(self.install(&mut last, path, model, metadata))
    }

    fn install(&self, last: &mut u64, path: PathBuf, model: Model, metadata: ModelMetadata) -> Arc<ServingState> {
        let generation = *last + 1;
        let state = Arc::new(ServingState { generation, path, model: Arc::new(model), metadata });
        self.current.store(Some(Arc::clone(&state)));
        *last = generation;
        state
    }

    pub fn get(&self) -> Result<Arc<ServingState>, ServingError> {
        self.current.load_full().ok_or(ServingError::NoModelLoaded)
    }

    pub fn generation(&self) -> u64 { (*self.current.load()).as_ref().map(|s| s.generation).unwrap_or(0) }
}

use anyhow::Result;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

use crate::services::retrieval::RetrievalProvider;

/// Lifecycle of the retrieval backend
#[derive(Clone)]
pub enum RetrievalState {
    Uninitialized,
    Initializing,
    Ready(Arc<dyn RetrievalProvider>),
    Failed(String),
}

impl RetrievalState {
    pub fn label(&self) -> &'static str {
        match self {
            RetrievalState::Uninitialized => "uninitialized",
            RetrievalState::Initializing => "initializing",
            RetrievalState::Ready(_) => "ready",
            RetrievalState::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Debug for RetrievalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalState::Failed(reason) => write!(f, "Failed({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Shared, once-only initialised handle to the retrieval backend.
///
/// Readers see either a finished provider or a not-ready state, never a
/// half-built one.
#[derive(Clone)]
pub struct RetrievalHandle {
    state: Arc<Mutex<RetrievalState>>,
}

impl Default for RetrievalHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RetrievalState::Uninitialized)),
        }
    }

    /// Handle that is already Ready (tests, embedded use)
    pub fn ready(provider: Arc<dyn RetrievalProvider>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RetrievalState::Ready(provider))),
        }
    }

    pub fn state(&self) -> RetrievalState {
        self.state.lock().clone()
    }

    pub fn provider(&self) -> Option<Arc<dyn RetrievalProvider>> {
        match &*self.state.lock() {
            RetrievalState::Ready(provider) => Some(provider.clone()),
            _ => None,
        }
    }

    /// Run `init` unless the backend is Ready or already being built.
    ///
    /// Returns `true` when this call performed the initialisation. A failed
    /// attempt can be retried; `force` rebuilds even a Ready backend.
    pub async fn initialize<F, Fut>(&self, force: bool, init: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn RetrievalProvider>>>,
    {
        {
            let mut state = self.state.lock();
            match &*state {
                RetrievalState::Initializing => return false,
                RetrievalState::Ready(_) if !force => return false,
                _ => {}
            }
            *state = RetrievalState::Initializing;
        }

        info!("Initializing retrieval components...");

        let next = match init().await {
            Ok(provider) => {
                info!("Retrieval initialized successfully");
                RetrievalState::Ready(provider)
            }
            Err(e) => {
                error!("Retrieval initialization failed: {:#}", e);
                RetrievalState::Failed(e.to_string())
            }
        };

        *self.state.lock() = next;
        true
    }
}

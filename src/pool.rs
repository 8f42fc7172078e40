//! Bounded worker pool for decode requests
//!
//! A fixed rayon thread pool runs requests; at most `queue_capacity` requests
//! may be queued or running at once, and `submit` rejects the rest with
//! [`ScanError::QueueFull`] instead of spawning more threads. Every request
//! still gets its own engine from the factory.

use crate::config::ScanConfig;
use crate::decoder::{EngineFactory, qr_engine_factory};
use crate::dispatch::{DecodeHandle, ResultDispatcher};
use crate::error::{ScanError, ScanResult};
use crate::loader::{FileImageLoader, ImageLoader, ReadPermission};
use crate::pipeline::DecodeCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Releases one in-flight slot when dropped, including during a panic
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Fixed-size pool with a bounded request queue
pub struct DecodePool {
    pool: rayon::ThreadPool,
    in_flight: Arc<AtomicUsize>,
    config: ScanConfig,
    loader: Arc<dyn ImageLoader>,
    permission: Arc<dyn ReadPermission>,
    engines: EngineFactory,
}

impl DecodePool {
    /// Pool sized from `config`, using the file loader and QR engine
    pub fn new(config: ScanConfig) -> ScanResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(|i| format!("qr-decode-{}", i))
            .panic_handler(|_| warn!("Decode worker panicked"))
            .build()
            .map_err(|e| ScanError::WorkerPool(e.to_string()))?;
        Ok(Self {
            pool,
            in_flight: Arc::new(AtomicUsize::new(0)),
            loader: Arc::new(FileImageLoader::new(config.max_pixels, config.max_dimension)),
            permission: Arc::new(true),
            engines: qr_engine_factory(),
            config,
        })
    }

    /// Replace the image loader shared by all requests
    pub fn with_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the permission verdict
    pub fn with_permission(mut self, permission: Arc<dyn ReadPermission>) -> Self {
        self.permission = permission;
        self
    }

    /// Replace the engine factory
    pub fn with_engine_factory(mut self, engines: EngineFactory) -> Self {
        self.engines = engines;
        self
    }

    /// Requests queued or running right now
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Maximum requests in flight
    pub fn capacity(&self) -> usize {
        self.config.queue_capacity
    }

    /// Queue a request, or fail with `QueueFull` when the pool is saturated
    pub fn submit(&self, path: impl Into<PathBuf>) -> ScanResult<DecodeHandle> {
        let capacity = self.capacity();
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|_| ScanError::QueueFull { capacity })?;
        let slot = Slot(self.in_flight.clone());

        let path = path.into();
        let coordinator = DecodeCoordinator::from_parts(
            &self.config,
            self.loader.clone(),
            self.permission.clone(),
            (self.engines)(self.config.hints),
        );
        let cancel = coordinator.cancel_token();
        let state = coordinator.state_cell();
        let (dispatcher, rx) = ResultDispatcher::channel();

        debug!(path = %path.display(), in_flight = self.in_flight(), "Queued decode request");
        self.pool.spawn(move || {
            let (outcome, points) = coordinator.finish(&path);
            // Free the slot before the caller can observe the outcome
            drop(slot);
            dispatcher.deliver(outcome, points);
        });

        Ok(DecodeHandle::new(rx, cancel, state, None))
    }
}

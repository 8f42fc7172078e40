//! One decode request, from file path to terminal outcome
//!
//! States run strictly in order:
//! `Idle -> LoadingImage -> Converting -> Decoding -> Completed`.
//! Any failure, and any cancellation seen at a transition, jumps straight to
//! `Completed` with a `Failure` outcome. Every request ends with exactly one
//! delivery through its [`ResultDispatcher`].

use crate::config::ScanConfig;
use crate::decoder::{DecodeEngine, QrEngine};
use crate::dispatch::{DecodeHandle, ResultDispatcher};
use crate::error::{ScanError, ScanResult};
use crate::loader::{FileImageLoader, ImageLoader, ReadPermission};
use crate::models::{ChromaBuffer, DecodeOutcome, DecodeRequest, FailureReason, PixelImage, Point};
use crate::utils::yuv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Shared cancellation flag for one request
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once [`CancelToken::cancel`] was called
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DecodeState {
    /// Created, not started
    Idle = 0,
    /// Checking permission and rasterizing the file
    LoadingImage = 1,
    /// Packed color to NV21
    Converting = 2,
    /// Engine call in progress
    Decoding = 3,
    /// Outcome produced
    Completed = 4,
}

impl DecodeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => DecodeState::Idle,
            1 => DecodeState::LoadingImage,
            2 => DecodeState::Converting,
            3 => DecodeState::Decoding,
            _ => DecodeState::Completed,
        }
    }
}

/// State readable from the caller while the worker advances it
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    /// Cell starting at `Idle`
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(DecodeState::Idle as u8)))
    }

    /// Current state
    pub fn get(&self) -> DecodeState {
        DecodeState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: DecodeState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates a single decode request
///
/// `submit` and `run` consume the coordinator: the engine it owns is not
/// reentrant, so one instance serves exactly one request.
pub struct DecodeCoordinator {
    loader: Arc<dyn ImageLoader>,
    permission: Arc<dyn ReadPermission>,
    engine: Box<dyn DecodeEngine>,
    parallel_convert: bool,
    cancel: CancelToken,
    state: StateCell,
    progress: Option<ProgressFn>,
}

/// Called with each state the request enters, on the worker thread
pub type ProgressFn = Arc<dyn Fn(DecodeState) + Send + Sync>;

impl DecodeCoordinator {
    /// File loader and QR engine configured from `config`, permission granted
    pub fn new(config: &ScanConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(FileImageLoader::new(config.max_pixels, config.max_dimension)),
            Arc::new(true),
            Box::new(QrEngine::new(config.hints)),
        )
    }

    /// Coordinator over explicit collaborators; only conversion settings are
    /// taken from `config`
    pub fn from_parts(
        config: &ScanConfig,
        loader: Arc<dyn ImageLoader>,
        permission: Arc<dyn ReadPermission>,
        engine: Box<dyn DecodeEngine>,
    ) -> Self {
        Self {
            loader,
            permission,
            engine,
            parallel_convert: config.parallel_convert,
            cancel: CancelToken::new(),
            state: StateCell::new(),
            progress: None,
        }
    }

    /// Replace the image loader
    pub fn with_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the permission verdict
    pub fn with_permission(mut self, permission: Arc<dyn ReadPermission>) -> Self {
        self.permission = permission;
        self
    }

    /// Replace the decode engine
    pub fn with_engine(mut self, engine: Box<dyn DecodeEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Observe an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report every state change to `progress`
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Token that cancels this request
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current state
    pub fn state(&self) -> DecodeState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// Spawn a dedicated worker thread for `path` and return the caller's handle
    pub fn submit(self, path: impl Into<PathBuf>) -> DecodeHandle {
        let path = path.into();
        let (dispatcher, rx) = ResultDispatcher::channel();
        let cancel = self.cancel.clone();
        let state = self.state.clone();

        // The closure owns the dispatcher; if spawning fails it is dropped
        // unsent and the handle reports Failure(Error).
        let worker = std::thread::Builder::new()
            .name("qr-decode".to_string())
            .spawn(move || self.run(&path, dispatcher));
        let worker = match worker {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!(error = %e, "Failed to spawn decode worker");
                None
            }
        };
        DecodeHandle::new(rx, cancel, state, worker)
    }

    /// Run the whole state machine on the current thread and deliver once
    pub fn run(self, path: &Path, dispatcher: ResultDispatcher) {
        let (outcome, points) = self.finish(path);
        dispatcher.deliver(outcome, points);
    }

    /// Run the state machine without delivering
    pub(crate) fn finish(mut self, path: &Path) -> (DecodeOutcome, Vec<Point>) {
        self.execute(path)
    }

    fn execute(&mut self, path: &Path) -> (DecodeOutcome, Vec<Point>) {
        let result = self
            .advance_through(path)
            .and_then(|found| self.check_cancel().map(|_| found));
        self.enter(DecodeState::Completed);

        match result {
            Ok((outcome, points)) => (outcome, points),
            Err(ScanError::Cancelled) => {
                debug!(path = %path.display(), "Decode cancelled");
                (DecodeOutcome::Failure(FailureReason::Cancelled), Vec::new())
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Decode request failed");
                (DecodeOutcome::Failure(err.failure_reason()), Vec::new())
            }
        }
    }

    fn advance_through(&mut self, path: &Path) -> ScanResult<(DecodeOutcome, Vec<Point>)> {
        self.transition(DecodeState::LoadingImage)?;
        let image = self.load(path)?;

        self.transition(DecodeState::Converting)?;
        let buffer = self.convert(image)?;

        self.transition(DecodeState::Decoding)?;
        let request = DecodeRequest::new(buffer);
        let start = Instant::now();
        let outcome = self.engine.decode(request);
        let points = self.engine.possible_points().to_vec();

        let elapsed_ms = start.elapsed().as_millis();
        match &outcome {
            DecodeOutcome::Success(symbol) => {
                info!(symbology = %symbol.symbology, elapsed_ms, "Found barcode")
            }
            DecodeOutcome::Failure(reason) => {
                debug!(?reason, elapsed_ms, points = points.len(), "No barcode decoded")
            }
        }
        Ok((outcome, points))
    }

    fn transition(&self, next: DecodeState) -> ScanResult<()> {
        self.check_cancel()?;
        self.enter(next);
        Ok(())
    }

    fn enter(&self, state: DecodeState) {
        self.state.set(state);
        trace!(?state, "Decode state changed");
        if let Some(progress) = &self.progress {
            progress(state);
        }
    }

    fn check_cancel(&self) -> ScanResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        Ok(())
    }

    fn load(&self, path: &Path) -> ScanResult<PixelImage> {
        if !self.permission.is_granted(path) {
            return Err(ScanError::PermissionDenied(path.to_path_buf()));
        }
        self.loader.load(path)
    }

    fn convert(&self, image: PixelImage) -> ScanResult<ChromaBuffer> {
        if self.parallel_convert {
            yuv::convert_parallel(image)
        } else {
            yuv::convert(image)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecodedSymbol, Symbology};
    use std::sync::Mutex;

    struct FixedLoader(PixelImage);

    impl ImageLoader for FixedLoader {
        fn load(&self, _path: &Path) -> ScanResult<PixelImage> {
            Ok(self.0.clone())
        }
    }

    struct FailingLoader;

    impl ImageLoader for FailingLoader {
        fn load(&self, path: &Path) -> ScanResult<PixelImage> {
            Err(ScanError::ImageLoad {
                path: path.to_path_buf(),
                reason: "corrupt".to_string(),
            })
        }
    }

    /// Engine that echoes the luma of pixel (0, 0) as text
    struct EchoEngine {
        calls: Arc<Mutex<usize>>,
        points: Vec<Point>,
    }

    impl DecodeEngine for EchoEngine {
        fn decode(&mut self, request: DecodeRequest) -> DecodeOutcome {
            *self.calls.lock().unwrap() += 1;
            self.points = vec![Point::new(0.0, 0.0)];
            let luma = request.buffer().luma_at(0, 0);
            DecodeOutcome::Success(DecodedSymbol {
                text: luma.to_string(),
                symbology: Symbology::QrCode,
                raw_bytes: vec![luma],
                possible_points: vec![],
            })
        }

        fn possible_points(&self) -> &[Point] {
            &self.points
        }
    }

    fn coordinator(loader: Arc<dyn ImageLoader>, calls: Arc<Mutex<usize>>) -> DecodeCoordinator {
        DecodeCoordinator::new(&ScanConfig::default())
            .with_loader(loader)
            .with_engine(Box::new(EchoEngine {
                calls,
                points: vec![],
            }))
    }

    #[test]
    fn test_run_success_delivers_points() {
        let calls = Arc::new(Mutex::new(0));
        let loader = Arc::new(FixedLoader(PixelImage::filled(4, 4, 0xff00_0000)));
        let handle = coordinator(loader, calls.clone()).submit("black.png");
        let (outcome, points) = handle.wait_with_points();
        match outcome {
            DecodeOutcome::Success(symbol) => assert_eq!(symbol.text, "16"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(points, Some(vec![Point::new(0.0, 0.0)]));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_permission_denied_is_error() {
        let calls = Arc::new(Mutex::new(0));
        let loader = Arc::new(FixedLoader(PixelImage::filled(4, 4, 0)));
        let outcome = coordinator(loader, calls.clone())
            .with_permission(Arc::new(false))
            .submit("secret.png")
            .wait();
        assert_eq!(outcome, DecodeOutcome::Failure(FailureReason::Error));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_load_failure_is_error() {
        let calls = Arc::new(Mutex::new(0));
        let outcome = coordinator(Arc::new(FailingLoader), calls.clone())
            .submit("broken.png")
            .wait();
        assert_eq!(outcome, DecodeOutcome::Failure(FailureReason::Error));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_invalid_geometry_is_error() {
        let calls = Arc::new(Mutex::new(0));
        let loader = Arc::new(FixedLoader(PixelImage::filled(1, 1, 0)));
        let outcome = coordinator(loader, calls.clone()).submit("dot.png").wait();
        assert_eq!(outcome, DecodeOutcome::Failure(FailureReason::Error));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_cancel_before_start() {
        let calls = Arc::new(Mutex::new(0));
        let loader = Arc::new(FixedLoader(PixelImage::filled(4, 4, 0)));
        let coordinator = coordinator(loader, calls.clone());
        coordinator.cancel_token().cancel();
        let handle = coordinator.submit("any.png");
        let (outcome, points) = handle.wait_with_points();
        assert_eq!(outcome, DecodeOutcome::Failure(FailureReason::Cancelled));
        assert_eq!(points, Some(vec![]));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_run_inline_reaches_completed() {
        let calls = Arc::new(Mutex::new(0));
        let loader = Arc::new(FixedLoader(PixelImage::filled(6, 4, 0xffff_ffff)));
        let coordinator = coordinator(loader, calls);
        let state = coordinator.state.clone();
        assert_eq!(coordinator.state(), DecodeState::Idle);

        let (dispatcher, rx) = ResultDispatcher::channel();
        coordinator.run(Path::new("white.png"), dispatcher);
        assert_eq!(state.get(), DecodeState::Completed);
        match rx.recv().unwrap() {
            crate::dispatch::DispatchMessage::Outcome(DecodeOutcome::Success(symbol)) => {
                assert_eq!(symbol.text, "235");
            }
            other => panic!("unexpected first message {:?}", other),
        }
    }

    #[test]
    fn test_parallel_convert_same_result() {
        let calls = Arc::new(Mutex::new(0));
        let loader = Arc::new(FixedLoader(PixelImage::filled(8, 8, 0xff80_4020)));
        let mut config = ScanConfig::default();
        config.parallel_convert = true;
        let outcome = DecodeCoordinator::new(&config)
            .with_loader(loader)
            .with_engine(Box::new(EchoEngine {
                calls,
                points: vec![],
            }))
            .submit("tone.png")
            .wait();
        let expected = yuv::luma(0xff80_4020).to_string();
        match outcome {
            DecodeOutcome::Success(symbol) => assert_eq!(symbol.text, expected),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    /// Cancels its token from inside `load`, then succeeds
    struct CancellingLoader {
        cancel: CancelToken,
        seen: StateCell,
        observed: Arc<Mutex<Vec<DecodeState>>>,
    }

    impl ImageLoader for CancellingLoader {
        fn load(&self, _path: &Path) -> ScanResult<PixelImage> {
            self.observed.lock().unwrap().push(self.seen.get());
            self.cancel.cancel();
            Ok(PixelImage::filled(4, 4, 0xffff_ffff))
        }
    }

    /// Cancels its token from inside `decode`, then reports a symbol anyway
    struct CancellingEngine {
        cancel: Option<CancelToken>,
        seen: StateCell,
        observed: Arc<Mutex<Vec<DecodeState>>>,
        points: Vec<Point>,
    }

    impl DecodeEngine for CancellingEngine {
        fn decode(&mut self, _request: DecodeRequest) -> DecodeOutcome {
            self.observed.lock().unwrap().push(self.seen.get());
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
            }
            self.points = vec![Point::new(1.0, 1.0)];
            DecodeOutcome::Success(DecodedSymbol {
                text: "late".to_string(),
                symbology: Symbology::QrCode,
                raw_bytes: b"late".to_vec(),
                possible_points: vec![],
            })
        }

        fn possible_points(&self) -> &[Point] {
            &self.points
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<DecodeState>>>, ProgressFn) {
        let entered = Arc::new(Mutex::new(Vec::new()));
        let sink = entered.clone();
        let progress: ProgressFn =
            Arc::new(move |state: DecodeState| sink.lock().unwrap().push(state));
        (entered, progress)
    }

    fn engine_for(
        coordinator: &DecodeCoordinator,
        cancel: Option<CancelToken>,
        observed: &Arc<Mutex<Vec<DecodeState>>>,
    ) -> Box<dyn DecodeEngine> {
        Box::new(CancellingEngine {
            cancel,
            seen: coordinator.state_cell(),
            observed: observed.clone(),
            points: vec![],
        })
    }

    #[test]
    fn test_states_entered_in_order() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (entered, progress) = recorder();
        let coordinator = coordinator(
            Arc::new(FixedLoader(PixelImage::filled(4, 4, 0))),
            Arc::new(Mutex::new(0)),
        )
        .with_progress(progress);
        assert_eq!(coordinator.state(), DecodeState::Idle);
        let engine = engine_for(&coordinator, None, &observed);

        let outcome = coordinator.with_engine(engine).submit("order.png").wait();
        assert!(outcome.is_success());
        assert_eq!(
            *entered.lock().unwrap(),
            vec![
                DecodeState::LoadingImage,
                DecodeState::Converting,
                DecodeState::Decoding,
                DecodeState::Completed,
            ]
        );
        assert_eq!(*observed.lock().unwrap(), vec![DecodeState::Decoding]);
    }

    #[test]
    fn test_cancel_during_load_stops_before_converting() {
        let cancel = CancelToken::new();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (entered, progress) = recorder();
        let coordinator = DecodeCoordinator::new(&ScanConfig::default())
            .with_cancel_token(cancel.clone())
            .with_progress(progress);
        let loader = Arc::new(CancellingLoader {
            cancel: cancel.clone(),
            seen: coordinator.state_cell(),
            observed: observed.clone(),
        });
        let engine_calls = Arc::new(Mutex::new(Vec::new()));
        let engine = engine_for(&coordinator, None, &engine_calls);

        let (outcome, points) = coordinator
            .with_loader(loader)
            .with_engine(engine)
            .submit("slow.png")
            .wait_with_points();
        assert_eq!(outcome, DecodeOutcome::Failure(FailureReason::Cancelled));
        assert_eq!(points, Some(vec![]));
        assert_eq!(*observed.lock().unwrap(), vec![DecodeState::LoadingImage]);
        assert!(engine_calls.lock().unwrap().is_empty());
        assert_eq!(
            *entered.lock().unwrap(),
            vec![DecodeState::LoadingImage, DecodeState::Completed]
        );
    }

    #[test]
    fn test_cancel_during_convert_stops_before_decoding() {
        let coordinator = DecodeCoordinator::new(&ScanConfig::default())
            .with_loader(Arc::new(FixedLoader(PixelImage::filled(4, 4, 0))));
        let cancel = coordinator.cancel_token();
        let entered = Arc::new(Mutex::new(Vec::new()));
        let sink = entered.clone();
        let coordinator = coordinator.with_progress(Arc::new(move |state: DecodeState| {
            if state == DecodeState::Converting {
                cancel.cancel();
            }
            sink.lock().unwrap().push(state);
        }));
        let engine_calls = Arc::new(Mutex::new(Vec::new()));
        let engine = engine_for(&coordinator, None, &engine_calls);

        let outcome = coordinator.with_engine(engine).submit("convert.png").wait();
        assert_eq!(outcome, DecodeOutcome::Failure(FailureReason::Cancelled));
        assert!(engine_calls.lock().unwrap().is_empty());
        assert_eq!(
            *entered.lock().unwrap(),
            vec![
                DecodeState::LoadingImage,
                DecodeState::Converting,
                DecodeState::Completed,
            ]
        );
    }

    #[test]
    fn test_cancel_during_decode_discards_symbol() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (entered, progress) = recorder();
        let coordinator = coordinator(
            Arc::new(FixedLoader(PixelImage::filled(4, 4, 0))),
            Arc::new(Mutex::new(0)),
        )
        .with_progress(progress);
        let engine = engine_for(&coordinator, Some(coordinator.cancel_token()), &observed);
        let coordinator = coordinator.with_engine(engine);
        let state = coordinator.state_cell();

        let (outcome, points) = coordinator.submit("late.png").wait_with_points();
        assert_eq!(outcome, DecodeOutcome::Failure(FailureReason::Cancelled));
        assert_eq!(points, Some(vec![]));
        assert_eq!(*observed.lock().unwrap(), vec![DecodeState::Decoding]);
        assert_eq!(state.get(), DecodeState::Completed);
        assert_eq!(entered.lock().unwrap().last(), Some(&DecodeState::Completed));
    }
}

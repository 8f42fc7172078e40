//! Worker-to-caller result delivery
//!
//! Each request gets one FIFO channel. The worker side ([`ResultDispatcher`])
//! sends the terminal outcome first and the possible-points diagnostics
//! second; the caller side ([`DecodeHandle`]) reads on the caller's thread.
//! FIFO order is what keeps diagnostics behind the outcome.

use crate::models::{DecodeError, DecodeOutcome, DecodedCode, FailureReason, Point};
use crate::pipeline::{CancelToken, DecodeState, StateCell};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{trace, warn};

/// Messages on a request channel, in send order
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchMessage {
    /// Terminal outcome, always first
    Outcome(DecodeOutcome),
    /// Advisory candidate points, always after the outcome
    PossiblePoints(Vec<Point>),
}

/// Worker side of a request channel
///
/// `deliver` consumes the dispatcher, so a request can deliver at most once.
#[derive(Debug)]
pub struct ResultDispatcher {
    tx: Sender<DispatchMessage>,
}

impl ResultDispatcher {
    /// Connected dispatcher and raw receiver
    pub fn channel() -> (Self, Receiver<DispatchMessage>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    /// Post the outcome, then the diagnostics
    ///
    /// A caller that already went away is not an error; both messages are
    /// dropped.
    pub fn deliver(self, outcome: DecodeOutcome, possible_points: Vec<Point>) {
        if self.tx.send(DispatchMessage::Outcome(outcome)).is_err() {
            trace!("Caller dropped before outcome delivery");
            return;
        }
        if self
            .tx
            .send(DispatchMessage::PossiblePoints(possible_points))
            .is_err()
        {
            trace!("Caller dropped before diagnostics delivery");
        }
    }
}

/// Caller side of one decode request
pub struct DecodeHandle {
    rx: Receiver<DispatchMessage>,
    cancel: CancelToken,
    state: StateCell,
    worker: Option<JoinHandle<()>>,
}

impl DecodeHandle {
    pub(crate) fn new(
        rx: Receiver<DispatchMessage>,
        cancel: CancelToken,
        state: StateCell,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            rx,
            cancel,
            state,
            worker,
        }
    }

    /// Request cancellation; observed at the next state transition
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current state of the request
    pub fn state(&self) -> DecodeState {
        self.state.get()
    }

    /// Block until the terminal outcome arrives
    pub fn wait(self) -> DecodeOutcome {
        self.wait_with_points().0
    }

    /// Block for the outcome, then collect the diagnostics if the worker sent them
    pub fn wait_with_points(mut self) -> (DecodeOutcome, Option<Vec<Point>>) {
        let outcome = loop {
            match self.rx.recv() {
                Ok(DispatchMessage::Outcome(outcome)) => break outcome,
                Ok(DispatchMessage::PossiblePoints(_)) => continue,
                Err(_) => break Self::lost_worker(),
            }
        };
        let points = match self.rx.recv() {
            Ok(DispatchMessage::PossiblePoints(points)) => Some(points),
            _ => None,
        };
        self.join_worker();
        (outcome, points)
    }

    /// Wait up to `timeout`; on timeout the handle is returned unchanged
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<DecodeOutcome, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(DispatchMessage::Outcome(outcome)) => {
                self.discard_diagnostics();
                Ok(outcome)
            }
            Ok(DispatchMessage::PossiblePoints(_)) => self.wait_timeout(timeout),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Self::lost_worker()),
        }
    }

    /// Non-blocking poll, for callers that pump their own loop
    pub fn try_wait(mut self) -> Result<DecodeOutcome, Self> {
        match self.rx.try_recv() {
            Ok(DispatchMessage::Outcome(outcome)) => {
                self.discard_diagnostics();
                Ok(outcome)
            }
            Ok(DispatchMessage::PossiblePoints(_)) => self.try_wait(),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Self::lost_worker()),
        }
    }

    /// Wait on the current thread and invoke `callback` exactly once
    pub fn dispatch<F>(self, callback: F)
    where
        F: FnOnce(Result<DecodedCode, DecodeError>),
    {
        callback(self.wait().into_result());
    }

    /// Diagnostics that arrive after the outcome are dropped best-effort
    fn discard_diagnostics(&mut self) {
        if let Ok(DispatchMessage::PossiblePoints(points)) = self.rx.try_recv() {
            trace!(count = points.len(), "Discarding late possible points");
        }
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Decode worker panicked after delivering");
            }
        }
    }

    fn lost_worker() -> DecodeOutcome {
        warn!("Decode worker exited without an outcome");
        DecodeOutcome::Failure(FailureReason::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecodedSymbol, Symbology};

    fn handle(rx: Receiver<DispatchMessage>) -> DecodeHandle {
        DecodeHandle::new(rx, CancelToken::new(), StateCell::new(), None)
    }

    #[test]
    fn test_outcome_before_points() {
        let (dispatcher, rx) = ResultDispatcher::channel();
        dispatcher.deliver(
            DecodeOutcome::Failure(FailureReason::NotFound),
            vec![Point::new(1.0, 2.0)],
        );
        assert_eq!(
            rx.recv().unwrap(),
            DispatchMessage::Outcome(DecodeOutcome::Failure(FailureReason::NotFound))
        );
        assert_eq!(
            rx.recv().unwrap(),
            DispatchMessage::PossiblePoints(vec![Point::new(1.0, 2.0)])
        );
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_deliver_to_dropped_caller() {
        let (dispatcher, rx) = ResultDispatcher::channel();
        drop(rx);
        dispatcher.deliver(DecodeOutcome::Failure(FailureReason::Error), vec![]);
    }

    #[test]
    fn test_wait_with_points() {
        let (dispatcher, rx) = ResultDispatcher::channel();
        dispatcher.deliver(
            DecodeOutcome::Failure(FailureReason::NotFound),
            vec![Point::new(3.0, 4.0)],
        );
        let (outcome, points) = handle(rx).wait_with_points();
        assert_eq!(outcome.failure_reason(), Some(FailureReason::NotFound));
        assert_eq!(points, Some(vec![Point::new(3.0, 4.0)]));
    }

    #[test]
    fn test_lost_worker_is_error() {
        let (dispatcher, rx) = ResultDispatcher::channel();
        drop(dispatcher);
        assert_eq!(handle(rx).wait(), DecodeOutcome::Failure(FailureReason::Error));
    }

    #[test]
    fn test_try_wait_empty_returns_handle() {
        let (dispatcher, rx) = ResultDispatcher::channel();
        let pending = handle(rx).try_wait().err().expect("nothing delivered yet");
        dispatcher.deliver(DecodeOutcome::Failure(FailureReason::NotFound), vec![]);
        assert!(pending.try_wait().is_ok());
    }

    #[test]
    fn test_wait_timeout() {
        let (dispatcher, rx) = ResultDispatcher::channel();
        let pending = handle(rx)
            .wait_timeout(Duration::from_millis(10))
            .err()
            .expect("timed out");
        dispatcher.deliver(DecodeOutcome::Failure(FailureReason::Cancelled), vec![]);
        let outcome = pending.wait_timeout(Duration::from_secs(1)).ok().unwrap();
        assert_eq!(outcome.failure_reason(), Some(FailureReason::Cancelled));
    }

    #[test]
    fn test_dispatch_calls_back_once() {
        let (dispatcher, rx) = ResultDispatcher::channel();
        dispatcher.deliver(
            DecodeOutcome::Success(DecodedSymbol {
                text: "abc".to_string(),
                symbology: Symbology::QrCode,
                raw_bytes: b"abc".to_vec(),
                possible_points: vec![],
            }),
            vec![],
        );
        let mut calls = 0;
        handle(rx).dispatch(|result| {
            calls += 1;
            let code = result.unwrap();
            assert_eq!(code.code, "abc");
            assert_eq!(code.kind, "QR_CODE");
        });
        assert_eq!(calls, 1);
    }
}

//! Worker control block
//!
//! Signaling shared between the manager-facing side of a worker (`pause`,
//! `resume`, `stop`, `append_instruction`) and the worker's own step loop.
//!
//! ```text
//! manager side                     worker side
//! ------------                     -----------
//! request_pause()  ── paused ──▶   checkpoint() parks, publishes Paused
//!   Acknowledgement ◀── phase ──┘
//! request_resume() ── wake  ──▶   checkpoint() returns, publishes Running
//! request_stop()   ── cancel ─▶   checkpoint() -> Err(Stopped)
//! push_instruction ── queue ──▶   take_instructions()
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// What the worker's step loop is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Constructed, loop not started
    Idle,
    /// Between checkpoints
    Running,
    /// Parked at a checkpoint
    Paused,
    /// Loop returned
    Finished,
    /// Loop observed a stop request
    Stopped,
}

impl WorkerPhase {
    /// The loop will never publish another phase
    pub fn is_final(&self) -> bool {
        matches!(self, WorkerPhase::Finished | WorkerPhase::Stopped)
    }
}

/// Returned by [`WorkerControl::checkpoint`] once a stop was requested
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("worker stop requested")]
pub struct Stopped;

/// Resolves when the worker has observed a pause or resume request.
///
/// Output is the phase seen at resolution. That is either the requested
/// phase or a final one, when the loop exited before it could comply.
pub struct Acknowledgement {
    inner: BoxFuture<'static, WorkerPhase>,
}

impl Acknowledgement {
    /// Already acknowledged
    pub fn ready(phase: WorkerPhase) -> Self {
        Self {
            inner: futures::future::ready(phase).boxed(),
        }
    }

    fn awaiting(mut rx: watch::Receiver<WorkerPhase>, target: WorkerPhase) -> Self {
        let inner = async move {
            loop {
                let phase = *rx.borrow_and_update();
                if phase == target || phase.is_final() {
                    return phase;
                }
                if rx.changed().await.is_err() {
                    return *rx.borrow();
                }
            }
        };

        Self {
            inner: inner.boxed(),
        }
    }
}

impl Future for Acknowledgement {
    type Output = WorkerPhase;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for Acknowledgement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acknowledgement").finish_non_exhaustive()
    }
}

/// Shared control block; hold it in an `Arc`
pub struct WorkerControl {
    paused: AtomicBool,
    stop: CancellationToken,
    wake: Notify,
    instructions: Mutex<Vec<String>>,
    phase: watch::Sender<WorkerPhase>,
}

impl WorkerControl {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(WorkerPhase::Idle);

        Self {
            paused: AtomicBool::new(false),
            stop: CancellationToken::new(),
            wake: Notify::new(),
            instructions: Mutex::new(Vec::new()),
            phase,
        }
    }

    // ========================================================================
    // Manager side
    // ========================================================================

    /// Ask the loop to park at its next checkpoint
    pub fn request_pause(&self) -> Acknowledgement {
        self.paused.store(true, Ordering::SeqCst);
        Acknowledgement::awaiting(self.phase.subscribe(), WorkerPhase::Paused)
    }

    /// Release a parked loop
    pub fn request_resume(&self) -> Acknowledgement {
        self.paused.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
        Acknowledgement::awaiting(self.phase.subscribe(), WorkerPhase::Running)
    }

    /// Ask the loop to exit; idempotent
    pub fn request_stop(&self) {
        self.stop.cancel();
        self.wake.notify_waiters();
    }

    /// Queue an instruction for the loop's next step
    pub fn push_instruction(&self, text: impl Into<String>) {
        self.instructions.lock().push(text.into());
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.borrow()
    }

    pub fn is_pause_requested(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    // ========================================================================
    // Worker side
    // ========================================================================

    /// Park while paused; `Err(Stopped)` once a stop was requested.
    ///
    /// Publishing `Paused` on entry to the wait is what acknowledges a pause.
    pub async fn checkpoint(&self) -> Result<(), Stopped> {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.stop.is_cancelled() {
                self.publish(WorkerPhase::Stopped);
                return Err(Stopped);
            }

            if !self.paused.load(Ordering::SeqCst) {
                self.publish(WorkerPhase::Running);
                return Ok(());
            }

            self.publish(WorkerPhase::Paused);
            notified.await;
        }
    }

    /// Drain queued instructions
    pub fn take_instructions(&self) -> Vec<String> {
        std::mem::take(&mut *self.instructions.lock())
    }

    pub fn has_instructions(&self) -> bool {
        !self.instructions.lock().is_empty()
    }

    /// Final phase for a loop that returned on its own
    pub fn mark_finished(&self) {
        self.publish(WorkerPhase::Finished);
    }

    /// Completes once a stop was requested; race long calls against it
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.stop.cancelled()
    }

    fn publish(&self, next: WorkerPhase) {
        self.phase.send_if_modified(|current| {
            if *current == next || current.is_final() {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self::new()
    }
}

//! Signal intake and priority dispatch.
//!
//! A single logical consumer drains per-phase FIFO queues in strict
//! P3 > P2 > P1 order. "Simultaneous" signals are whatever sits buffered
//! between two scheduler passes: each pass snapshots the channel backlog
//! into the queues, then drains by priority.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use brain_core::{BrainDecision, BrainError, IntentSignal, PhaseId};
use tokio::sync::{mpsc, oneshot};

use crate::context::BrainContext;

/// One queued signal with its reply slot.
pub struct SignalJob {
    pub signal: IntentSignal,
    pub reply: Option<oneshot::Sender<Result<BrainDecision, BrainError>>>,
    pub enqueued_at: Instant,
}

/// Cloneable producer side handed to the ingress API.
#[derive(Clone)]
pub struct ArbiterHandle {
    tx: mpsc::Sender<SignalJob>,
    ctx: Arc<BrainContext>,
}

impl ArbiterHandle {
    /// Queue a signal and wait for its decision.
    pub async fn submit(&self, signal: IntentSignal) -> Result<BrainDecision, BrainError> {
        if !self.ctx.is_ready() {
            return Err(BrainError::NotReady);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = SignalJob {
            signal,
            reply: Some(reply_tx),
            enqueued_at: Instant::now(),
        };
        self.tx
            .send(job)
            .await
            .map_err(|_| BrainError::NotReady)?;
        reply_rx.await.map_err(|_| BrainError::NotReady)?
    }

    pub fn context(&self) -> &Arc<BrainContext> {
        &self.ctx
    }
}

pub struct Arbiter {
    rx: mpsc::Receiver<SignalJob>,
    ctx: Arc<BrainContext>,
    queues: [VecDeque<SignalJob>; 3],
}

impl Arbiter {
    pub fn new(ctx: Arc<BrainContext>) -> (Self, ArbiterHandle) {
        let (tx, rx) = mpsc::channel(ctx.config.queue_capacity);
        let handle = ArbiterHandle {
            tx,
            ctx: Arc::clone(&ctx),
        };
        (
            Self {
                rx,
                ctx,
                queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            },
            handle,
        )
    }

    /// Run the dispatch loop until all producers hang up.
    pub async fn run(mut self) {
        tracing::info!("arbiter dispatch loop started");
        while let Some(job) = self.rx.recv().await {
            self.enqueue(job);
            // Snapshot whatever else arrived since the last pass.
            while let Ok(job) = self.rx.try_recv() {
                self.enqueue(job);
            }
            self.drain_pass().await;
        }
        tracing::info!("arbiter dispatch loop stopped");
    }

    pub(crate) fn enqueue(&mut self, job: SignalJob) {
        let idx = job.signal.phase_id.index();
        self.queues[idx].push_back(job);
        self.publish_depths();
    }

    /// Drain everything buffered, highest priority phase first, FIFO within
    /// a phase.
    pub(crate) async fn drain_pass(&mut self) {
        for phase in [PhaseId::P3, PhaseId::P2, PhaseId::P1] {
            while let Some(mut job) = self.queues[phase.index()].pop_front() {
                self.publish_depths();
                let started = job.enqueued_at;
                let result = self.ctx.decide(job.signal.clone()).await;
                if let Ok(decision) = &result {
                    self.ctx.metrics.record_decision(
                        phase,
                        decision.approved,
                        started.elapsed().as_micros() as u64,
                    );
                }
                if let Some(reply) = job.reply.take() {
                    // The originator may have given up waiting; that is fine.
                    let _ = reply.send(result);
                }
            }
        }
        self.publish_depths();
    }

    fn publish_depths(&self) {
        for phase in PhaseId::ALL {
            self.ctx
                .metrics
                .set_queue_depth(phase, self.queues[phase.index()].len());
        }
    }
}

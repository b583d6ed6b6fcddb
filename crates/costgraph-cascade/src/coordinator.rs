//! Cost cascade coordinator.
//!
//! Consumes change events and pushes each changed composition's cost into
//! the compositions that use it. One wave handles one source:
//!
//! ```text
//! Idle ─▶ Dispatched ─▶ Applied ─▶ Republished ─▶ Idle
//!          find uses     refresh     batch of updated uses,
//!                        + persist   source flag cleared
//! ```
//!
//! A use is re-enqueued only when its subvalue moved or it was already
//! pending. A source whose `needs_uses_recompute` flag is clear is skipped,
//! which makes redelivered and duplicate events no-ops.

use crate::bus::{Delivery, Subscription, publish_event};
use crate::context::CascadeContext;
use crate::repository::RepositoryError;
use costgraph_memory::{Composition, CompositionEvent};
use costgraph_units::CostError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WavePhase {
    Idle,
    Dispatched,
    Applied,
    Republished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseFailure {
    pub use_id: String,
    pub error: String,
}

/// What one wave did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveReport {
    pub source: String,
    /// Last phase reached. `Idle` means the source had nothing pending.
    pub phase: WavePhase,
    /// Uses persisted and re-enqueued.
    pub updated: Vec<String>,
    /// Uses whose subvalue did not move.
    pub unchanged: Vec<String>,
    pub failed: Vec<UseFailure>,
}

impl WaveReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            phase: WavePhase::Idle,
            updated: Vec::new(),
            unchanged: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn skipped(&self) -> bool {
        self.phase == WavePhase::Idle
    }
}

enum UseOutcome {
    Updated(Composition),
    Unchanged,
    Detached,
}

#[derive(Debug, Clone)]
pub struct CascadeCoordinator {
    ctx: CascadeContext,
}

impl CascadeCoordinator {
    pub fn new(ctx: CascadeContext) -> Self {
        Self { ctx }
    }

    /// Subscribe to the changed and automatic queues and start one worker
    /// per queue. Subscriptions are in place when this returns.
    pub async fn spawn(self: Arc<Self>) -> Result<CoordinatorHandle, CostError> {
        let (shutdown, signal) = watch::channel(false);
        let mut workers = Vec::new();
        for routing in [&self.ctx.topology.changed, &self.ctx.topology.automatic] {
            let subscription = self.ctx.bus.subscribe(routing).await?;
            info!(queue = %routing.queue_name, routing_key = %routing.routing_key, "cascade worker subscribed");
            let coordinator = Arc::clone(&self);
            workers.push(tokio::spawn(
                coordinator.run_worker(subscription, signal.clone()),
            ));
        }
        Ok(CoordinatorHandle { shutdown, workers })
    }

    /// Queue one wave for every composition still flagged
    /// `needs_uses_recompute`, e.g. after an event was lost with the
    /// process that published it. Deleted compositions are included so
    /// their uses drop the contribution. Returns the queued ids.
    pub async fn resume_pending(&self) -> Result<Vec<String>, CostError> {
        let pending: Vec<Composition> = self
            .ctx
            .repo
            .find_all()
            .await?
            .into_iter()
            .filter(|composition| composition.needs_uses_recompute)
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = pending.iter().map(|c| c.id.clone()).collect();
        info!(pending = ids.len(), "resuming interrupted waves");
        publish_event(
            &*self.ctx.bus,
            &CompositionEvent::CompositionsUpdatedAutomatically {
                compositions: pending,
            },
            &self.ctx.topology.automatic,
        )
        .await?;
        Ok(ids)
    }

    async fn run_worker(self: Arc<Self>, mut subscription: Subscription, mut signal: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                changed = signal.changed() => {
                    if changed.is_err() || *signal.borrow() {
                        break;
                    }
                }
                delivery = subscription.next() => match delivery {
                    Some(delivery) => self.handle_delivery(delivery).await,
                    None => break,
                },
            }
        }
        debug!(queue = %subscription.queue(), "cascade worker stopped");
    }

    /// Decode, run the waves, then settle. Follow-up events are published
    /// before the ack.
    pub async fn handle_delivery(&self, delivery: Delivery) {
        let event: CompositionEvent = match delivery.decode() {
            Ok(event) => event,
            Err(err) => {
                warn!(kind = %delivery.kind(), error = %err, "undecodable event rejected");
                delivery.reject();
                return;
            }
        };

        match self.handle_event(&event).await {
            Ok(_) => delivery.ack(),
            Err(err) if delivery.redelivered() => {
                error!(kind = %event.type_name(), error = %err, "cascade failed again, dropping event");
                delivery.reject();
            }
            Err(err) => {
                warn!(kind = %event.type_name(), error = %err, "cascade failed, requeueing event");
                drop(delivery);
            }
        }
    }

    /// Run one wave per composition named by `event`.
    ///
    /// Every source is attempted; the first failure is returned after the
    /// rest have run.
    pub async fn handle_event(&self, event: &CompositionEvent) -> Result<Vec<WaveReport>, CostError> {
        if !event.triggers_cascade() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        let mut first_error = None;
        for id in event.composition_ids() {
            match self.cascade_from(&id).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    warn!(composition_id = %id, error = %err, "wave aborted");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }

    /// Propagate `id`'s current cost into each of its uses.
    pub async fn cascade_from(&self, id: &str) -> Result<WaveReport, CostError> {
        let _source_guard = self.ctx.locks.lock(id).await;
        let mut report = WaveReport::new(id);

        let mut source = match self.ctx.repo.find_by_id(id).await {
            Ok(source) => source,
            Err(RepositoryError::NotFound(_)) => {
                warn!(composition_id = %id, "wave source vanished");
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };
        if !source.needs_uses_recompute {
            debug!(composition_id = %id, "uses already current, wave skipped");
            return Ok(report);
        }

        report.phase = WavePhase::Dispatched;
        let uses = self.ctx.repo.find_uses(id).await?;
        debug!(composition_id = %id, uses = uses.len(), "wave dispatched");

        let mut updated = Vec::new();
        for using in uses {
            match self.apply_to_use(&source, &using.id).await {
                Ok(UseOutcome::Updated(composition)) => {
                    report.updated.push(composition.id.clone());
                    updated.push(composition);
                }
                Ok(UseOutcome::Unchanged) => report.unchanged.push(using.id),
                Ok(UseOutcome::Detached) => {}
                Err(err) => {
                    warn!(composition_id = %id, use_id = %using.id, error = %err, "use recompute failed");
                    report.failed.push(UseFailure {
                        use_id: using.id,
                        error: err.to_string(),
                    });
                }
            }
        }
        report.phase = WavePhase::Applied;

        if !updated.is_empty() {
            publish_event(
                &*self.ctx.bus,
                &CompositionEvent::CompositionsUpdatedAutomatically {
                    compositions: updated,
                },
                &self.ctx.topology.automatic,
            )
            .await?;
        }

        source.needs_uses_recompute = false;
        self.ctx.repo.update(&source).await?;
        publish_event(
            &*self.ctx.bus,
            &CompositionEvent::CompositionUsesUpdatedSinceLastChange {
                composition: source,
            },
            &self.ctx.topology.uses_updated,
        )
        .await?;
        report.phase = WavePhase::Republished;

        info!(
            composition_id = %id,
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "wave complete"
        );
        Ok(report)
    }

    async fn apply_to_use(&self, source: &Composition, use_id: &str) -> Result<UseOutcome, CostError> {
        let _guard = self.ctx.locks.lock(use_id).await;
        let mut using = self.ctx.repo.find_by_id(use_id).await?;
        // Re-read under the lock: the edge may have gone since the lookup.
        if !using.enabled || !using.uses_composition(&source.id) {
            return Ok(UseOutcome::Detached);
        }

        let change = using.refresh_subvalue(source, &self.ctx.registry)?;
        if !change.changed() && !using.needs_uses_recompute {
            return Ok(UseOutcome::Unchanged);
        }

        using.rollup();
        using.needs_uses_recompute = true;
        using.touch_updated_at();
        self.ctx.repo.update(&using).await?;
        debug!(
            composition_id = %source.id,
            use_id = %use_id,
            previous = change.previous,
            current = change.current,
            cost = using.cost,
            "use recomputed"
        );
        Ok(UseOutcome::Updated(using))
    }
}

/// Running workers. Dropping the handle leaves them running.
#[derive(Debug)]
pub struct CoordinatorHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop the workers after their current delivery and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(err) = worker.await {
                error!(error = %err, "cascade worker panicked");
            }
        }
    }
}

//! Periodic sweep over all ticket threads plus on-demand requests.

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::engine::{SyncOutcome, Synchronizer};
use crate::chat::ChatPlatform;
use crate::lifecycle::LifecycleManager;
use crate::models::{ChannelId, Thread, TicketId};
use crate::util::with_timeout;
use crate::{Error, Result};

static TICKET_THREAD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Ticket\s+#(\d+)\b").expect("Invalid regex"));

/// Ticket id encoded in a thread name such as `Ticket #42: Printer on fire`.
///
/// `None` means the thread is not a ticket thread.
pub fn parse_ticket_id(thread_name: &str) -> Option<TicketId> {
    TICKET_THREAD_NAME
        .captures(thread_name)
        .and_then(|captures| captures[1].parse().ok())
        .map(TicketId)
}

/// Per-outcome counts for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub threads: usize,
    pub ticket_threads: usize,
    pub synced: usize,
    pub locked: usize,
    pub no_record: usize,
    pub failed: usize,
}

/// First thread whose name carries the ticket id
pub fn find_ticket_thread(threads: &[Thread], ticket_id: TicketId) -> Option<ChannelId> {
    threads
        .iter()
        .find(|thread| parse_ticket_id(&thread.name) == Some(ticket_id))
        .map(|thread| thread.id)
}

/// On-demand synchronization of one ticket
#[derive(Debug)]
pub struct SyncRequest {
    pub ticket_id: TicketId,
    /// Looked up by thread name when `None`
    pub thread_id: Option<ChannelId>,
    /// Clear the sync record before the pass
    pub repair: bool,
    pub reply: oneshot::Sender<Result<SyncReply>>,
}

impl SyncRequest {
    pub fn new(
        ticket_id: TicketId,
        thread_id: Option<ChannelId>,
        repair: bool,
    ) -> (Self, oneshot::Receiver<Result<SyncReply>>) {
        let (reply, receiver) = oneshot::channel();
        (
            Self {
                ticket_id,
                thread_id,
                repair,
                reply,
            },
            receiver,
        )
    }
}

/// Result of an on-demand pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReply {
    pub thread_id: ChannelId,
    /// The sync record was cleared before the pass
    pub record_cleared: bool,
    pub outcome: SyncOutcome,
}

pub struct SweepScheduler {
    synchronizer: Arc<Synchronizer>,
    chat: Arc<dyn ChatPlatform>,
    lifecycle: Option<Arc<LifecycleManager>>,
    sync_interval: Duration,
    lifecycle_interval: Duration,
}

impl SweepScheduler {
    pub fn new(
        synchronizer: Arc<Synchronizer>,
        chat: Arc<dyn ChatPlatform>,
        sync_interval: Duration,
    ) -> Self {
        Self {
            synchronizer,
            chat,
            lifecycle: None,
            sync_interval,
            lifecycle_interval: Duration::from_secs(86_400),
        }
    }

    /// Also run the lifecycle sweeps every `interval`.
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Arc<LifecycleManager>, interval: Duration) -> Self {
        self.lifecycle = Some(lifecycle);
        self.lifecycle_interval = interval;
        self
    }

    /// Synchronize every ticket thread once.
    ///
    /// A failing (or panicking) thread is logged and counted; the sweep goes
    /// on with the rest. Only failing to list threads fails the sweep.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let threads = self.list_threads().await?;
        let mut report = SweepReport {
            threads: threads.len(),
            ..SweepReport::default()
        };

        for thread in threads {
            let Some(ticket_id) = parse_ticket_id(&thread.name) else {
                continue;
            };
            report.ticket_threads += 1;

            match self.sync_isolated(ticket_id, &thread).await {
                Some(SyncOutcome::Synced(_)) => report.synced += 1,
                Some(SyncOutcome::Locked) => report.locked += 1,
                Some(SyncOutcome::NoRecord { .. }) => report.no_record += 1,
                None => report.failed += 1,
            }
        }

        tracing::info!(
            threads = report.threads,
            ticket_threads = report.ticket_threads,
            synced = report.synced,
            locked = report.locked,
            no_record = report.no_record,
            failed = report.failed,
            "Sweep finished"
        );
        Ok(report)
    }

    /// Synchronize one ticket now, through the same locks as the sweeps.
    ///
    /// A repair that finds the ticket locked reports [`SyncOutcome::Locked`]
    /// without running the pass.
    pub async fn sync_on_demand(
        &self,
        ticket_id: TicketId,
        thread_id: Option<ChannelId>,
        repair: bool,
    ) -> Result<SyncReply> {
        let thread_id = match thread_id {
            Some(id) => id,
            None => find_ticket_thread(&self.list_threads().await?, ticket_id)
                .ok_or(Error::ThreadNotFound(ticket_id))?,
        };

        let mut reply = SyncReply {
            thread_id,
            record_cleared: false,
            outcome: SyncOutcome::Locked,
        };
        if repair {
            reply.record_cleared = self.synchronizer.reset_record(ticket_id).await?;
            if !reply.record_cleared {
                return Ok(reply);
            }
        }
        reply.outcome = self.synchronizer.synchronize(ticket_id, thread_id).await?;
        Ok(reply)
    }

    async fn list_threads(&self) -> Result<Vec<Thread>> {
        with_timeout(
            "list_threads",
            self.synchronizer.settings().call_timeout,
            self.chat.list_threads(),
        )
        .await
    }

    async fn sync_isolated(&self, ticket_id: TicketId, thread: &Thread) -> Option<SyncOutcome> {
        let synchronizer = Arc::clone(&self.synchronizer);
        let thread_id = thread.id;
        let task =
            tokio::spawn(async move { synchronizer.synchronize(ticket_id, thread_id).await });

        match task.await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(error)) => {
                tracing::error!(
                    ticket_id = ticket_id.get(),
                    thread_id = thread_id.get(),
                    thread = %thread.name,
                    transient = error.is_transient(),
                    %error,
                    "Thread synchronization failed"
                );
                None
            }
            Err(error) => {
                tracing::error!(
                    ticket_id = ticket_id.get(),
                    thread_id = thread_id.get(),
                    thread = %thread.name,
                    %error,
                    "Thread synchronization task aborted"
                );
                None
            }
        }
    }

    /// Drive sweeps, lifecycle runs and on-demand requests until `shutdown`
    /// resolves. Every tick and request becomes its own task; they all go
    /// through the same [`Synchronizer`] and therefore the same locks.
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::Receiver<SyncRequest>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut sync_tick = tokio::time::interval(self.sync_interval);
        sync_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut lifecycle_tick = tokio::time::interval(self.lifecycle_interval);
        lifecycle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            sync_interval = ?self.sync_interval,
            lifecycle_enabled = self.lifecycle.is_some(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = sync_tick.tick() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(error) = scheduler.sweep_once().await {
                            tracing::error!(%error, "Sweep failed to list threads");
                        }
                    });
                }
                _ = lifecycle_tick.tick(), if self.lifecycle.is_some() => {
                    if let Some(lifecycle) = self.lifecycle.clone() {
                        tokio::spawn(async move { lifecycle.run_sweeps(Utc::now()).await });
                    }
                }
                Some(request) = requests.recv() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        let reply = scheduler
                            .sync_on_demand(request.ticket_id, request.thread_id, request.repair)
                            .await;
                        if request.reply.send(reply).is_err() {
                            tracing::debug!(
                                ticket_id = request.ticket_id.get(),
                                "Sync requester went away before the reply"
                            );
                        }
                    });
                }
            }
        }
    }
}

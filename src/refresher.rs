//! The process-wide refresh loop.
//!
//! A single [`Refresher`] owns every write to the snapshot row. Each step it
//! checks freshness, refreshes when due, and publishes what happened on a
//! broadcast channel that streaming clients subscribe to.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};

use crate::config::RefreshConfig;
use crate::error::{RefreshError, StoreError};
use crate::exchange_rate::{RateSnapshot, RatesView};
use crate::freshness::{self, Freshness};
use crate::inversion;
use crate::provider::RateSource;
use crate::store::RateStore;

const FEED_CAPACITY: usize = 32;

/// One message on the feed.
///
/// Serialized as a bare JSON string for statuses and a rates object for
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Update {
    Status(String),
    Snapshot(RatesView),
}

/// Subscribe-only handle to a refresher's feed.
///
/// Holds no strong reference, so the channel closes once the refresher is
/// gone. The default handle is attached to nothing.
#[derive(Clone, Default)]
pub struct Feed(Weak<Refresher>);

impl Feed {
    /// `None` once the refresher has stopped.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Update>> {
        self.0.upgrade().map(|refresher| refresher.subscribe())
    }
}

pub struct Refresher {
    store: Arc<dyn RateStore>,
    source: Arc<dyn RateSource>,
    config: RefreshConfig,
    updates: broadcast::Sender<Update>,
    cycle: Mutex<()>,
}

impl Refresher {
    pub fn new(
        store: Arc<dyn RateStore>,
        source: Arc<dyn RateSource>,
        config: RefreshConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            store,
            source,
            config,
            updates,
            cycle: Mutex::new(()),
        }
    }

    pub fn feed(self: &Arc<Self>) -> Feed {
        Feed(Arc::downgrade(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Steps forever. Failures are reported on the feed, never fatal.
    pub async fn run(&self) {
        info!(
            "refresher started: ttl {}s, poll {}s, retry {}s, source {}",
            self.config.ttl.as_secs(),
            self.config.poll_interval.as_secs(),
            self.config.retry_interval.as_secs(),
            self.source.name()
        );
        loop {
            let wait = self.step().await;
            tokio::time::sleep(wait).await;
        }
    }

    /// One pass of the loop. Returns how long to wait before the next one.
    pub async fn step(&self) -> Duration {
        let freshness = match self.freshness().await {
            Ok(freshness) => freshness,
            Err(err) => {
                warn!("could not read snapshot: {}", err);
                self.publish(Update::Status(format!(
                    "storage unavailable; retrying in {} seconds",
                    self.config.retry_interval.as_secs()
                )));
                return self.config.retry_interval;
            }
        };

        if !freshness.due {
            let minutes = freshness.remaining.num_milliseconds() as f64 / 60_000.0;
            debug!("snapshot fresh for another {:.2} minutes", minutes);
            self.publish(Update::Status(format!(
                "time remaining: {:.2} minutes",
                minutes
            )));
            return self.config.poll_interval;
        }

        self.publish(Update::Status("updating".to_string()));
        match self.refresh().await {
            Ok(snapshot) => {
                self.publish(Update::Snapshot(RatesView::from(&snapshot)));
                self.config.poll_interval
            }
            // A failed fetch leaves the snapshot stale, so waiting only the
            // poll interval would spend a provider request every few seconds.
            Err(err) => {
                warn!("refresh failed: {}", err);
                self.publish(Update::Status(format!(
                    "update failed: {}; retrying in {} seconds",
                    err,
                    self.config.retry_interval.as_secs()
                )));
                self.config.retry_interval
            }
        }
    }

    /// Refreshes the snapshot unless another caller just did.
    ///
    /// Callers are serialized; whoever waited on the lock re-checks freshness
    /// so one stale period costs one provider request.
    pub async fn refresh(&self) -> Result<RateSnapshot, RefreshError> {
        let _cycle = self.cycle.lock().await;

        if let Some(snapshot) = self.store.current().await? {
            let since = Some(snapshot.updated_at);
            if !freshness::check(since, Utc::now(), self.ttl()).due {
                debug!("snapshot refreshed while waiting; skipping fetch");
                return Ok(snapshot);
            }
        }

        self.run_cycle().await
    }

    /// Fetch, persist, invert, re-read. Callers hold `cycle`.
    async fn run_cycle(&self) -> Result<RateSnapshot, RefreshError> {
        let quote = self.source.fetch().await?;
        let now = Utc::now();
        self.store.upsert_quote(&quote, now).await?;

        let inversion =
            inversion::invert_and_persist(self.store.as_ref(), &quote.rates, now).await?;
        info!(
            "rates refreshed from {} (base {}): {} inverted, {} skipped",
            self.source.name(),
            quote.base,
            inversion.inverted.len(),
            inversion.skipped.len()
        );

        let snapshot = self
            .store
            .current()
            .await?
            .ok_or(StoreError::MissingSnapshot)?;
        Ok(snapshot)
    }

    async fn freshness(&self) -> Result<Freshness, StoreError> {
        let last_modified = self.store.current().await?.map(|s| s.updated_at);
        Ok(freshness::check(last_modified, Utc::now(), self.ttl()))
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX)
    }

    fn publish(&self, update: Update) {
        // No subscribers is normal between connections.
        let _ = self.updates.send(update);
    }
}

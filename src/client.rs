//! Fan-in point for all relay links.
//!
//! Every [`RelayLink`] pushes decoded events into one shared pipeline:
//! [`Verifier`] first, then [`FreshnessTracker`]. The client is the only
//! caller of the consumer's `on_update` callback.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures_util::future::select_all;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    codec::TopicFilter,
    error::{ClientError, Result},
    event::Event,
    freshness::{AcceptedUpdate, Freshness, FreshnessTracker},
    relay::{EventSink, LinkOptions, LinkPhase, LinkSnapshot, RelayLink},
    verify::Verifier,
};

/// Relay endpoints and transport settings for a [`DistributionClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relays: Vec<String>,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
    pub tor_socks: Option<String>,
}

impl ClientConfig {
    pub fn new(relays: Vec<String>) -> Self {
        let defaults = LinkOptions::default();
        Self {
            relays,
            reconnect_interval: defaults.reconnect_interval,
            connect_timeout: defaults.connect_timeout,
            tor_socks: defaults.tor_socks,
        }
    }

    fn link_options(&self) -> LinkOptions {
        LinkOptions {
            reconnect_interval: self.reconnect_interval,
            connect_timeout: self.connect_timeout,
            tor_socks: self.tor_socks.clone(),
        }
    }
}

type UpdateCallback = Box<dyn FnMut(&AcceptedUpdate) + Send>;

/// Verifier → tracker → callback, shared by every link.
struct Pipeline {
    verifier: Verifier,
    tracker: FreshnessTracker,
    /// `None` once the client is stopped.
    on_update: Mutex<Option<UpdateCallback>>,
}

impl Pipeline {
    fn callback(&self) -> MutexGuard<'_, Option<UpdateCallback>> {
        self.on_update.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the callback. Blocks until an in-flight notification returns.
    fn close(&self) {
        self.callback().take();
    }
}

impl EventSink for Pipeline {
    fn submit(&self, relay: &str, event: Event) {
        let document = match self.verifier.validate(&event, self.tracker.accepted_at()) {
            Ok(document) => document,
            Err(reason) if reason.is_suspicious() => {
                warn!(relay, event_id = %event.id, signer = %event.pubkey, reason = reason.as_str(), "rejected update");
                return;
            }
            Err(reason) => {
                debug!(relay, event_id = %event.id, created_at = event.created_at, reason = reason.as_str(), "rejected update");
                return;
            }
        };

        // Held across the tracker update so `stop` cannot interleave with a
        // notification.
        let mut callback = self.callback();
        let Some(on_update) = callback.as_mut() else {
            debug!(relay, event_id = %event.id, "client stopped, dropping update");
            return;
        };
        let candidate = AcceptedUpdate {
            event,
            document,
            relay: relay.to_string(),
        };
        let outcome = self.tracker.consider_with(candidate, |accepted| {
            let counts = accepted.document.rule_counts();
            info!(
                relay,
                event_id = %accepted.event.id,
                created_at = accepted.created_at(),
                version = %accepted.document.version,
                version_tag = accepted.event.tag_value("version").unwrap_or("-"),
                cosmetic = counts.cosmetic,
                network = counts.network,
                scripts = counts.scripts,
                "accepted filter update"
            );
            on_update(accepted);
        });
        if outcome == Freshness::NotSuperseded {
            debug!(relay, reason = "stale", "lost freshness race");
        }
    }
}

struct Running {
    pipeline: Arc<Pipeline>,
    links: Vec<watch::Receiver<LinkSnapshot>>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// Subscribes to one topic on many relays and reports each strictly newer,
/// authenticated update exactly once.
pub struct DistributionClient {
    config: ClientConfig,
    running: Option<Running>,
    health: Arc<watch::Sender<usize>>,
}

impl DistributionClient {
    /// Validate the relay list. Nothing connects until [`start`](Self::start).
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.relays.is_empty() {
            return Err(ClientError::NoRelays);
        }
        for relay in &config.relays {
            let url = Url::parse(relay)
                .map_err(|e| ClientError::InvalidRelayUrl(format!("{relay}: {e}")))?;
            if url.scheme() != "ws" && url.scheme() != "wss" {
                return Err(ClientError::InvalidRelayUrl(format!(
                    "{relay}: scheme must be ws or wss"
                )));
            }
        }
        let (health, _) = watch::channel(0);
        Ok(Self {
            config,
            running: None,
            health: Arc::new(health),
        })
    }

    /// Start one link per relay. `on_update` runs on a link task, once per
    /// superseding update and in increasing `created_at` order; it must not
    /// call back into this client.
    ///
    /// Must be called from within a Tokio runtime, and only once.
    pub fn start<F>(&mut self, topic: TopicFilter, on_update: F) -> Result<()>
    where
        F: FnMut(&AcceptedUpdate) + Send + 'static,
    {
        if self.running.is_some() {
            return Err(ClientError::AlreadyStarted);
        }
        let callback: UpdateCallback = Box::new(on_update);
        let pipeline = Arc::new(Pipeline {
            verifier: Verifier::new(topic.clone()),
            tracker: FreshnessTracker::new(),
            on_update: Mutex::new(Some(callback)),
        });
        let cancel = CancellationToken::new();
        let options = self.config.link_options();
        let mut links = Vec::with_capacity(self.config.relays.len());
        let mut tasks = Vec::with_capacity(self.config.relays.len() + 1);
        for relay in &self.config.relays {
            let link = RelayLink::new(relay.clone(), &topic, options.clone());
            links.push(link.watch());
            let sink: Arc<dyn EventSink> = pipeline.clone();
            tasks.push(link.spawn(sink, cancel.clone()));
        }
        tasks.push(tokio::spawn(track_health(
            links.clone(),
            self.health.clone(),
            cancel.clone(),
        )));
        info!(relays = links.len(), topic = %topic.topic, kind = topic.kind, "distribution client started");
        self.running = Some(Running {
            pipeline,
            links,
            tasks,
            cancel,
        });
        Ok(())
    }

    /// Stop every link and wait for them to finish. No `on_update` call
    /// happens after this returns. Idempotent.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if running.tasks.is_empty() {
            return;
        }
        running.cancel.cancel();
        running.pipeline.close();
        for task in running.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "relay task ended abnormally");
            }
        }
        self.health.send_replace(0);
        info!("distribution client stopped");
    }

    /// Number of relays currently subscribed. Zero means no live source.
    pub fn connection_health(&self) -> usize {
        self.running.as_ref().map_or(0, |r| subscribed(&r.links))
    }

    /// Connectivity flag for collaborators that only need live/offline.
    pub fn is_connected(&self) -> bool {
        self.connection_health() > 0
    }

    /// Change notifications for [`connection_health`](Self::connection_health).
    pub fn watch_health(&self) -> watch::Receiver<usize> {
        self.health.subscribe()
    }

    pub fn relay_states(&self) -> Vec<LinkSnapshot> {
        self.running.as_ref().map_or_else(Vec::new, |r| {
            r.links.iter().map(|rx| rx.borrow().clone()).collect()
        })
    }

    /// Currently accepted update, if any.
    pub fn current(&self) -> Option<AcceptedUpdate> {
        self.running
            .as_ref()
            .and_then(|r| r.pipeline.tracker.current())
    }
}

impl Drop for DistributionClient {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

fn subscribed(links: &[watch::Receiver<LinkSnapshot>]) -> usize {
    links
        .iter()
        .filter(|rx| rx.borrow().phase == LinkPhase::Subscribed)
        .count()
}

/// Republish the subscribed-link count whenever any link changes phase.
async fn track_health(
    mut links: Vec<watch::Receiver<LinkSnapshot>>,
    health: Arc<watch::Sender<usize>>,
    cancel: CancellationToken,
) {
    loop {
        let count = links
            .iter_mut()
            .map(|rx| rx.borrow_and_update().phase)
            .filter(|phase| *phase == LinkPhase::Subscribed)
            .count();
        health.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
        let changed = {
            let pending = links.iter_mut().map(|rx| Box::pin(rx.changed()));
            tokio::select! {
                _ = cancel.cancelled() => return,
                (res, _, _) = select_all(pending) => res,
            }
        };
        if changed.is_err() {
            return;
        }
    }
}

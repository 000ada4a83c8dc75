//! Plugins and packet dispatch.
//!
//! A [`Plugin`] declares which packet types it accepts and which it may emit.
//! The [`PluginDispatcher`] owns one worker task per registered plugin and
//! routes each incoming packet to the worker of the plugin that declared its
//! type:
//!
//! ```text
//! transport → dispatch() → [queue] → worker → Plugin::handle()
//!                 ↓
//!             Settlement (resolves when handle() returns)
//! ```
//!
//! `dispatch()` never waits for the handler. Packets for one plugin are
//! handled one at a time and in arrival order, so a plugin's state is never
//! mutated by two packets at once. Different plugins run independently.

use crate::error::PluginError;
use crate::transport::Transport;
use async_trait::async_trait;
use pairlink_types::{Packet, PacketType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A feature handling some packet types for one device.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Short name for logs and errors.
    fn name(&self) -> &'static str;

    /// Packet types this plugin handles.
    fn incoming_types(&self) -> &'static [PacketType];

    /// Packet types this plugin may send.
    fn outgoing_types(&self) -> &'static [PacketType];

    /// Handle one packet. Returns once its local effects are decided.
    async fn handle(&self, packet: Packet) -> Result<(), PluginError>;

    /// Called once the control connection is up.
    async fn connected(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Sending side of a plugin. Refuses packet types the plugin did not declare.
#[derive(Clone)]
pub struct Outbox {
    plugin: &'static str,
    allowed: &'static [PacketType],
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("plugin", &self.plugin)
            .field("allowed", &self.allowed)
            .finish_non_exhaustive()
    }
}

impl Outbox {
    /// Outbox for `plugin`, allowed to emit `allowed`.
    pub fn new(
        plugin: &'static str,
        allowed: &'static [PacketType],
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            plugin,
            allowed,
            transport,
        }
    }

    /// Send `packet` if its type was declared.
    pub async fn send(&self, packet: &Packet) -> Result<(), PluginError> {
        match packet.packet_type() {
            Some(t) if self.allowed.contains(&t) => {
                debug!(plugin = self.plugin, packet_type = %t, "sending packet");
                self.transport.send(packet).await?;
                Ok(())
            }
            _ => Err(PluginError::UndeclaredPacket {
                plugin: self.plugin,
                packet_type: packet.wire_type().to_string(),
            }),
        }
    }
}

/// Completes once the handler for a dispatched packet has returned.
#[derive(Debug)]
pub struct Settlement {
    rx: oneshot::Receiver<Result<(), PluginError>>,
}

impl Settlement {
    /// Wait for the handler's result.
    pub async fn settled(self) -> Result<(), PluginError> {
        self.rx.await.unwrap_or(Err(PluginError::Stopped))
    }
}

/// Outcome of [`PluginDispatcher::dispatch`].
#[derive(Debug)]
pub enum Dispatch {
    /// Handed to a plugin.
    Queued(Settlement),
    /// No plugin handles this type; the packet was logged and dropped.
    Dropped,
}

struct Job {
    packet: Packet,
    done: oneshot::Sender<Result<(), PluginError>>,
}

struct Route {
    plugin: &'static str,
    queue: mpsc::UnboundedSender<Job>,
}

/// Routes incoming packets to plugins for one device.
pub struct PluginDispatcher {
    routes: HashMap<PacketType, Route>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for PluginDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: HashMap<_, _> = self.routes.iter().map(|(t, r)| (*t, r.plugin)).collect();
        f.debug_struct("PluginDispatcher")
            .field("routes", &routes)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl Default for PluginDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginDispatcher {
    /// Create a dispatcher with no plugins.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            workers: Vec::new(),
        }
    }

    /// Register `plugin` and start its worker. Must be called within a
    /// Tokio runtime.
    ///
    /// Fails without registering anything if one of its incoming types is
    /// already routed to another plugin.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name();
        for packet_type in plugin.incoming_types() {
            if let Some(existing) = self.routes.get(packet_type) {
                return Err(PluginError::DuplicateRoute {
                    packet_type: *packet_type,
                    existing: existing.plugin,
                });
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        for packet_type in plugin.incoming_types() {
            self.routes.insert(
                *packet_type,
                Route {
                    plugin: name,
                    queue: tx.clone(),
                },
            );
        }

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = plugin.handle(job.packet).await;
                if let Err(e) = &result {
                    warn!(plugin = name, error = %e, "packet dropped");
                }
                let _ = job.done.send(result);
            }
        });
        self.workers.push(worker);
        debug!(plugin = name, "plugin registered");
        Ok(())
    }

    /// Hand `packet` to its plugin without waiting for it to be handled.
    pub fn dispatch(&self, packet: Packet) -> Dispatch {
        let Some(packet_type) = packet.packet_type() else {
            debug!(packet_type = packet.wire_type(), "unknown packet type dropped");
            return Dispatch::Dropped;
        };
        let Some(route) = self.routes.get(&packet_type) else {
            debug!(%packet_type, "no plugin for packet type");
            return Dispatch::Dropped;
        };

        let (done, rx) = oneshot::channel();
        if route.queue.send(Job { packet, done }).is_err() {
            warn!(plugin = route.plugin, "plugin worker stopped");
            return Dispatch::Dropped;
        }
        Dispatch::Queued(Settlement { rx })
    }

    /// Whether some plugin handles `packet_type`.
    pub fn handles(&self, packet_type: PacketType) -> bool {
        self.routes.contains_key(&packet_type)
    }
}

impl Drop for PluginDispatcher {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

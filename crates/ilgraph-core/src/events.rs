//! Typed topology events and the synchronous publish/subscribe bus.
//!
//! Handlers run inline, in registration order, in the publisher's call stack.
//! A panicking handler is caught and logged; delivery continues with the next
//! one. Every envelope is also retained for replay and fanned out on a
//! broadcast channel for async consumers.

use crate::types::{Complexity, CorridorStatus, Lens, LiquidityStatus, OodaPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::error;

/// Capacity of the async fan-out channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologyEvent {
    LedgerUpdated {
        ledger_id: String,
        mass: f64,
    },
    ConnectorUpdated {
        connector_id: String,
        trust_score: f64,
        liquidity: LiquidityStatus,
    },
    CorridorStatusChanged {
        corridor_id: String,
        connector_id: String,
        old_status: CorridorStatus,
        new_status: CorridorStatus,
    },
    RouteCalculated {
        route_id: String,
        from: String,
        to: String,
        hops: usize,
        total_fee_bps: u32,
        risk_score: f64,
    },
    RouteCleared {
        route_id: String,
    },
    ObservationRecorded {
        connector_id: String,
        observation_id: String,
        metric: String,
        value: f64,
    },
    ClaimVerified {
        connector_id: String,
        claim_id: String,
    },
    InvariantViolated {
        invariant_id: String,
        name: String,
    },
    LensChanged {
        lens: Lens,
        previous: Lens,
    },
    LensConfigUpdated {
        lens: Lens,
    },
    OodaPhaseChanged {
        phase: OodaPhase,
    },
    NarrativeUpdated {
        active_corridors: usize,
        total_corridors: usize,
        complexity: Complexity,
    },
    LoopStarted {
        interval_ms: u64,
    },
    LoopStopped,
}

impl TopologyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LedgerUpdated { .. } => "LEDGER_UPDATED",
            Self::ConnectorUpdated { .. } => "CONNECTOR_UPDATED",
            Self::CorridorStatusChanged { .. } => "CORRIDOR_STATUS_CHANGED",
            Self::RouteCalculated { .. } => "ROUTE_CALCULATED",
            Self::RouteCleared { .. } => "ROUTE_CLEARED",
            Self::ObservationRecorded { .. } => "OBSERVATION_RECORDED",
            Self::ClaimVerified { .. } => "CLAIM_VERIFIED",
            Self::InvariantViolated { .. } => "INVARIANT_VIOLATED",
            Self::LensChanged { .. } => "LENS_CHANGED",
            Self::LensConfigUpdated { .. } => "LENS_CONFIG_UPDATED",
            Self::OodaPhaseChanged { .. } => "OODA_PHASE_CHANGED",
            Self::NarrativeUpdated { .. } => "NARRATIVE_UPDATED",
            Self::LoopStarted { .. } => "LOOP_STARTED",
            Self::LoopStopped => "LOOP_STOPPED",
        }
    }
}

/// Event plus its position in the engine's emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    pub event: TopologyEvent,
}

impl EventEnvelope {
    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub type EventHandler = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct SubscriberRegistry {
    next_id: u64,
    handlers: Vec<(SubscriptionId, EventHandler)>,
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping it keeps the handler registered; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Mutex<SubscriberRegistry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler. Returns `false` if the bus is gone or it was
    /// already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = registry.handlers.len();
        registry.handlers.retain(|(id, _)| *id != self.id);
        registry.handlers.len() != before
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub struct EventBus {
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    history: VecDeque<EventEnvelope>,
    history_limit: usize,
    next_sequence: u64,
    sender: broadcast::Sender<EventEnvelope>,
    event_counts: HashMap<&'static str, u64>,
}

impl EventBus {
    pub fn new(history_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            subscribers: Arc::new(Mutex::new(SubscriberRegistry::default())),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            next_sequence: 0,
            sender,
            event_counts: HashMap::new(),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let mut registry = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Receiver for async consumers. Lagging receivers lose the oldest events.
    pub fn stream(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publish to every current subscriber. Returns the assigned sequence.
    pub fn publish(&mut self, event: TopologyEvent) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let envelope = EventEnvelope {
            sequence,
            emitted_at: Utc::now(),
            event,
        };

        *self.event_counts.entry(envelope.kind()).or_insert(0) += 1;
        self.history.push_back(envelope.clone());
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }

        // Snapshot so handlers may subscribe/unsubscribe without deadlocking.
        let handlers: Vec<(SubscriptionId, EventHandler)> = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .handlers
            .clone();

        for (id, handler) in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&envelope)));
            if let Err(payload) = outcome {
                error!(
                    subscription = id.0,
                    event = envelope.kind(),
                    sequence,
                    panic = %panic_message(payload.as_ref()),
                    "Event subscriber panicked; continuing delivery"
                );
            }
        }

        // No receivers is fine.
        let _ = self.sender.send(envelope);
        sequence
    }

    pub fn history(&self) -> impl Iterator<Item = &EventEnvelope> {
        self.history.iter()
    }

    /// Retained envelopes with `sequence >= since`.
    pub fn events_since(&self, since: u64) -> Vec<EventEnvelope> {
        self.history
            .iter()
            .filter(|envelope| envelope.sequence >= since)
            .cloned()
            .collect()
    }

    /// Feed every retained envelope, oldest first, to `handler`.
    pub fn replay<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(&EventEnvelope),
    {
        for envelope in &self.history {
            handler(envelope);
        }
        self.history.len()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.next_sequence.checked_sub(1)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .handlers
            .len()
    }

    pub fn event_count(&self, kind: &str) -> u64 {
        self.event_counts.get(kind).copied().unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1_000)
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

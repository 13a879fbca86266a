//! Interledger topology and routing engine.
//!
//! This crate models ledgers and the connectors between them, keeps the
//! derived corridor view in sync through an OODA control loop, and provides:
//!
//! - **State**: [`GraphState`], the single owner of ledgers, connectors, corridors and routes
//! - **Control loop**: [`ControlCycle`], one observe/orient/decide/act tick
//! - **Routing**: [`TopologyRouter`], direct corridor or a relay through the hub ledger
//! - **Invariants**: [`InvariantEngine`], edge-triggered predicate checks
//! - **Events**: [`EventBus`], synchronous publish/subscribe with panic isolation
//! - **Service**: [`EngineService`], a tokio task that owns the engine and its timer
//!
//! ## Example
//!
//! ```
//! use ilgraph_core::{EngineConfig, TopologyEngine};
//!
//! let mut engine = TopologyEngine::new(EngineConfig::deterministic(7)).unwrap();
//! engine.tick().unwrap();
//! let route = engine.calculate_route("eth", "xlm", 1_000.0).unwrap();
//! assert!(route.via_hub);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod derivation;
pub mod engine;
pub mod error;
pub mod events;
pub mod invariants;
pub mod ooda;
pub mod router;
pub mod seed;
pub mod service;
pub mod state;
pub mod types;

pub use config::EngineConfig;
pub use engine::TopologyEngine;
pub use error::{TopologyError, TopologyResult};
pub use events::{EventBus, EventEnvelope, Subscription, SubscriptionId, TopologyEvent};
pub use invariants::{Invariant, InvariantEngine, NewViolation};
pub use ooda::{ControlCycle, StatusChange, TickReport};
pub use router::TopologyRouter;
pub use seed::SeedTopology;
pub use service::{EngineHandle, EngineService};
pub use state::GraphState;
pub use types::*;

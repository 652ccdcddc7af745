//! Actor-based metrics pipeline
//!
//! Each actor runs as an independent async task. Actors talk to each other
//! only through [`Broker`](crate::broker::Broker) topics and are controlled
//! through their handles.
//!
//! ## Architecture Overview
//!
//! ```text
//!                ┌──────────────────┐
//!                │  PublisherActor  │  samples the host every interval
//!                └────────┬─────────┘
//!                         │ publish
//!               ┌─────────▼─────────┐
//!               │  metrics topic    │ snapshots + status events
//!               └─────────┬─────────┘
//!           ┌─────────────┼──────────────┐
//!           │             │              │
//!   ┌───────▼──────┐      │      ┌───────▼──────┐
//!   │  AlertActor  │      │      │ GatewayActor │──▶ dashboard connections
//!   └───────┬──────┘      │      └───────▲──────┘
//!           │ publish     │              │
//!   ┌───────▼──────┐      │              │
//!   │ alerts topic ├──────┼──────────────┘
//!   └───────┬──────┘      │
//!   ┌───────▼──────┐      │
//!   │ StorageActor │      │ (snapshots are stored by the publisher)
//!   └──────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **PublisherActor**: Samples the host and publishes snapshots
//! - **AlertActor**: Evaluates snapshots against rules and publishes alerts
//! - **StorageActor**: Hands alerts to the storage sink
//! - **GatewayActor**: Streams both topics to dashboard connections
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Actors publish events to broker topics for fan-out
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod alert;
pub mod gateway;
pub mod messages;
pub mod publisher;
pub mod storage;

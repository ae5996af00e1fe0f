//! # token-grid
//!
//! Registration service and affinity-based token pool for distributed
//! execution agents.
//!
//! Agents periodically push themselves and their execution slots
//! ("tokens") into the grid; callers ("pretenders") ask for the single
//! best free token that mutually satisfies both sides' constraints. The
//! pool reserves it exclusively and releases it back when the caller is
//! done — while agents continuously join, heartbeat, and disappear.
//!
//! ## Architecture
//!
//! ```text
//! Agents (HTTP heartbeats)      Dashboards (WebSocket)
//!     │                              │
//!     ├── REST Handlers (api/)       │
//!     ├── WS Handler (ws/) ──────────┘
//!     │
//!     ├── GridService (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── TokenPool (domain/)        selection + reservation protocol
//!     └── ExpiringMap (domain/)      agent liveness
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;

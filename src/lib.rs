//! Upgrade-aware reverse proxy.
//!
//! Every request goes to one configured backend. Ordinary HTTP is forwarded
//! with a pooled client; WebSocket upgrades are negotiated with the backend
//! over a raw connection and then relayed byte-for-byte.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────┐
//!                      │                 UPGRADE PROXY                 │
//!   Client Request     │  ┌─────────┐    ┌────────────┐                │
//!   ───────────────────┼─▶│  http   │───▶│ classifier │                │
//!                      │  │ server  │    └─────┬──────┘                │
//!                      │  └─────────┘   upgrade│   ordinary            │
//!                      │          ┌────────────┴───────────┐           │
//!                      │          ▼                        ▼           │
//!                      │  ┌──────────────┐         ┌─────────────┐     │
//!                      │  │ tunnel:      │         │ forwarder   │─────┼──▶ Backend
//!                      │  │ dial → 101 → │─────────┼─────────────┼─────┼──▶ (http/ws or
//!                      │  │ relay        │         └─────────────┘     │     https/wss)
//!                      │  └──────────────┘                             │
//!                      │  ┌─────────────────────────────────────────┐  │
//!                      │  │ config · observability · lifecycle · net│  │
//!                      │  └─────────────────────────────────────────┘  │
//!                      └───────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod tunnel;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

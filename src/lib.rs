//! # Studio Gateway
//!
//! A local gateway between a model-serving backend (Ollama-compatible), a
//! persistent document store, and a browser frontend.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐
//!   browser ───▶ │  HTTP router │
//!                └──────┬───────┘
//!                       ▼
//!                ┌──────────────┐      ┌─────────────────┐
//!                │   Services   │─────▶│  ModelGateway   │──▶ backend /api/*
//!                │ (orchestr.)  │      │  (model cache)  │
//!                └──────┬───────┘      └─────────────────┘
//!                       ▼
//!        ┌──────────────┴──────────────┐
//!        ▼                             ▼
//!  ┌──────────────┐            ┌───────────────┐
//!  │ConfigResolver│            │ DocumentStore │──▶ SQLite (JSON docs)
//!  │ file+env+dflt│            │               │
//!  └──────────────┘            └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! studio init                   # create ~/.studio-gateway, config, and store
//! studio models                 # list models reported by the backend
//! studio config show            # resolved values and where they came from
//! studio serve --port 5000      # start the HTTP gateway
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered configuration (explicit file, environment, defaults) |
//! | [`store`] | Document collections over SQLite |
//! | [`gateway`] | Chat forwarding and model cache |
//! | [`services`] | Startup and shutdown sequencing |
//! | [`server`] | HTTP router |
//! | [`models`] | Wire and document types |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Collection and index provisioning |

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod migrate;
pub mod models;
pub mod server;
pub mod services;
pub mod store;

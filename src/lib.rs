//! # Belly Buzz
//!
//! Aggregates restaurant mentions from social posts and food blogs into
//! deduplicated, ranked restaurant records with buzz and sentiment scores.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │   Sources    │──▶│       Pipeline       │──▶│  SQLite  │
//! │ Reddit / RSS │   │ extract → resolve →  │   └──────────┘
//! └──────────────┘   │ group → score →      │   ┌──────────┐
//!                    │ build → embed        │──▶│ data.json│
//!                    └──────────────────────┘   └──────────┘
//! ```
//!
//! The runtime-free logic (models, resolution, scoring, record mapping,
//! the `Store` trait) lives in `belly-buzz-core`. This crate provides the
//! real collaborators and the orchestrator that drives them.
//!
//! ## Quick Start
//!
//! ```bash
//! buzz init                 # create database
//! buzz run --mock-data      # run against the bundled sample posts
//! buzz run --limit 25       # run against the configured sources
//! buzz stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed `Store` |
//! | [`sources`] | Reddit, RSS, and sample content sources |
//! | [`extract`] | Heuristic and LLM mention extraction |
//! | [`places`] | Google Places lookup |
//! | [`place_cache`] | Place lookups remembered across runs |
//! | [`embedding`] | Embedding providers and BLOB encoding |
//! | [`timeout`] | Per-call deadlines for collaborators |
//! | [`pipeline`] | The run orchestrator |
//! | [`export`] | Frontend JSON export |
//! | [`stats`] | Database statistics |

pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod http;
pub mod migrate;
pub mod pipeline;
pub mod place_cache;
pub mod places;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod timeout;

pub use belly_buzz_core as core;

//! # camarim-store: Dual-Store Persistence for Camarim POS
//!
//! This crate persists the application data set across two local backends
//! and arbitrates between them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Camarim POS Data Flow                             │
//! │                                                                         │
//! │  Caller (CLI command, backup service)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   camarim-store (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │                 ┌──────────────────────┐                        │   │
//! │  │                 │   TieredStore        │                        │   │
//! │  │                 │   (adapter.rs)       │                        │   │
//! │  │                 └───────┬──────┬───────┘                        │   │
//! │  │          primary        │      │   mirror-on-write              │   │
//! │  │       ┌─────────────────┘      └──────────────┐                 │   │
//! │  │       ▼                                       ▼                 │   │
//! │  │  ┌───────────────┐                  ┌──────────────────┐       │   │
//! │  │  │ Structured    │                  │ Fallback         │       │   │
//! │  │  │ Store         │                  │ Store            │       │   │
//! │  │  │ (SQLite/sqlx) │                  │ (key-value JSON) │       │   │
//! │  │  └───────────────┘                  └──────────────────┘       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`adapter`] - The tiered persistence adapter (the core state machine)
//! - [`structured`] - SQLite-backed structured store
//! - [`fallback`] - Whole-blob key-value fallback store
//! - [`kv`] - Key-value backend trait and implementations
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Storage error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use camarim_store::{FileKv, FallbackStore, StoreConfig, TieredStore};
//!
//! let fallback = FallbackStore::new(Box::new(FileKv::new("/var/lib/camarim")?));
//! let mut store = TieredStore::new(fallback);
//!
//! // Degrades to the fallback on its own if SQLite is unavailable
//! store.init(StoreConfig::new("/var/lib/camarim/camarim.db")).await;
//!
//! let mut data = store.load().await;
//! data.settings.next_product_id();
//! let outcome = store.save(&data).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adapter;
pub mod error;
pub mod fallback;
pub mod kv;
pub mod migrations;
pub mod structured;

// =============================================================================
// Re-exports
// =============================================================================

pub use adapter::{Backend, MigrationOutcome, SaveOutcome, TieredStore};
pub use error::{StoreError, StoreResult};
pub use fallback::{FallbackStore, SYSTEM_DATA_KEY};
pub use kv::{FileKv, KeyValueBackend, MemoryKv};
pub use structured::{StoreConfig, StructuredStore};

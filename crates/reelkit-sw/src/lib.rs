//! # ReelKit Service Worker
//!
//! Offline cache proxy for the LogReel application shell.
//!
//! After the first successful visit the shell must load and run with no
//! network at all. The proxy intercepts every request the application makes,
//! answers from a versioned cache store when it can, falls back to the live
//! network otherwise, and opportunistically copies fresh same-origin
//! responses into the store. When the network is unreachable, navigations are
//! answered with the cached shell document.
//!
//! ## Features
//!
//! - **Versioned stores**: one store per deployed shell version, named
//!   `<app-prefix>-cache-<version>`
//! - **All-or-nothing install**: the shell manifest is fully fetched before a
//!   single entry is written
//! - **Activation sweep**: stale same-family stores are purged, then every
//!   open instance is claimed without a reload
//! - **Cache-first fetch**: store lookup, network fallback, offline shell
//!   document for failed navigations
//! - **Background sync hook**: explicit task enum, reserved as a no-op
//!
//! ## Architecture
//!
//! ```text
//! OfflineCacheProxy
//!     ├── install ──→ CacheStorage (populate from ShellManifest)
//!     ├── activate ─→ purge stale stores, ClientRegistry::claim_all
//!     ├── fetch ────→ CacheStorage ─miss→ NetworkFetcher
//!     │                   ↑                   │
//!     │                   └── write-behind ───┘ (status 200, same-origin)
//!     └── sync ─────→ SyncTask (reserved no-op)
//! ```
//!
//! The store registry ([`CacheStorage`]) and the network ([`NetworkFetcher`])
//! are host-provided. [`MemoryCacheStorage`] is the in-memory reference
//! backend; `reelkit-net` provides the production fetcher.

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod fetch;
pub mod manifest;
pub mod proxy;
pub mod sync;

pub use cache::{request_key, CacheEntry, CacheStorage, MemoryCacheStorage};
pub use clients::{Client, ClientId, ClientRegistry};
pub use fetch::{NetworkFetcher, Request, RequestMode, Response, ResponseKind};
pub use manifest::ShellManifest;
pub use proxy::{FetchDecision, OfflineCacheProxy, ProxyEvent, ProxyPhase};
pub use sync::{SyncTask, DATA_SYNC_TAG};

/// Errors that can occur in the offline cache proxy.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    /// Transport-level failure: connectivity loss, DNS failure, reset. HTTP
    /// error statuses are not errors; they come back as ordinary responses.
    #[error("Network unreachable: {0}")]
    Network(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),
}

#![forbid(unsafe_code)]
#![warn(
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Failover dispatch of download tasks to qBittorrent-compatible endpoints.
//!
//! Layout: `model/` (tasks, health and dispatch reports), `vpn.rs` (gateway
//! reachability), `qbittorrent.rs` (Web API v2 client and sessions),
//! `prober.rs` (endpoint health), `client.rs` (failover dispatcher),
//! `queue.rs` (durable task queue).

pub mod client;
pub mod error;
pub mod model;
pub mod prober;
pub mod qbittorrent;
pub mod queue;
pub mod vpn;

pub use client::{DispatchStage, FailoverDispatcher};
pub use error::{DispatchError, DispatchResult, EndpointError};
pub use model::{
    DispatchReport, DrainReport, HealthReport, HealthStatus, QueuePersistence, Submission, Task,
};
pub use prober::EndpointProber;
pub use qbittorrent::{EndpointTimeouts, QbittorrentClient, Session};
pub use queue::{DEFAULT_QUEUE_REASON, DurableQueue, QueueLock, QueueRecord};
pub use vpn::{IcmpProbe, Reachability, TcpProbe, VpnMonitor, VpnObservation};

//! OEE Query Orchestrator
//!
//! Keeps an [`OeeSnapshot`](crate::telemetry::OeeSnapshot) current for each
//! watched (machine, time range) pair.
//!
//! ```text
//!   watch_oee ──► Watch ──timer tick / refresh()──► resolve_now(selector)
//!                   ▲                                      │
//!                   │ deliver (if still alive)             ▼
//!                   └──────────────────────────── FactoryApi::get_oee
//! ```
//!
//! - One timer per watched pair, shared by all of its consumers
//! - At most one query in flight per pair; extra triggers are coalesced
//! - The last consumer leaving cancels the timer; a response arriving after
//!   that is discarded

mod error;
mod watch;

pub use error::{OrchestratorError, OrchestratorResult};
pub use watch::{OeeOrchestrator, OeeUpdate, WatchGuard, WatchKey, DEFAULT_REFRESH_INTERVAL};

//! Offline-first request orchestrator.
//!
//! A [`Worker`] sits between an application and the network. Each outbound
//! request is classified and answered by one of three caching strategies
//! (cache-first, network-first, stale-while-revalidate) backed by a
//! namespaced [`CacheStore`]. The worker also owns the install/activate
//! lifecycle of those namespaces, a best-effort background sync queue and
//! push notification dispatch.

pub mod cache;
pub mod classify;
pub mod config;
pub mod event;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod network;
pub mod push;
pub mod sync;
pub mod tasks;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::CacheStore;
pub use config::Config;
pub use event::{EventOutcome, WorkerEvent};
pub use http::{FetchOutcome, Request, ResponseSnapshot, ResponseSource};
pub use worker::{Collaborators, Worker};

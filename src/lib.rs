//! signtrack - reconciles the lifecycle of externally-signed documents.
//!
//! The authoritative state of a signing request lives in a third-party
//! e-signature service. Two unsynchronized channels report changes: an
//! inbound webhook (at-least-once, possibly duplicated or out of order)
//! and a periodic poll (authoritative snapshot). This library merges both
//! channels into one consistent local record and fires notification
//! intents on exactly the transitions that matter.

pub mod config;
pub mod engine;
pub mod notify;
pub mod poll;
pub mod reconcile;
pub mod remote;
pub mod server;
pub mod store;
pub mod types;
pub mod webhook;

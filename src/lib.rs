//! paperdesk tracks research-paper search sessions whose work is done by an
//! external summarizer process.
//!
//! A session ([`models::Query`]) is created by [`lifecycle::SessionManager::start_search`],
//! which hands the search to [`worker::Invoker`] on a background task. When
//! the worker exits cleanly its output directory is read by [`ingest`] into
//! [`models::Summary`] rows and the session becomes `completed`; any failure
//! along the way makes it `failed`. A completed session can then be analyzed.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod worker;

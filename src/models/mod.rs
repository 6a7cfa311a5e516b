//! Domain models for paperdesk.
//!
//! - [`Query`]: one search session. Its [`QueryStatus`] is driven only by the
//!   background workflows in [`crate::lifecycle`].
//! - [`Summary`]: one paper result belonging to a query, materialized from a
//!   file the external worker wrote into the session's output directory.
//! - [`AnalysisResponse`]: whether the worker's comparative analysis exists yet.

mod analysis;
mod query;
mod summary;

pub use analysis::*;
pub use query::*;
pub use summary::*;

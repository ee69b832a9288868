//! Core services: sync, query derivations, feedback actions, ids.

pub mod actionable;
pub mod enrich;
pub mod feedback;
pub mod github;
pub mod ids;
pub mod sync;
pub mod worklist;

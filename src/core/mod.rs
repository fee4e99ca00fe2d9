//! Pipeline snapshot and form-args cache.

/// Content-addressed cache of per-operation form arguments.
pub mod cache;
/// Operation log with trim/replace/append transitions.
pub mod pipeline;

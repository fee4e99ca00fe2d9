//! Replay engine for concordance query pipelines.
//!
//! A pipeline is the ordered history of operations (query, filter, sort,
//! sample, shuffle, ...) applied to a corpus search. Each step is persisted
//! server-side under an opaque id and builds on the previous one. Editing a
//! step re-executes it and every later step, in order, producing a new tail.
//!
//! # Examples
//!
//! Driving the replay executor directly:
//! ```no_run
//! use concpipe::{
//!     context::ConcordanceContext,
//!     core::pipeline::PipelineSnapshot,
//!     engine::{
//!         models::ModelRegistry,
//!         replay::{ReplayExecutor, ReplayRequest},
//!     },
//!     transport::{UrlBuilder, http::UreqTransport},
//! };
//!
//! # async fn run(mut snapshot: PipelineSnapshot) {
//! let transport = UreqTransport::new();
//! let urls = UrlBuilder::new("https://kontext.example.org");
//! let mut models = ModelRegistry::new();
//! let context = ConcordanceContext::new("syn2020");
//! let report = ReplayExecutor::new(&transport, &urls)
//!     .run(ReplayRequest::through_tail(1), &mut snapshot, &mut models, &context)
//!     .await
//!     .expect("replay");
//! println!("{:?}", report.outcome);
//! # }
//! ```
//!
//! Runtime usage with a SQLite snapshot store:
//! ```no_run
//! use std::sync::Arc;
//!
//! use concpipe::{
//!     context::ConcordanceContext,
//!     core::pipeline::PipelineSnapshot,
//!     engine::replay::ReplayRequest,
//!     persist::sqlite::SqliteSnapshotStore,
//!     runtime::handle::{ClientConfig, spawn_pipeline_runtime},
//!     transport::http::UreqTransport,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteSnapshotStore::open("pipelines.db").expect("open sqlite");
//! let client = ClientConfig::new("https://kontext.example.org", ConcordanceContext::new("syn2020"));
//! let handle = spawn_pipeline_runtime(
//!     PipelineSnapshot::default(),
//!     client,
//!     Arc::new(UreqTransport::new()),
//!     Some(Box::new(store)),
//! );
//! handle.reload(Some("tail-id".to_string())).await.expect("reload");
//! handle.branch(ReplayRequest::through_tail(1)).await.expect("replay");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Explicit concordance arguments threaded through submits.
pub mod context;
/// Pipeline snapshot and form-args cache.
pub mod core;
/// Sub-models, pipeline loader and replay executor.
pub mod engine;
/// Typed form payloads per operation type.
pub mod form;
/// Operation records and concordance responses.
pub mod op;
/// Snapshot store abstraction and SQLite implementation.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Server transport and action URLs.
pub mod transport;
/// Shared primitive types and enums.
pub mod types;

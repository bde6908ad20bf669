//! Annotation engine for slice-by-slice image labeling: polygon geometry,
//! an undoable annotation store over a remote collaborator, point-prompted
//! segmentation previews, and cross-slice label transfer.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::AnnotationStore`]:
//! ```
//! use slicelabel::{
//!     annotation::{AnnotationDraft, Shape},
//!     core::store::AnnotationStore,
//!     persist::memory::MemoryBackend,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), slicelabel::core::store::StoreError> {
//! let mut store = AnnotationStore::new(MemoryBackend::new());
//! store.load("slice-001").await?;
//!
//! let square = Shape::from_segmentation(vec![vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0]]);
//! let created = store.create(AnnotationDraft::from_shape(1, "cell", square)).await?;
//! assert!((created.area - 100.0).abs() < 1e-9);
//!
//! store.undo().await?;
//! assert!(store.annotations().is_empty());
//! store.redo().await?;
//! assert_eq!(store.annotations().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! Runtime usage with the SQLite collaborator:
//! ```no_run
//! use slicelabel::{
//!     core::store::AnnotationStore,
//!     persist::sqlite::SqliteBackend,
//!     runtime::handle::{spawn_editor, RuntimeConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = SqliteBackend::open("labels.db").expect("open sqlite");
//! let handle = spawn_editor(AnnotationStore::new(backend), RuntimeConfig::default());
//! let count = handle.load("slice-001").await.expect("load");
//! println!("{count} annotations");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Reversible action records.
pub mod action;
/// Annotation records, drafts and patches.
pub mod annotation;
/// Aggregate engine configuration.
pub mod config;
/// Annotation store and its undo/redo log.
pub mod core;
/// Polygon-set boolean operations and measurements.
pub mod geometry;
/// Collaborator contracts plus in-memory and SQLite implementations.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Segmentation oracle contract, preview orchestration and debouncing.
pub mod segment;
/// Cross-slice label transfer workflow.
pub mod transfer;
/// Shared primitive types.
pub mod types;

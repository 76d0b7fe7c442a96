//! Model discovery and selection.
//!
//! The pool turns an opaque, shifting list of backend models into a ranked,
//! health-aware snapshot. Snapshots are immutable and replaced wholesale, so
//! a reader always sees either the old or the new fully-built pool.

pub mod capabilities;
pub mod error;
pub mod manager;
pub mod pool;
pub mod prober;
pub mod selector;

pub use capabilities::{ImageLimits, ModelCapabilities};
pub use error::PoolError;
pub use manager::{PoolEvent, PoolManager};
pub use pool::{ModelPool, Tier};
pub use prober::probe;
pub use selector::{ModelCriteria, SortKey, select};

// Library exports for trisweep
pub mod audit;
pub mod cluster;
pub mod delimited;
pub mod engine;
pub mod error;
pub mod export;
pub mod group;
pub mod overlap_index;
pub mod palette;
pub mod parallel;
pub mod params;
pub mod reference;
pub mod report;
pub mod segment;
pub mod segment_io;
pub mod store;
pub mod union_find;

pub use cluster::{CancelToken, ClusterParams, Clustering, ClusteringStrategy, Component};
pub use engine::{EmptyReason, RunSummary, TriangulationConfig, TriangulationEngine, TriangulationRun};
pub use error::{ClusterError, ConfigError, EngineError};
pub use group::{GroupAggregator, TriangulationGroup};
pub use parallel::ParallelStrategy;
pub use params::{Algorithm, FilterParams};
pub use reference::ReferenceStrategy;
pub use segment::{Chromosome, Family, Segment};
pub use store::{MemorySegmentStore, SearchField, SegmentQuery, SegmentStore};

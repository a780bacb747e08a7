//! Streams large sets of images into fixed-size atlas pages and a single
//! instance buffer so they can be drawn with one instanced call per page.

pub mod atlas;
pub mod config;
pub mod coordinator;
pub mod decode;
pub mod discovery;
pub mod error;
pub mod ingest;
pub mod instance;
pub mod worker;

pub use atlas::{AtlasPacker, AtlasPage, ResourcePlacement};
pub use config::StreamConfig;
pub use coordinator::{
    Diagnostic, ResourceState, ResourceStreamCoordinator, StreamStats, TickReport,
};
pub use error::{ConfigError, DecodeError, PackError, ResourceError, StreamError};
pub use ingest::{IngestMessage, IngestProducer, IngestQueue, PendingResource, Ticket};
pub use instance::{InstanceRecord, InstanceTransformBuffer, WorldTransform};

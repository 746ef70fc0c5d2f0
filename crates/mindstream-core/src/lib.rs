//! mindstream core - data model, ring buffer, filtering and export

pub mod error;
pub mod export;
pub mod filter;
pub mod ring;
pub mod types;

pub use error::{Error, Result};
pub use export::{ExportArtifact, ExportFormat};
pub use filter::{ComponentFilter, FilterState, LevelFilter};
pub use ring::{DisplayOrder, RingBuffer, SharedRing};
pub use types::*;

//! Trace repository (§4.10), per-trace cache, extension store (§4.11), and
//! the Parsed-IO assembler with its filesystem viewer (§4.9). None of these
//! participate in live tracing; they are consulted by analytics interfaces
//! only, reading what [`octf_trace`] already wrote to disk.

pub mod analytics;
pub mod builders;
pub mod cache;
pub mod error;
pub mod extension;
pub mod fs_viewer;
pub mod parsed_io;
pub mod repository;

pub use cache::Cache;
pub use error::RepositoryError;
pub use extension::{build_extension, ExtensionBuilder, ExtensionError, ExtensionReader, ExtensionWriter, MergingReader};
pub use fs_viewer::FilesystemViewer;
pub use parsed_io::{Assembler, AssemblerOptions, FsAttribution, LbaRange, ParsedEvent, ParsedIoError};
pub use repository::{Repository, TraceHandle};

pub mod archive;
pub mod codec;

pub use archive::{ArchiveSink, ArchiveSummary, AudioArchiver};
pub use codec::{decode_mulaw, DecodeError};

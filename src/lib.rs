//! Index parser for QuickTime and MPEG-4 movie files.
//!
//! [`QuickTimeParser`] walks the atom tree of a movie, builds one [`Track`] per media track with
//! its run-length encoded sample tables, instantiates codec descriptors through a
//! [`SampleDescFactory`] and can then resolve any sample to a byte range and a timestamp. No
//! media payload is ever decoded.

use thiserror::Error;

pub mod atom;
pub mod cmov;
mod handlers;
pub mod locator;
pub mod marshal;
pub mod options;
pub mod parser;
pub mod resource;
pub mod sample_desc;
pub mod stream;
pub mod track;

pub use atom::{Atom, Flow, Handler, ParseEntry, ParseTable, ReadFn};
pub use cmov::{Decompressor, ZlibDecompressor};
pub use locator::SampleLocation;
pub use marshal::{FourCC, Matrix};
pub use options::{ParserOptions, ZeroSizePolicy};
pub use parser::QuickTimeParser;
pub use resource::{ResourceFork, ResourceMap};
pub use sample_desc::{
    AudioSampleDesc, MidiSampleDesc, SampleDesc, SampleDescBase, SampleDescFactory,
    SampleDescRegistry, UnknownSampleDesc, VideoSampleDesc,
};
pub use stream::{ByteStream, DisposeAfterUse};
pub use track::{CodecType, EditListEntry, SampleSizes, SampleToChunkEntry, TimeToSampleEntry, Track};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// An atom whose size or payload is inconsistent with its container or its own fields.
    #[error("Malformed {r#type} atom at offset {offset}: {reason}")]
    MalformedAtom {
        r#type: FourCC,
        offset: u64,
        reason: String,
    },

    /// A payload field out of range, raised by the payload decoders before the enclosing atom
    /// is known. The walker reports it as [`Error::MalformedAtom`].
    #[error("Invalid payload: {0}")]
    InvalidPayload(&'static str),

    #[error("Missing {0} atom")]
    MissingAtom(FourCC),

    #[error("Stream truncated at offset {offset}, {need} more bytes needed")]
    TruncatedStream { offset: u64, need: u64 },

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(FourCC),

    #[error("Decompression failed")]
    Decompression(#[source] std::io::Error),

    #[error("Sample description factory failed for {codec}: {reason}")]
    CodecFactory { codec: FourCC, reason: String },

    #[error("Track {0} does not exist")]
    TrackOutOfRange(usize),

    #[error("Sample {sample} out of range, track has {count} samples")]
    SampleOutOfRange { sample: u32, count: u32 },

    #[error("Sample {sample} at offset {offset} with size {size} lies outside the stream of {stream_len} bytes")]
    SampleOutOfBounds {
        sample: u32,
        offset: u64,
        size: u32,
        stream_len: u64,
    },

    #[error("No stream is open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, Error>;

use std::io::{Cursor, ErrorKind, Read};

use flate2::read::ZlibDecoder;
use tracing::{debug, warn};

use crate::{
    atom::{Atom, Flow},
    marshal::{qt::CompressedMovie, FourCC},
    parser::QuickTimeParser,
    stream::ByteStream,
    Error, Result,
};

/// Inflates the payload of a compressed movie atom.
pub trait Decompressor {
    /// Fails unless exactly `expected_len` bytes are produced.
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> std::io::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibDecompressor;

impl Decompressor for ZlibDecompressor {
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(expected_len);
        ZlibDecoder::new(compressed)
            .take(expected_len as u64 + 1)
            .read_to_end(&mut data)?;
        if data.len() != expected_len {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("inflated {} bytes, expected {expected_len}", data.len()),
            ));
        }
        Ok(data)
    }
}

/// Expands a `cmov` atom and walks the movie atom it contains.
pub(crate) fn read_cmov(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let payload = atom.read_payload(stream, parser.options.max_payload_size)?;
    let movie = CompressedMovie::decode(&mut payload.as_slice()).map_err(|error| atom.decode_error(error))?;
    if movie.compression != FourCC::ZLIB {
        warn!("unsupported movie compression {}", movie.compression);
        return Err(Error::UnsupportedCompression(movie.compression));
    }
    if movie.uncompressed_size as u64 > parser.options.max_payload_size {
        return Err(atom.malformed("uncompressed movie exceeds the payload limit"));
    }

    let data = parser
        .decompressor
        .decompress(movie.data, movie.uncompressed_size as usize)
        .map_err(Error::Decompression)?;
    debug!(
        "expanded compressed movie from {} to {} bytes",
        movie.data.len(),
        data.len()
    );
    let len = data.len() as u64;
    let mut cursor = Cursor::new(data);
    parser.read_default(&mut cursor, Atom::root(FourCC::MOOV, 0, len))
}

mod common;

use std::io::Cursor;

use quicktime::{Decompressor, DisposeAfterUse, Error, FourCC, QuickTimeParser, Track};

use common::*;

fn compressed_movie(compression: &[u8; 4]) -> Vec<u8> {
    let movie = movie_atom(MOVIE_TIME_SCALE);
    [
        media_data(),
        compressed_movie_atom(compression, &movie, &zlib(&movie)),
    ]
    .concat()
}

fn assert_same_tables(left: &Track, right: &Track) {
    assert_eq!(left.track_id, right.track_id);
    assert_eq!(left.codec_type, right.codec_type);
    assert_eq!(left.chunk_offsets, right.chunk_offsets);
    assert_eq!(left.time_to_sample, right.time_to_sample);
    assert_eq!(left.sample_to_chunk, right.sample_to_chunk);
    assert_eq!(left.sample_sizes, right.sample_sizes);
    assert_eq!(left.keyframes, right.keyframes);
    assert_eq!(left.edit_list, right.edit_list);
    assert_eq!(left.time_scale, right.time_scale);
    assert_eq!(left.sample_descs.len(), right.sample_descs.len());
    for (left, right) in left.sample_descs.iter().zip(&right.sample_descs) {
        assert_eq!(left.base(), right.base());
    }
}

#[test]
fn test_compressed_movie_matches_uncompressed() {
    let mut plain = QuickTimeParser::new();
    assert!(plain.parse_stream(Cursor::new(sample_movie()), DisposeAfterUse::Yes));

    let mut compressed = QuickTimeParser::new();
    assert!(compressed.parse_stream(Cursor::new(compressed_movie(b"zlib")), DisposeAfterUse::Yes));

    assert_eq!(compressed.time_scale(), plain.time_scale());
    assert_eq!(compressed.duration(), plain.duration());
    assert_eq!(compressed.tracks().len(), 2);
    for (left, right) in compressed.tracks().iter().zip(plain.tracks()) {
        assert_same_tables(left, right);
    }
    assert_eq!(
        compressed.locate_sample(0, 4).unwrap(),
        plain.locate_sample(0, 4).unwrap()
    );
}

#[test]
fn test_unsupported_compression() {
    let mut parser = QuickTimeParser::new();
    assert!(matches!(
        parser.load_stream(Cursor::new(compressed_movie(b"lzss")), DisposeAfterUse::Yes),
        Err(Error::UnsupportedCompression(compression)) if compression == FourCC::new(b"lzss")
    ));
    assert!(parser.tracks().is_empty());
}

#[test]
fn test_corrupt_compressed_data() {
    let movie = movie_atom(MOVIE_TIME_SCALE);
    let data = compressed_movie_atom(b"zlib", &movie, &[0xDE, 0xAD, 0xBE, 0xEF]);
    let mut parser = QuickTimeParser::new();
    assert!(matches!(
        parser.load_stream(Cursor::new(data), DisposeAfterUse::Yes),
        Err(Error::Decompression(_))
    ));
}

#[test]
fn test_wrong_uncompressed_size() {
    let movie = movie_atom(MOVIE_TIME_SCALE);
    let data = compressed_movie_atom(b"zlib", &movie[..movie.len() - 1], &zlib(&movie));
    let mut parser = QuickTimeParser::new();
    assert!(!parser.parse_stream(Cursor::new(data), DisposeAfterUse::Yes));
}

/// Treats the compressed payload as already inflated.
struct Stored;

impl Decompressor for Stored {
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> std::io::Result<Vec<u8>> {
        assert_eq!(compressed.len(), expected_len);
        Ok(compressed.to_vec())
    }
}

#[test]
fn test_custom_decompressor() {
    let movie = movie_atom(MOVIE_TIME_SCALE);
    let data = [media_data(), compressed_movie_atom(b"zlib", &movie, &movie)].concat();
    let mut parser = QuickTimeParser::new();
    parser.set_decompressor(Stored);
    assert!(parser.parse_stream(Cursor::new(data), DisposeAfterUse::Yes));
    assert_eq!(parser.tracks().len(), 2);
}

#![allow(dead_code)]

use std::io::{Cursor, Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};
use flate2::{write::ZlibEncoder, Compression};

/// Writes nested atoms, patching each size when the atom is closed.
pub struct AtomWriter {
    output: Cursor<Vec<u8>>,
    open: Vec<u64>,
}

impl AtomWriter {
    pub fn new() -> Self {
        Self {
            output: Cursor::new(vec![]),
            open: vec![],
        }
    }

    pub fn begin(&mut self, r#type: &[u8; 4]) -> &mut Self {
        let begin = self.output.stream_position().unwrap();
        self.output.write_u32::<BigEndian>(0).unwrap(); // size
        self.output.write_all(r#type).unwrap();
        self.open.push(begin);
        self
    }

    pub fn end(&mut self) -> &mut Self {
        let begin = self.open.pop().expect("no open atom");
        let end = self.output.stream_position().unwrap();
        self.output.seek(SeekFrom::Start(begin)).unwrap();
        self.output.write_u32::<BigEndian>((end - begin) as u32).unwrap();
        self.output.seek(SeekFrom::Start(end)).unwrap();
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.output.write_u8(value).unwrap();
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.output.write_u16::<BigEndian>(value).unwrap();
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.output.write_u32::<BigEndian>(value).unwrap();
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.output.write_i32::<BigEndian>(value).unwrap();
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.output.write_u64::<BigEndian>(value).unwrap();
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.output.write_all(data).unwrap();
        self
    }

    pub fn finish(self) -> Vec<u8> {
        assert!(self.open.is_empty(), "unclosed atoms");
        self.output.into_inner()
    }
}

pub const MOVIE_TIME_SCALE: u32 = 600;
pub const VIDEO_SAMPLE_SIZES: [u32; 5] = [100, 200, 300, 400, 500];
pub const VIDEO_CHUNK_OFFSETS: [u32; 3] = [8, 308, 1008];
pub const AUDIO_CHUNK_OFFSETS: [u32; 2] = [1508, 1516];
pub const MEDIA_DATA_LEN: usize = 1524;

pub const AUDIO_ES_DESCRIPTOR: [u8; 31] = [
    0, 0, 0, 0, // version and flags
    0x03, 0x19, 0x00, 0x01, 0x00, // ES descriptor
    0x04, 0x11, 0x40, 0x15, 0x00, 0x18, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4, 0x00,
    0x05, 0x02, 0x12, 0x10, // decoder specific info
    0x06, 0x01, 0x02, // SL config
];

fn matrix(w: &mut AtomWriter) {
    for value in [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        w.u32(value);
    }
}

pub fn mvhd(w: &mut AtomWriter, time_scale: u32, duration: u32) {
    w.begin(b"mvhd").u32(0).u32(0).u32(0).u32(time_scale).u32(duration);
    w.u32(0x0001_0000).u16(0x0100).bytes(&[0; 10]);
    matrix(w);
    w.bytes(&[0; 24]).u32(3).end();
}

pub fn tkhd(w: &mut AtomWriter, track_id: u32, duration: u32, width: u16, height: u16) {
    w.begin(b"tkhd").u32(0x0000_000F).u32(0).u32(0).u32(track_id).u32(0).u32(duration);
    w.bytes(&[0; 8]).u16(0).u16(0).u16(0x0100).u16(0);
    matrix(w);
    w.u32((width as u32) << 16).u32((height as u32) << 16).end();
}

pub fn mdhd(w: &mut AtomWriter, time_scale: u32, duration: u32) {
    w.begin(b"mdhd").u32(0).u32(0).u32(0).u32(time_scale).u32(duration).u16(0).u16(0).end();
}

pub fn hdlr(w: &mut AtomWriter, component_type: &[u8; 4], subtype: &[u8; 4]) {
    w.begin(b"hdlr").u32(0).bytes(component_type).bytes(subtype);
    w.u32(0).u32(0).u32(0).u8(0).end();
}

pub fn elst(w: &mut AtomWriter, edits: &[(u32, i32, u32)]) {
    w.begin(b"edts").begin(b"elst").u32(0).u32(edits.len() as u32);
    for &(duration, media_time, rate) in edits {
        w.u32(duration).i32(media_time).u32(rate);
    }
    w.end().end();
}

pub fn stts(w: &mut AtomWriter, runs: &[(u32, u32)]) {
    w.begin(b"stts").u32(0).u32(runs.len() as u32);
    for &(count, duration) in runs {
        w.u32(count).u32(duration);
    }
    w.end();
}

pub fn stsc(w: &mut AtomWriter, runs: &[(u32, u32, u32)]) {
    w.begin(b"stsc").u32(0).u32(runs.len() as u32);
    for &(first_chunk, samples_per_chunk, id) in runs {
        w.u32(first_chunk).u32(samples_per_chunk).u32(id);
    }
    w.end();
}

pub fn stsz(w: &mut AtomWriter, sizes: &[u32]) {
    w.begin(b"stsz").u32(0).u32(0).u32(sizes.len() as u32);
    for &size in sizes {
        w.u32(size);
    }
    w.end();
}

pub fn stsz_uniform(w: &mut AtomWriter, size: u32, count: u32) {
    w.begin(b"stsz").u32(0).u32(size).u32(count).end();
}

pub fn stss(w: &mut AtomWriter, samples: &[u32]) {
    w.begin(b"stss").u32(0).u32(samples.len() as u32);
    for &sample in samples {
        w.u32(sample);
    }
    w.end();
}

pub fn stco(w: &mut AtomWriter, offsets: &[u32]) {
    w.begin(b"stco").u32(0).u32(offsets.len() as u32);
    for &offset in offsets {
        w.u32(offset);
    }
    w.end();
}

pub fn co64(w: &mut AtomWriter, offsets: &[u64]) {
    w.begin(b"co64").u32(0).u32(offsets.len() as u32);
    for &offset in offsets {
        w.u64(offset);
    }
    w.end();
}

/// Opens a sample description entry; the caller writes nested atoms and closes it.
pub fn begin_video_entry(w: &mut AtomWriter, format: &[u8; 4], width: u16, height: u16) {
    w.begin(format).bytes(&[0; 6]).u16(1);
    w.u16(0).u16(0).bytes(b"appl").u32(0).u32(512);
    w.u16(width).u16(height).u32(0x0048_0000).u32(0x0048_0000).u32(0).u16(1);
    let mut name = [0u8; 32];
    name[0] = 5;
    name[1..6].copy_from_slice(b"H.264");
    w.bytes(&name).u16(24).u16(0xFFFF);
}

pub fn begin_audio_entry(w: &mut AtomWriter, format: &[u8; 4], channels: u16, sample_rate: u16) {
    w.begin(format).bytes(&[0; 6]).u16(1);
    w.u16(0).u16(0).u32(0).u16(channels).u16(16).u16(0).u16(0);
    w.u32((sample_rate as u32) << 16);
}

pub fn video_track(w: &mut AtomWriter, media_time_scale: u32) {
    w.begin(b"trak");
    tkhd(w, 1, 1000, 320, 240);
    w.begin(b"mdia");
    mdhd(w, media_time_scale, 100);
    hdlr(w, b"mhlr", b"vide");
    w.begin(b"minf");
    w.begin(b"vmhd").u32(1).bytes(&[0; 8]).end();
    hdlr(w, b"dhlr", b"alis");
    w.begin(b"dinf").begin(b"dref").u32(0).u32(0).end().end();
    w.begin(b"stbl");
    w.begin(b"stsd").u32(0).u32(1);
    begin_video_entry(w, b"avc1", 320, 240);
    w.begin(b"avcC").bytes(&[1, 2, 3]).end();
    w.end().end();
    stts(w, &[(5, 20)]);
    stsc(w, &[(1, 2, 1), (3, 1, 1)]);
    stsz(w, &VIDEO_SAMPLE_SIZES);
    stss(w, &[1, 4]);
    stco(w, &VIDEO_CHUNK_OFFSETS);
    w.end().end().end().end();
}

pub fn audio_track(w: &mut AtomWriter) {
    w.begin(b"trak");
    tkhd(w, 2, 1000, 0, 0);
    elst(w, &[(400, -1, 0x0001_0000), (600, 0, 0x0001_0000)]);
    w.begin(b"mdia");
    mdhd(w, 22050, 8);
    hdlr(w, b"mhlr", b"soun");
    w.begin(b"minf");
    w.begin(b"smhd").u32(0).u32(0).end();
    w.begin(b"stbl");
    w.begin(b"stsd").u32(0).u32(1);
    begin_audio_entry(w, b"mp4a", 2, 22050);
    w.begin(b"esds").bytes(&AUDIO_ES_DESCRIPTOR).end();
    w.end().end();
    stts(w, &[(8, 1)]);
    stsc(w, &[(1, 4, 1)]);
    stsz_uniform(w, 2, 8);
    stco(w, &AUDIO_CHUNK_OFFSETS);
    w.end().end().end().end();
}

pub fn media_data() -> Vec<u8> {
    let mut w = AtomWriter::new();
    w.begin(b"mdat").bytes(&[0xAB; MEDIA_DATA_LEN - 8]).end();
    w.finish()
}

/// Movie atom with a video track (5 samples in 3 chunks) and an audio track (8 samples in 2
/// chunks) whose chunks lie in [`media_data`] placed at the start of the file.
pub fn movie_atom(video_time_scale: u32) -> Vec<u8> {
    let mut w = AtomWriter::new();
    w.begin(b"moov");
    mvhd(&mut w, MOVIE_TIME_SCALE, 1000);
    video_track(&mut w, video_time_scale);
    audio_track(&mut w);
    w.end();
    w.finish()
}

pub fn sample_movie() -> Vec<u8> {
    [media_data(), movie_atom(MOVIE_TIME_SCALE)].concat()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Movie atom whose content is `movie` stored in a compressed movie atom.
pub fn compressed_movie_atom(compression: &[u8; 4], movie: &[u8], compressed: &[u8]) -> Vec<u8> {
    let mut w = AtomWriter::new();
    w.begin(b"moov").begin(b"cmov");
    w.begin(b"dcom").bytes(compression).end();
    w.begin(b"cmvd").u32(movie.len() as u32).bytes(compressed).end();
    w.end().end();
    w.finish()
}

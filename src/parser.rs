use std::{fs::File, io::Cursor, path::Path};

use derivative::Derivative;
use memmap2::Mmap;
use num_rational::Ratio;
use tracing::{debug, warn};

use crate::{
    atom::{Atom, ParseTable},
    cmov::{Decompressor, ZlibDecompressor},
    locator::SampleLocation,
    marshal::{qt::MovieHeader, FourCC, Matrix},
    options::ParserOptions,
    resource::ResourceFork,
    sample_desc::{SampleDesc, SampleDescFactory, SampleDescRegistry},
    stream::{stream_len, ByteStream, DisposeAfterUse},
    track::{CodecType, EditListEntry, Track},
    Error, Result,
};

/// Reads the index of a QuickTime or MPEG-4 movie.
///
/// The parser holds at most one stream. [`parse_stream`](Self::parse_stream) and
/// [`parse_file`](Self::parse_file) build the track list, [`close`](Self::close) releases the
/// stream and all tracks, after which the parser can be used again.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct QuickTimeParser<'s> {
    #[derivative(Debug = "ignore")]
    stream: Option<Box<dyn ByteStream + 's>>,
    /// Caller-owned stream of a failed parse, handed back by the next [`close`](Self::close).
    #[derivative(Debug = "ignore")]
    rejected_stream: Option<Box<dyn ByteStream + 's>>,
    dispose: DisposeAfterUse,
    stream_len: u64,

    pub(crate) options: ParserOptions,
    #[derivative(Debug = "ignore")]
    pub(crate) parse_table: ParseTable,
    #[derivative(Debug = "ignore")]
    pub(crate) sample_desc_factory: Box<dyn SampleDescFactory + 's>,
    #[derivative(Debug = "ignore")]
    pub(crate) decompressor: Box<dyn Decompressor + 's>,
    #[derivative(Debug = "ignore")]
    resource_fork: Option<Box<dyn ResourceFork + 's>>,

    pub(crate) depth: u32,
    pub(crate) found_moov: bool,
    pub(crate) chunk_begin_offset: u32,
    pub(crate) is_mpeg4: bool,

    pub(crate) movie_header: Option<MovieHeader>,
    pub(crate) time_scale: u32,
    pub(crate) duration: u64,
    pub(crate) scale_factor_x: Ratio<i64>,
    pub(crate) scale_factor_y: Ratio<i64>,
    pub(crate) tracks: Vec<Track>,
}

impl<'s> Default for QuickTimeParser<'s> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> QuickTimeParser<'s> {
    pub fn new() -> Self {
        Self {
            stream: None,
            rejected_stream: None,
            dispose: DisposeAfterUse::Yes,
            stream_len: 0,
            options: ParserOptions::default(),
            parse_table: ParseTable::default(),
            sample_desc_factory: Box::new(SampleDescRegistry::new()),
            decompressor: Box::new(ZlibDecompressor),
            resource_fork: None,
            depth: 0,
            found_moov: false,
            chunk_begin_offset: 0,
            is_mpeg4: false,
            movie_header: None,
            time_scale: 0,
            duration: 0,
            scale_factor_x: Ratio::from_integer(1),
            scale_factor_y: Ratio::from_integer(1),
            tracks: vec![],
        }
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn parse_table(&self) -> &ParseTable {
        &self.parse_table
    }

    pub fn set_parse_table(&mut self, parse_table: ParseTable) {
        self.parse_table = parse_table;
    }

    pub fn set_sample_desc_factory(&mut self, factory: impl SampleDescFactory + 's) {
        self.sample_desc_factory = Box::new(factory);
    }

    pub fn set_decompressor(&mut self, decompressor: impl Decompressor + 's) {
        self.decompressor = Box::new(decompressor);
    }

    pub fn set_resource_fork(&mut self, resource_fork: impl ResourceFork + 's) {
        self.resource_fork = Some(Box::new(resource_fork));
    }

    /// Offset subtracted from every chunk offset, for movies embedded in a larger file. Takes
    /// effect on the next parse.
    pub fn set_chunk_begin_offset(&mut self, offset: u32) {
        self.chunk_begin_offset = offset;
    }

    pub fn chunk_begin_offset(&self) -> u32 {
        self.chunk_begin_offset
    }

    /// Parses the file at `path`, returning whether a movie was found.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.load_file(path) {
            Ok(()) => true,
            Err(error) => {
                warn!("failed to parse {}: {error}", path.display());
                false
            }
        }
    }

    /// Parses `stream`, returning whether a movie was found. On failure no tracks are kept and
    /// the parser is not open; a stream passed with [`DisposeAfterUse::No`] is still handed back
    /// by [`close`](Self::close).
    pub fn parse_stream(&mut self, stream: impl ByteStream + 's, dispose: DisposeAfterUse) -> bool {
        match self.load_stream(stream, dispose) {
            Ok(()) => true,
            Err(error) => {
                warn!("failed to parse stream: {error}");
                false
            }
        }
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.close();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        self.load_stream(Cursor::new(mmap), DisposeAfterUse::Yes)
    }

    pub fn load_stream(&mut self, stream: impl ByteStream + 's, dispose: DisposeAfterUse) -> Result<()> {
        self.close();

        let mut stream: Box<dyn ByteStream + 's> = Box::new(stream);
        let result = self.read_movie(stream.as_mut());
        self.stream = Some(stream);
        self.dispose = dispose;
        match result {
            Ok(()) => {
                self.init();
                Ok(())
            }
            Err(error) => {
                if let Some(stream) = self.close() {
                    self.rejected_stream = Some(stream);
                }
                Err(error)
            }
        }
    }

    fn read_movie(&mut self, stream: &mut dyn ByteStream) -> Result<()> {
        self.stream_len = stream_len(stream)?;
        self.depth = 0;
        self.found_moov = false;
        self.read_default(stream, Atom::root(FourCC(0), 0, self.stream_len))?;

        if !self.found_moov {
            let resource = match self.resource_fork.as_mut() {
                Some(fork) => match fork.resource_ids(FourCC::MOOV).first() {
                    Some(&id) => fork.resource(FourCC::MOOV, id)?,
                    None => None,
                },
                None => None,
            };
            if let Some(data) = resource {
                debug!("reading movie from the resource fork");
                let len = data.len() as u64;
                self.read_default(&mut Cursor::new(data), Atom::root(FourCC::MOOV, 0, len))?;
            }
        }

        if !self.found_moov {
            return Err(Error::MissingAtom(FourCC::MOOV));
        }
        Ok(())
    }

    fn init(&mut self) {
        if !self.options.keep_unclassified_tracks {
            self.tracks.retain(|track| {
                let keep = track.codec_type != CodecType::Other;
                if !keep {
                    debug!("dropping unclassified track {}", track.track_id);
                }
                keep
            });
        }

        for track in &mut self.tracks {
            if track.time_scale == 0 {
                track.time_scale = self.time_scale;
            }
            if !track.is_usable() {
                warn!("track {} has inconsistent sample tables", track.track_id);
            }
            if track.edit_list.is_empty() {
                track.edit_list.push(EditListEntry {
                    track_duration: track.duration,
                    time_offset: 0,
                    media_time: 0,
                    media_rate: Ratio::from_integer(1),
                });
            }
        }
    }

    /// Releases the stream and all tracks. The stream is handed back when it was opened with
    /// [`DisposeAfterUse::No`].
    pub fn close(&mut self) -> Option<Box<dyn ByteStream + 's>> {
        self.tracks.clear();
        self.movie_header = None;
        self.time_scale = 0;
        self.duration = 0;
        self.scale_factor_x = Ratio::from_integer(1);
        self.scale_factor_y = Ratio::from_integer(1);
        self.is_mpeg4 = false;
        self.found_moov = false;
        self.stream_len = 0;

        let stream = self.stream.take().or_else(|| self.rejected_stream.take());
        match self.dispose {
            DisposeAfterUse::Yes => None,
            DisposeAfterUse::No => stream,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Units per second of the movie time.
    pub fn time_scale(&self) -> u32 {
        self.time_scale
    }

    /// Duration in movie time.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn scale_factor_x(&self) -> Ratio<i64> {
        self.scale_factor_x
    }

    pub fn scale_factor_y(&self) -> Ratio<i64> {
        self.scale_factor_y
    }

    pub fn matrix(&self) -> Matrix {
        self.movie_header
            .as_ref()
            .map_or_else(Matrix::identity, |header| header.matrix)
    }

    pub fn movie_header(&self) -> Option<&MovieHeader> {
        self.movie_header.as_ref()
    }

    /// Whether the handler atoms identified an MPEG-4 file rather than a QuickTime movie.
    pub fn is_mpeg4(&self) -> bool {
        self.is_mpeg4
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Locates `sample` of the track at `track`, checking it lies within the open stream.
    pub fn locate_sample(&self, track: usize, sample: u32) -> Result<SampleLocation> {
        if !self.is_open() {
            return Err(Error::NotOpen);
        }
        let location = self
            .tracks
            .get(track)
            .ok_or(Error::TrackOutOfRange(track))?
            .locate(sample)?;
        let end = location.offset.checked_add(location.size as u64);
        if end.map_or(true, |end| end > self.stream_len) {
            return Err(Error::SampleOutOfBounds {
                sample,
                offset: location.offset,
                size: location.size,
                stream_len: self.stream_len,
            });
        }
        Ok(location)
    }

    pub(crate) fn current_track_mut(&mut self, atom: &Atom) -> Result<&mut Track> {
        self.tracks
            .last_mut()
            .ok_or_else(|| atom.malformed("atom outside of a track"))
    }

    pub(crate) fn current_sample_desc_mut(
        &mut self,
        atom: &Atom,
    ) -> Result<&mut Box<dyn SampleDesc>> {
        self.tracks
            .last_mut()
            .and_then(|track| track.sample_descs.last_mut())
            .ok_or_else(|| atom.malformed("atom outside of a sample description"))
    }
}

impl Drop for QuickTimeParser<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

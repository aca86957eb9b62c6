use derivative::Derivative;
use num_rational::Ratio;

use crate::{marshal::Matrix, sample_desc::SampleDesc};

pub use crate::marshal::qt::{SampleSizes, SampleToChunkEntry, TimeToSampleEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecType {
    #[default]
    Other,
    Video,
    Audio,
    Midi,
}

/// One segment of the edit list, in movie time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditListEntry {
    pub track_duration: u64,
    /// Sum of the durations of the preceding segments.
    pub time_offset: u64,
    /// Start of the segment in media time, -1 for an empty edit.
    pub media_time: i64,
    pub media_rate: Ratio<i64>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Track {
    pub track_id: u32,
    pub codec_type: CodecType,

    #[derivative(Debug = "ignore")]
    pub chunk_offsets: Vec<u64>,
    #[derivative(Debug = "ignore")]
    pub time_to_sample: Vec<TimeToSampleEntry>,
    #[derivative(Debug = "ignore")]
    pub sample_to_chunk: Vec<SampleToChunkEntry>,
    #[derivative(Debug = "ignore")]
    pub sample_sizes: SampleSizes,
    /// Zero-based sync samples, `None` when every sample is a sync sample.
    #[derivative(Debug = "ignore")]
    pub keyframes: Option<Vec<u32>>,
    pub edit_list: Vec<EditListEntry>,

    /// Units per second of the media time.
    pub time_scale: u32,
    /// Duration in media time.
    pub media_duration: u64,
    /// Duration in movie time.
    pub duration: u64,
    pub frame_count: u64,
    pub language: u16,

    pub width: u16,
    pub height: u16,
    pub matrix: Matrix,
    pub scale_factor_x: Ratio<i64>,
    pub scale_factor_y: Ratio<i64>,

    pub sample_descs: Vec<Box<dyn SampleDesc>>,
}

impl Default for Track {
    fn default() -> Self {
        Self::new()
    }
}

impl Track {
    pub fn new() -> Self {
        Self {
            track_id: 0,
            codec_type: CodecType::Other,
            chunk_offsets: vec![],
            time_to_sample: vec![],
            sample_to_chunk: vec![],
            sample_sizes: SampleSizes::default(),
            keyframes: None,
            edit_list: vec![],
            time_scale: 0,
            media_duration: 0,
            duration: 0,
            frame_count: 0,
            language: 0,
            width: 0,
            height: 0,
            matrix: Matrix::identity(),
            scale_factor_x: Ratio::from_integer(1),
            scale_factor_y: Ratio::from_integer(1),
            sample_descs: vec![],
        }
    }

    pub fn sample_count(&self) -> u32 {
        match &self.sample_sizes {
            SampleSizes::Uniform { count, .. } => *count,
            SampleSizes::PerSample(sizes) => sizes.len() as u32,
        }
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_offsets.len() as u32
    }

    pub fn sample_size(&self, sample: u32) -> Option<u32> {
        match &self.sample_sizes {
            SampleSizes::Uniform { size, count } => (sample < *count).then_some(*size),
            SampleSizes::PerSample(sizes) => sizes.get(sample as usize).copied(),
        }
    }

    /// Sample description for a 1-based id as referenced by the sample-to-chunk table.
    pub fn sample_desc(&self, id: u32) -> Option<&(dyn SampleDesc + 'static)> {
        let index = id.checked_sub(1)? as usize;
        self.sample_descs.get(index).map(|desc| desc.as_ref())
    }

    /// Whether the track can be played: it has sample descriptions, every sample-to-chunk run
    /// refers to one of them, and the chunk and timing tables both cover exactly the samples of
    /// the size table.
    pub fn is_usable(&self) -> bool {
        let sample_count = self.sample_count() as u64;
        !self.sample_descs.is_empty()
            && self
                .sample_to_chunk
                .iter()
                .all(|run| self.sample_desc(run.sample_description_id).is_some())
            && self.chunk_sample_total() == sample_count
            && self.time_to_sample_total() == sample_count
    }

    pub fn is_keyframe(&self, sample: u32) -> bool {
        match &self.keyframes {
            None => true,
            Some(keyframes) => keyframes.binary_search(&sample).is_ok(),
        }
    }

    /// Number of samples the sample-to-chunk runs describe over all chunks.
    pub fn chunk_sample_total(&self) -> u64 {
        let chunk_count = self.chunk_count() as u64;
        self.sample_to_chunk
            .iter()
            .enumerate()
            .map(|(i, run)| {
                let first = (run.first_chunk as u64).saturating_sub(1).min(chunk_count);
                let next = self
                    .sample_to_chunk
                    .get(i + 1)
                    .map_or(chunk_count, |next| (next.first_chunk as u64).saturating_sub(1))
                    .min(chunk_count);
                next.saturating_sub(first) * run.samples_per_chunk as u64
            })
            .sum()
    }

    /// Number of samples the time-to-sample runs describe.
    pub fn time_to_sample_total(&self) -> u64 {
        self.time_to_sample.iter().map(|run| run.count as u64).sum()
    }
}

use crate::{
    track::{SampleSizes, Track},
    Error, Result,
};

/// Where a sample lives in the stream and when it plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLocation {
    pub offset: u64,
    pub size: u32,
    /// Decode time in media time.
    pub time: u64,
    pub duration: u32,
    /// Zero-based chunk index.
    pub chunk: u32,
    pub index_in_chunk: u32,
    pub sample_description_id: u32,
    pub keyframe: bool,
}

impl Track {
    fn sample_out_of_range(&self, sample: u32) -> Error {
        Error::SampleOutOfRange {
            sample,
            count: self.sample_count(),
        }
    }

    /// Resolves a zero-based sample index through the run-length tables.
    pub fn locate(&self, sample: u32) -> Result<SampleLocation> {
        if sample >= self.sample_count() {
            return Err(self.sample_out_of_range(sample));
        }

        let chunk_count = self.chunk_count();
        let mut first_sample = 0u64;
        for (i, run) in self.sample_to_chunk.iter().enumerate() {
            let first_chunk = run.first_chunk.saturating_sub(1).min(chunk_count);
            let next_chunk = self
                .sample_to_chunk
                .get(i + 1)
                .map_or(chunk_count, |next| next.first_chunk.saturating_sub(1))
                .min(chunk_count);
            if run.samples_per_chunk == 0 || next_chunk <= first_chunk {
                continue;
            }

            let samples_per_chunk = run.samples_per_chunk as u64;
            let run_samples = (next_chunk - first_chunk) as u64 * samples_per_chunk;
            if (sample as u64) >= first_sample + run_samples {
                first_sample += run_samples;
                continue;
            }

            let relative = sample as u64 - first_sample;
            let chunk = first_chunk + (relative / samples_per_chunk) as u32;
            let index_in_chunk = (relative % samples_per_chunk) as u32;
            let offset_in_chunk = match &self.sample_sizes {
                SampleSizes::Uniform { size, .. } => index_in_chunk as u64 * *size as u64,
                SampleSizes::PerSample(sizes) => sizes
                    [(sample - index_in_chunk) as usize..sample as usize]
                    .iter()
                    .map(|&size| size as u64)
                    .sum(),
            };
            let size = self
                .sample_size(sample)
                .ok_or_else(|| self.sample_out_of_range(sample))?;
            let (time, duration) = self
                .sample_time(sample)
                .ok_or_else(|| self.sample_out_of_range(sample))?;
            let chunk_offset = self.chunk_offsets[chunk as usize];
            // the sample must end within the addressable range
            let offset = chunk_offset
                .checked_add(offset_in_chunk)
                .filter(|offset| offset.checked_add(size as u64).is_some())
                .ok_or(Error::SampleOutOfBounds {
                    sample,
                    offset: chunk_offset,
                    size,
                    stream_len: u64::MAX,
                })?;
            return Ok(SampleLocation {
                offset,
                size,
                time,
                duration,
                chunk,
                index_in_chunk,
                sample_description_id: run.sample_description_id,
                keyframe: self.is_keyframe(sample),
            });
        }
        Err(self.sample_out_of_range(sample))
    }

    /// Decode time and duration of a sample, in media time.
    pub fn sample_time(&self, sample: u32) -> Option<(u64, u32)> {
        let mut first_sample = 0u64;
        let mut time = 0u64;
        for run in &self.time_to_sample {
            let count = run.count as u64;
            if (sample as u64) < first_sample + count {
                let time = time.saturating_add((sample as u64 - first_sample) * run.duration as u64);
                return Some((time, run.duration));
            }
            first_sample += count;
            time = time.saturating_add(count * run.duration as u64);
        }
        None
    }

    /// Index of the sample playing at `time`, in media time.
    pub fn sample_at_media_time(&self, time: u64) -> Option<u32> {
        let mut first_sample = 0u64;
        let mut run_time = 0u64;
        for run in &self.time_to_sample {
            let count = run.count as u64;
            let run_duration = count * run.duration as u64;
            if time < run_time.saturating_add(run_duration) {
                let sample = first_sample + (time - run_time) / run.duration as u64;
                return u32::try_from(sample).ok();
            }
            first_sample += count;
            run_time = run_time.saturating_add(run_duration);
        }
        None
    }

    /// Closest sync sample at or before `sample`.
    pub fn keyframe_at_or_before(&self, sample: u32) -> Option<u32> {
        if sample >= self.sample_count() {
            return None;
        }
        match &self.keyframes {
            None => Some(sample),
            Some(keyframes) => {
                let index = keyframes.partition_point(|&keyframe| keyframe <= sample);
                index.checked_sub(1).map(|index| keyframes[index])
            }
        }
    }
}

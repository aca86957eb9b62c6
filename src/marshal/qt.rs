use byteorder::{BigEndian, ReadBytesExt};
use fixed::types::{I16F16, U16F16, U8F8};

use crate::{
    marshal::{decode_pascal_string, skip, take, Decode, FourCC, Matrix},
    Error, Result,
};

fn decode_version_and_flags(input: &mut &[u8]) -> Result<(u8, u32)> {
    let version = input.read_u8()?;
    let flags = input.read_u24::<BigEndian>()?;
    Ok((version, flags))
}

/// Reads a 32-bit entry count and checks that `entry_size` bytes per entry are present.
fn decode_entry_count(input: &mut &[u8], entry_size: usize) -> Result<usize> {
    let count = u32::decode(input)? as usize;
    if count.saturating_mul(entry_size) > input.len() {
        return Err(Error::InvalidPayload("entry count exceeds payload"));
    }
    Ok(count)
}

fn decode_time(input: &mut &[u8], version: u8) -> Result<u64> {
    if version == 1 {
        u64::decode(input)
    } else {
        Ok(u32::decode(input)? as u64)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Movie header atom / ISO/IEC 14496-12:2008 8.2.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct MovieHeader {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub time_scale: u32,
    pub duration: u64,
    pub preferred_rate: I16F16,
    pub preferred_volume: U8F8,
    pub matrix: Matrix,
    pub preview_time: u32,
    pub preview_duration: u32,
    pub poster_time: u32,
    pub selection_time: u32,
    pub selection_duration: u32,
    pub current_time: u32,
    pub next_track_id: u32,
}

impl Decode for MovieHeader {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let (version, _) = decode_version_and_flags(input)?;
        let creation_time = decode_time(input, version)?;
        let modification_time = decode_time(input, version)?;
        let time_scale = Decode::decode(input)?;
        let duration = decode_time(input, version)?;
        let preferred_rate = Decode::decode(input)?;
        let preferred_volume = Decode::decode(input)?;
        skip(input, 10)?; // reserved
        let matrix = Decode::decode(input)?;
        Ok(Self {
            version,
            creation_time,
            modification_time,
            time_scale,
            duration,
            preferred_rate,
            preferred_volume,
            matrix,
            preview_time: Decode::decode(input)?,
            preview_duration: Decode::decode(input)?,
            poster_time: Decode::decode(input)?,
            selection_time: Decode::decode(input)?,
            selection_duration: Decode::decode(input)?,
            current_time: Decode::decode(input)?,
            next_track_id: Decode::decode(input)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Track header atom / ISO/IEC 14496-12:2008 8.3.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct TrackHeader {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: U8F8,
    pub matrix: Matrix,
    pub width: U16F16,
    pub height: U16F16,
}

impl Decode for TrackHeader {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let (version, flags) = decode_version_and_flags(input)?;
        let creation_time = decode_time(input, version)?;
        let modification_time = decode_time(input, version)?;
        let track_id = Decode::decode(input)?;
        skip(input, 4)?; // reserved
        let duration = decode_time(input, version)?;
        skip(input, 8)?; // reserved
        let layer = Decode::decode(input)?;
        let alternate_group = Decode::decode(input)?;
        let volume = Decode::decode(input)?;
        skip(input, 2)?; // reserved
        Ok(Self {
            version,
            flags,
            creation_time,
            modification_time,
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            matrix: Decode::decode(input)?,
            width: Decode::decode(input)?,
            height: Decode::decode(input)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Media header atom / ISO/IEC 14496-12:2008 8.4.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct MediaHeader {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub time_scale: u32,
    pub duration: u64,
    pub language: u16,
    pub quality: u16,
}

impl Decode for MediaHeader {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let (version, _) = decode_version_and_flags(input)?;
        if version > 1 {
            return Err(Error::InvalidPayload("unsupported media header version"));
        }
        Ok(Self {
            version,
            creation_time: decode_time(input, version)?,
            modification_time: decode_time(input, version)?,
            time_scale: Decode::decode(input)?,
            duration: decode_time(input, version)?,
            language: Decode::decode(input)?,
            quality: Decode::decode(input)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Handler reference atom / ISO/IEC 14496-12:2008 8.4.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerReference {
    /// `mhlr` or `dhlr` in QuickTime movies, zero in MPEG-4 files.
    pub component_type: FourCC,
    pub component_subtype: FourCC,
    pub manufacturer: u32,
    pub flags: u32,
    pub flags_mask: u32,
    pub name: String,
}

impl Decode for HandlerReference {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        decode_version_and_flags(input)?;
        Ok(Self {
            component_type: Decode::decode(input)?,
            component_subtype: Decode::decode(input)?,
            manufacturer: Decode::decode(input)?,
            flags: Decode::decode(input)?,
            flags_mask: Decode::decode(input)?,
            name: decode_pascal_string(input, None)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Edit list atom / ISO/IEC 14496-12:2008 8.6.6
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditEntry {
    pub segment_duration: u64,
    pub media_time: i64,
    pub media_rate: I16F16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditListBox(pub Vec<EditEntry>);

impl Decode for EditListBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let (version, _) = decode_version_and_flags(input)?;
        let entry_size = if version == 1 { 20 } else { 12 };
        let count = decode_entry_count(input, entry_size)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let (segment_duration, media_time) = if version == 1 {
                (u64::decode(input)?, i64::decode(input)?)
            } else {
                (u32::decode(input)? as u64, i32::decode(input)? as i64)
            };
            entries.push(EditEntry {
                segment_duration,
                media_time,
                media_rate: Decode::decode(input)?,
            });
        }
        Ok(Self(entries))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Sample description atom / ISO/IEC 14496-12:2008 8.5.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntryHeader {
    pub size: u32,
    pub format: FourCC,
    pub data_reference_index: u16,
}

impl SampleEntryHeader {
    pub const SIZE: u64 = 16;
}

impl Decode for SampleEntryHeader {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let size = Decode::decode(input)?;
        let format = Decode::decode(input)?;
        skip(input, 6)?; // reserved
        Ok(Self {
            size,
            format,
            data_reference_index: Decode::decode(input)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Time-to-sample atom / ISO/IEC 14496-12:2008 8.6.1.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    pub count: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeToSampleBox(pub Vec<TimeToSampleEntry>);

impl Decode for TimeToSampleBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        decode_version_and_flags(input)?;
        let count = decode_entry_count(input, 8)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(TimeToSampleEntry {
                count: Decode::decode(input)?,
                duration: Decode::decode(input)?,
            });
        }
        Ok(Self(entries))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Sample-to-chunk atom / ISO/IEC 14496-12:2008 8.7.4
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    /// 1-based index of the first chunk of the run.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    /// 1-based index into the track's sample descriptions.
    pub sample_description_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleToChunkBox(pub Vec<SampleToChunkEntry>);

impl Decode for SampleToChunkBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        decode_version_and_flags(input)?;
        let count = decode_entry_count(input, 12)?;
        let mut entries: Vec<SampleToChunkEntry> = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = SampleToChunkEntry {
                first_chunk: Decode::decode(input)?,
                samples_per_chunk: Decode::decode(input)?,
                sample_description_id: Decode::decode(input)?,
            };
            if entry.first_chunk == 0 {
                return Err(Error::InvalidPayload("first chunk index is zero"));
            }
            if entries
                .last()
                .is_some_and(|last| last.first_chunk >= entry.first_chunk)
            {
                return Err(Error::InvalidPayload("first chunk indices are not increasing"));
            }
            entries.push(entry);
        }
        Ok(Self(entries))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Sample size atom / ISO/IEC 14496-12:2008 8.7.3.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSizes {
    Uniform { size: u32, count: u32 },
    PerSample(Vec<u32>),
}

impl Default for SampleSizes {
    fn default() -> Self {
        Self::Uniform { size: 0, count: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSizeBox(pub SampleSizes);

impl Decode for SampleSizeBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        decode_version_and_flags(input)?;
        let size = u32::decode(input)?;
        if size != 0 {
            let count = Decode::decode(input)?;
            return Ok(Self(SampleSizes::Uniform { size, count }));
        }
        let count = decode_entry_count(input, 4)?;
        let mut sizes = Vec::with_capacity(count);
        for _ in 0..count {
            sizes.push(Decode::decode(input)?);
        }
        Ok(Self(SampleSizes::PerSample(sizes)))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Sync sample atom / ISO/IEC 14496-12:2008 8.6.2
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Zero-based indices of the sync samples, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSampleBox(pub Vec<u32>);

impl Decode for SyncSampleBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        decode_version_and_flags(input)?;
        let count = decode_entry_count(input, 4)?;
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let sample = u32::decode(input)?;
            if sample == 0 {
                return Err(Error::InvalidPayload("sync sample number is zero"));
            }
            samples.push(sample - 1);
        }
        samples.sort_unstable();
        samples.dedup();
        Ok(Self(samples))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Chunk offset atom / ISO/IEC 14496-12:2008 8.7.5
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOffsetBox(pub Vec<u64>);

impl Decode for ChunkOffsetBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        decode_version_and_flags(input)?;
        let count = decode_entry_count(input, 4)?;
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(u32::decode(input)? as u64);
        }
        Ok(Self(offsets))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLargeOffsetBox(pub Vec<u64>);

impl Decode for ChunkLargeOffsetBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        decode_version_and_flags(input)?;
        let count = decode_entry_count(input, 8)?;
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(Decode::decode(input)?);
        }
        Ok(Self(offsets))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Compressed movie atom
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Contents of a `cmov` atom: a `dcom` atom naming the algorithm followed by a `cmvd` atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedMovie<'a> {
    pub compression: FourCC,
    pub uncompressed_size: u32,
    pub data: &'a [u8],
}

impl<'a> CompressedMovie<'a> {
    pub fn decode(input: &mut &'a [u8]) -> Result<Self> {
        let size = u32::decode(input)?;
        if FourCC::decode(input)? != FourCC::new(b"dcom") || size != 12 {
            return Err(Error::InvalidPayload("expected a 12 byte dcom atom"));
        }
        let compression = FourCC::decode(input)?;

        let size = u32::decode(input)? as usize;
        if FourCC::decode(input)? != FourCC::new(b"cmvd") || size < 12 {
            return Err(Error::InvalidPayload("expected a cmvd atom"));
        }
        let uncompressed_size = u32::decode(input)?;
        let data = take(input, size - 12)?;
        Ok(Self {
            compression,
            uncompressed_size,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use fixed_macro::types::I16F16;

    use super::*;

    fn payload(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_be_bytes()).collect()
    }

    #[test]
    fn test_sample_to_chunk_rejects_zero_first_chunk() {
        let data = payload(&[0, 1, 0, 4, 1]);
        assert!(matches!(
            SampleToChunkBox::decode(&mut data.as_slice()),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_sample_to_chunk_rejects_unordered_runs() {
        let data = payload(&[0, 2, 3, 4, 1, 2, 1, 1]);
        assert!(SampleToChunkBox::decode(&mut data.as_slice()).is_err());
    }

    #[test]
    fn test_entry_count_larger_than_payload() {
        let data = payload(&[0, 0x1000_0000, 1, 1]);
        assert!(matches!(
            TimeToSampleBox::decode(&mut data.as_slice()),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_sample_size_variants() {
        let data = payload(&[0, 512, 10]);
        assert_eq!(
            SampleSizeBox::decode(&mut data.as_slice()).unwrap().0,
            SampleSizes::Uniform { size: 512, count: 10 }
        );

        let data = payload(&[0, 0, 3, 7, 8, 9]);
        assert_eq!(
            SampleSizeBox::decode(&mut data.as_slice()).unwrap().0,
            SampleSizes::PerSample(vec![7, 8, 9])
        );
    }

    #[test]
    fn test_sync_samples_are_zero_based() {
        let data = payload(&[0, 3, 10, 1, 5]);
        assert_eq!(
            SyncSampleBox::decode(&mut data.as_slice()).unwrap().0,
            vec![0, 4, 9]
        );
    }

    #[test]
    fn test_edit_list_version_1() {
        let mut data = vec![1, 0, 0, 0];
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&0x1_0000_0000u64.to_be_bytes());
        data.extend_from_slice(&(-1i64).to_be_bytes());
        data.extend_from_slice(&0x0001_8000u32.to_be_bytes());
        let edits = EditListBox::decode(&mut data.as_slice()).unwrap().0;
        assert_eq!(
            edits,
            vec![EditEntry {
                segment_duration: 0x1_0000_0000,
                media_time: -1,
                media_rate: I16F16!(1.5),
            }]
        );
    }

    #[test]
    fn test_movie_header_version_1() {
        let mut data = vec![1, 0, 0, 0];
        data.extend_from_slice(&1u64.to_be_bytes());
        data.extend_from_slice(&2u64.to_be_bytes());
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&0x2_0000_0000u64.to_be_bytes());
        data.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        data.extend_from_slice(&0x0100u16.to_be_bytes());
        data.extend_from_slice(&[0; 10]);
        data.extend(payload(&[0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]));
        data.extend(payload(&[0, 0, 0, 0, 0, 0, 3]));
        let header = MovieHeader::decode(&mut data.as_slice()).unwrap();
        assert_eq!(header.time_scale, 1000);
        assert_eq!(header.duration, 0x2_0000_0000);
        assert_eq!(header.matrix, Matrix::identity());
        assert_eq!(header.next_track_id, 3);
    }

    #[test]
    fn test_media_header_version_2_rejected() {
        let data = payload(&[0x0200_0000, 0, 0, 600, 100, 0]);
        assert!(MediaHeader::decode(&mut data.as_slice()).is_err());
    }

    #[test]
    fn test_compressed_movie() {
        let mut data = payload(&[12]);
        data.extend_from_slice(b"dcomzlib");
        data.extend(payload(&[15]));
        data.extend_from_slice(b"cmvd");
        data.extend(payload(&[100]));
        data.extend_from_slice(&[1, 2, 3]);
        let movie = CompressedMovie::decode(&mut data.as_slice()).unwrap();
        assert_eq!(movie.compression, FourCC::ZLIB);
        assert_eq!(movie.uncompressed_size, 100);
        assert_eq!(movie.data, &[1, 2, 3]);
    }
}

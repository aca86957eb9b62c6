use fixed::types::U16F16;
use tracing::warn;

use crate::{
    marshal::{decode_pascal_string, skip, Decode, FourCC},
    Result,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Video sample description / ISO/IEC 14496-12:2008 8.5.2.2
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct VisualSampleEntry {
    pub version: u16,
    pub revision: u16,
    pub vendor: FourCC,
    pub temporal_quality: u32,
    pub spatial_quality: u32,
    pub width: u16,
    pub height: u16,
    pub horizontal_resolution: U16F16,
    pub vertical_resolution: U16F16,
    pub data_size: u32,
    pub frame_count: u16,
    pub compressor_name: String,
    pub depth: u16,
    pub color_table_id: i16,
    /// RGB entries for indexed formats, either read from the inline color table or generated
    /// for grayscale depths.
    pub palette: Option<Vec<[u8; 3]>>,
}

impl VisualSampleEntry {
    pub fn bits_per_pixel(&self) -> u16 {
        self.depth & 0x1F
    }

    pub fn is_grayscale(&self) -> bool {
        self.depth & 0x20 != 0
    }
}

fn decode_color_table(input: &mut &[u8], bits: u16) -> Result<Vec<[u8; 3]>> {
    skip(input, 4)?; // seed
    skip(input, 2)?; // flags
    let last = u16::decode(input)? as usize;
    let mut palette = vec![[0u8; 3]; 1 << bits];
    for i in 0..=last {
        let index = u16::decode(input)? as usize;
        let red = u16::decode(input)?;
        let green = u16::decode(input)?;
        let blue = u16::decode(input)?;
        // Some writers leave the index field zeroed and rely on entry order.
        let index = if index == 0 { i } else { index };
        if let Some(entry) = palette.get_mut(index) {
            *entry = [(red >> 8) as u8, (green >> 8) as u8, (blue >> 8) as u8];
        }
    }
    Ok(palette)
}

fn grayscale_palette(bits: u16) -> Vec<[u8; 3]> {
    let count = 1usize << bits;
    (0..count)
        .map(|i| {
            let level = (255 - i * 255 / (count - 1).max(1)) as u8;
            [level; 3]
        })
        .collect()
}

impl Decode for VisualSampleEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = Decode::decode(input)?;
        let revision = Decode::decode(input)?;
        let vendor = Decode::decode(input)?;
        let temporal_quality = Decode::decode(input)?;
        let spatial_quality = Decode::decode(input)?;
        let width = Decode::decode(input)?;
        let height = Decode::decode(input)?;
        let horizontal_resolution = Decode::decode(input)?;
        let vertical_resolution = Decode::decode(input)?;
        let data_size = Decode::decode(input)?;
        let frame_count = Decode::decode(input)?;
        let compressor_name = decode_pascal_string(input, Some(32))?;
        let depth = Decode::decode(input)?;
        let color_table_id = Decode::decode(input)?;

        let mut entry = Self {
            version,
            revision,
            vendor,
            temporal_quality,
            spatial_quality,
            width,
            height,
            horizontal_resolution,
            vertical_resolution,
            data_size,
            frame_count,
            compressor_name,
            depth,
            color_table_id,
            palette: None,
        };
        let bits = entry.bits_per_pixel();
        if matches!(bits, 1 | 2 | 4 | 8) {
            if entry.is_grayscale() {
                entry.palette = Some(grayscale_palette(bits));
            } else if entry.color_table_id == 0 {
                entry.palette = Some(decode_color_table(input, bits)?);
            }
        }
        Ok(entry)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QuickTime File Format: Sound sample description versions 0, 1 and 2
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Sound sample description with the version specific fields folded into one layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundSampleEntry {
    pub version: u16,
    pub revision: u16,
    pub vendor: FourCC,
    pub channels: u32,
    pub sample_size: u32,
    pub compression_id: i16,
    pub packet_size: u16,
    pub sample_rate: f64,
    pub samples_per_packet: u32,
    pub bytes_per_packet: u32,
    pub bytes_per_frame: u32,
    pub bytes_per_sample: u32,
    pub format_flags: u32,
}

impl Decode for SoundSampleEntry {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = u16::decode(input)?;
        let revision = Decode::decode(input)?;
        let vendor = Decode::decode(input)?;
        let channels = u16::decode(input)? as u32;
        let sample_size = u16::decode(input)? as u32;
        let compression_id = Decode::decode(input)?;
        let packet_size = Decode::decode(input)?;
        let sample_rate = U16F16::decode(input)?.to_num::<f64>();

        let mut entry = Self {
            version,
            revision,
            vendor,
            channels,
            sample_size,
            compression_id,
            packet_size,
            sample_rate,
            samples_per_packet: 0,
            bytes_per_packet: 0,
            bytes_per_frame: 0,
            bytes_per_sample: 0,
            format_flags: 0,
        };
        match version {
            0 => {}
            1 => {
                entry.samples_per_packet = Decode::decode(input)?;
                entry.bytes_per_packet = Decode::decode(input)?;
                entry.bytes_per_frame = Decode::decode(input)?;
                entry.bytes_per_sample = Decode::decode(input)?;
            }
            2 => {
                skip(input, 4)?; // size of struct only
                entry.sample_rate = Decode::decode(input)?;
                entry.channels = Decode::decode(input)?;
                skip(input, 4)?; // always 0x7F000000
                entry.sample_size = Decode::decode(input)?;
                entry.format_flags = Decode::decode(input)?;
                entry.bytes_per_frame = Decode::decode(input)?;
                entry.samples_per_packet = Decode::decode(input)?;
            }
            version => warn!("unknown sound description version {version}, using version 0 fields"),
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visual_entry(depth: u16, color_table_id: i16) -> Vec<u8> {
        let mut data = vec![0; 4]; // version, revision
        data.extend_from_slice(b"appl");
        data.extend_from_slice(&[0; 8]); // quality
        data.extend_from_slice(&320u16.to_be_bytes());
        data.extend_from_slice(&240u16.to_be_bytes());
        data.extend_from_slice(&0x0048_0000u32.to_be_bytes());
        data.extend_from_slice(&0x0048_0000u32.to_be_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&1u16.to_be_bytes());
        let mut name = [0u8; 32];
        name[0] = 4;
        name[1..5].copy_from_slice(b"Test");
        data.extend_from_slice(&name);
        data.extend_from_slice(&depth.to_be_bytes());
        data.extend_from_slice(&color_table_id.to_be_bytes());
        data
    }

    #[test]
    fn test_visual_entry_without_palette() {
        let data = visual_entry(24, -1);
        let mut input = data.as_slice();
        let entry = VisualSampleEntry::decode(&mut input).unwrap();
        assert!(input.is_empty());
        assert_eq!((entry.width, entry.height), (320, 240));
        assert_eq!(entry.compressor_name, "Test");
        assert_eq!(entry.horizontal_resolution, U16F16::from_num(72));
        assert!(entry.palette.is_none());
    }

    #[test]
    fn test_visual_entry_inline_color_table() {
        let mut data = visual_entry(2, 0);
        data.extend_from_slice(&[0; 6]); // seed, flags
        data.extend_from_slice(&1u16.to_be_bytes());
        for (index, value) in [(0u16, 0xFFFFu16), (1, 0x8000)] {
            data.extend_from_slice(&index.to_be_bytes());
            for _ in 0..3 {
                data.extend_from_slice(&value.to_be_bytes());
            }
        }
        let entry = VisualSampleEntry::decode(&mut data.as_slice()).unwrap();
        assert_eq!(
            entry.palette.unwrap(),
            vec![[0xFF; 3], [0x80; 3], [0; 3], [0; 3]]
        );
    }

    #[test]
    fn test_visual_entry_grayscale() {
        let data = visual_entry(0x20 | 1, -1);
        let entry = VisualSampleEntry::decode(&mut data.as_slice()).unwrap();
        assert_eq!(entry.palette.unwrap(), vec![[255; 3], [0; 3]]);
    }

    fn sound_entry(version: u16) -> Vec<u8> {
        let mut data = version.to_be_bytes().to_vec();
        data.extend_from_slice(&[0; 6]); // revision, vendor
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&16u16.to_be_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&(44100u32 << 16).to_be_bytes());
        data
    }

    #[test]
    fn test_sound_entry_version_1() {
        let mut data = sound_entry(1);
        for value in [1024u32, 2, 4, 2] {
            data.extend_from_slice(&value.to_be_bytes());
        }
        let entry = SoundSampleEntry::decode(&mut data.as_slice()).unwrap();
        assert_eq!(entry.channels, 2);
        assert_eq!(entry.sample_rate, 44100.0);
        assert_eq!(entry.samples_per_packet, 1024);
        assert_eq!(entry.bytes_per_frame, 4);
    }

    #[test]
    fn test_sound_entry_unknown_version() {
        let data = sound_entry(3);
        let entry = SoundSampleEntry::decode(&mut data.as_slice()).unwrap();
        assert_eq!(entry.version, 3);
        assert_eq!(entry.channels, 2);
        assert_eq!(entry.sample_rate, 44100.0);
        assert_eq!(entry.samples_per_packet, 0);
    }

    #[test]
    fn test_sound_entry_version_2() {
        let mut data = sound_entry(2);
        data.extend_from_slice(&72u32.to_be_bytes());
        data.extend_from_slice(&96000f64.to_be_bytes());
        for value in [6u32, 0x7F00_0000, 24, 0x0C, 18, 1] {
            data.extend_from_slice(&value.to_be_bytes());
        }
        let entry = SoundSampleEntry::decode(&mut data.as_slice()).unwrap();
        assert_eq!(entry.sample_rate, 96000.0);
        assert_eq!(entry.channels, 6);
        assert_eq!(entry.sample_size, 24);
        assert_eq!(entry.bytes_per_frame, 18);
        assert_eq!(entry.samples_per_packet, 1);
    }
}

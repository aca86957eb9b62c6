use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    marshal::{skip, take, Decode},
    Error, Result,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-1 7.2.6
////////////////////////////////////////////////////////////////////////////////////////////////////

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

/// Reads a descriptor tag and its length, the length being up to four 7-bit groups.
fn decode_descriptor_header(input: &mut &[u8]) -> Result<(u8, usize)> {
    let tag = input.read_u8()?;
    let mut length = 0usize;
    for _ in 0..4 {
        let byte = input.read_u8()?;
        length = length << 7 | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, length))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub object_type: u8,
    pub stream_type: u8,
    pub buffer_size: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    pub specific_info: Option<Vec<u8>>,
}

impl Decode for DecoderConfig {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let object_type = input.read_u8()?;
        let stream_type = input.read_u8()? >> 2;
        let buffer_size = input.read_u24::<BigEndian>()?;
        let max_bitrate = Decode::decode(input)?;
        let avg_bitrate = Decode::decode(input)?;

        let mut specific_info = None;
        if !input.is_empty() {
            let (tag, length) = decode_descriptor_header(input)?;
            if tag == DECODER_SPECIFIC_INFO_TAG {
                specific_info = Some(take(input, length.min(input.len()))?.to_owned());
            }
        }
        Ok(Self {
            object_type,
            stream_type,
            buffer_size,
            max_bitrate,
            avg_bitrate,
            specific_info,
        })
    }
}

/// Payload of an `esds` atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsDescriptor {
    pub es_id: u16,
    pub priority: u8,
    pub decoder_config: Option<DecoderConfig>,
}

impl Decode for EsDescriptor {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        skip(input, 4)?; // version and flags

        let (tag, _) = decode_descriptor_header(input)?;
        let es_id = Decode::decode(input)?;
        let mut priority = 0;
        if tag == ES_DESCRIPTOR_TAG {
            let flags = input.read_u8()?;
            priority = flags & 0x1F;
            if flags & 0x80 != 0 {
                skip(input, 2)?; // depends on ES id
            }
            if flags & 0x40 != 0 {
                let length = input.read_u8()? as usize;
                skip(input, length)?; // URL
            }
            if flags & 0x20 != 0 {
                skip(input, 2)?; // OCR ES id
            }
        }

        let mut decoder_config = None;
        if !input.is_empty() {
            let (tag, length) = decode_descriptor_header(input)?;
            if tag != DECODER_CONFIG_DESCRIPTOR_TAG {
                return Err(Error::InvalidPayload("expected a decoder config descriptor"));
            }
            let mut data = take(input, length.min(input.len()))?;
            decoder_config = Some(DecoderConfig::decode(&mut data)?);
        }
        Ok(Self {
            es_id,
            priority,
            decoder_config,
        })
    }
}

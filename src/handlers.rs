use std::io::{Read, Seek, SeekFrom};

use fixed::types::I16F16;
use num_rational::Ratio;
use tracing::{debug, warn};

use crate::{
    atom::{Atom, Flow},
    marshal::{
        esds::EsDescriptor,
        qt::{
            ChunkLargeOffsetBox, ChunkOffsetBox, EditListBox, HandlerReference, MediaHeader,
            MovieHeader, SampleEntryHeader, SampleSizeBox, SampleToChunkBox, SyncSampleBox,
            TimeToSampleBox, TrackHeader,
        },
        Decode, FourCC,
    },
    parser::QuickTimeParser,
    sample_desc::{SampleDescBase, UnknownSampleDesc},
    stream::ByteStream,
    track::{CodecType, EditListEntry, Track},
    Result,
};

/// Reads and decodes the whole payload of `atom`.
fn read_decoded<T: Decode>(
    parser: &QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<T> {
    let data = atom.read_payload(stream, parser.options.max_payload_size)?;
    T::decode(&mut data.as_slice()).map_err(|error| atom.decode_error(error))
}

/// Horizontal or vertical scale of a display matrix, 1 for a degenerate matrix.
pub(crate) fn scale_factor(value: I16F16) -> Ratio<i64> {
    match value.to_bits() as i64 {
        0 => Ratio::from_integer(1),
        bits => Ratio::new(0x10000, bits),
    }
}

pub(crate) fn read_moov(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    parser.read_default(stream, atom)?;
    parser.found_moov = true;
    Ok(Flow::Stop)
}

pub(crate) fn read_trak(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    parser.tracks.push(Track::new());
    parser.read_default(stream, atom)
}

pub(crate) fn read_mvhd(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let header: MovieHeader = read_decoded(parser, stream, atom)?;
    debug!(
        "movie time scale {}, duration {}",
        header.time_scale, header.duration
    );
    parser.time_scale = header.time_scale;
    parser.duration = header.duration;
    parser.scale_factor_x = scale_factor(header.matrix.a);
    parser.scale_factor_y = scale_factor(header.matrix.d);
    parser.movie_header = Some(header);
    Ok(Flow::Continue)
}

pub(crate) fn read_tkhd(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let header: TrackHeader = read_decoded(parser, stream, atom)?;
    let track = parser.current_track_mut(&atom)?;
    track.track_id = header.track_id;
    track.duration = header.duration;
    track.matrix = header.matrix;
    track.scale_factor_x = scale_factor(header.matrix.a);
    track.scale_factor_y = scale_factor(header.matrix.d);
    track.width = (header.width.to_bits() >> 16) as u16;
    track.height = (header.height.to_bits() >> 16) as u16;
    Ok(Flow::Continue)
}

pub(crate) fn read_mdhd(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let data = atom.read_payload(stream, parser.options.max_payload_size)?;
    if let Some(version) = data.first().filter(|&&version| version > 1) {
        warn!("skipping media header version {version}");
        return Ok(Flow::Continue);
    }
    let header = MediaHeader::decode(&mut data.as_slice()).map_err(|error| atom.decode_error(error))?;
    let track = parser.current_track_mut(&atom)?;
    track.time_scale = header.time_scale;
    track.media_duration = header.duration;
    track.language = header.language;
    Ok(Flow::Continue)
}

pub(crate) fn read_hdlr(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let handler: HandlerReference = read_decoded(parser, stream, atom)?;
    let codec_type = match &handler.component_subtype.to_bytes() {
        b"vide" => Some(CodecType::Video),
        b"soun" => Some(CodecType::Audio),
        b"musi" => Some(CodecType::Midi),
        _ => None,
    };
    match handler.component_type.to_bytes() {
        [0, 0, 0, 0] => parser.is_mpeg4 = true,
        component_type if &component_type == b"mhlr" => parser.is_mpeg4 = false,
        _ => {}
    }
    let track = parser.current_track_mut(&atom)?;
    if let Some(codec_type) = codec_type {
        debug!("track {} handles {:?}", track.track_id, codec_type);
        track.codec_type = codec_type;
    }
    Ok(Flow::Continue)
}

pub(crate) fn read_elst(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let EditListBox(edits) = read_decoded(parser, stream, atom)?;
    let mut time_offset = 0u64;
    let edit_list = edits
        .into_iter()
        .map(|edit| {
            let entry = EditListEntry {
                track_duration: edit.segment_duration,
                time_offset,
                media_time: edit.media_time,
                media_rate: Ratio::new(edit.media_rate.to_bits() as i64, 0x10000),
            };
            time_offset += edit.segment_duration;
            entry
        })
        .collect();
    parser.current_track_mut(&atom)?.edit_list = edit_list;
    Ok(Flow::Continue)
}

pub(crate) fn read_stsd(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    parser.current_track_mut(&atom)?;
    let track_index = parser.tracks.len() - 1;

    let mut header = [0u8; 8];
    if atom.payload_size() < header.len() as u64 {
        return Err(atom.malformed("sample description header is truncated"));
    }
    stream.read_exact(&mut header)?;
    let count = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    let mut offset = atom.payload_offset() + header.len() as u64;
    for _ in 0..count {
        if offset + SampleEntryHeader::SIZE > atom.end() {
            return Err(atom.malformed("sample description table is truncated"));
        }
        stream.seek(SeekFrom::Start(offset))?;
        let mut entry_header = [0u8; SampleEntryHeader::SIZE as usize];
        stream.read_exact(&mut entry_header)?;
        let entry_header = SampleEntryHeader::decode(&mut &entry_header[..])?;
        let entry = Atom {
            r#type: entry_header.format,
            offset,
            size: entry_header.size as u64,
            header_size: SampleEntryHeader::SIZE,
        };
        if entry.size < SampleEntryHeader::SIZE || entry.end() > atom.end() {
            return Err(entry.malformed("sample description does not fit its table"));
        }

        let body = entry.read_payload(stream, parser.options.max_payload_size)?;
        let mut payload = body.as_slice();
        let desc = parser.sample_desc_factory.read_sample_desc(
            &parser.tracks[track_index],
            entry.r#type,
            &mut payload,
        )?;
        match desc {
            Some(desc) => {
                let consumed = (body.len() - payload.len()) as u64;
                parser.tracks[track_index].sample_descs.push(desc);
                let nested = Atom::root(
                    entry.r#type,
                    entry.payload_offset() + consumed,
                    entry.payload_size() - consumed,
                );
                if nested.size >= 8 {
                    parser.read_default(stream, nested)?;
                }
            }
            None => {
                debug!("no sample description for {}", entry.r#type);
                parser.tracks[track_index]
                    .sample_descs
                    .push(Box::new(UnknownSampleDesc {
                        base: SampleDescBase::new(entry.r#type),
                    }));
            }
        }
        offset = entry.end();
    }
    stream.seek(SeekFrom::Start(offset))?;
    Ok(Flow::Continue)
}

pub(crate) fn read_stts(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let TimeToSampleBox(runs) = read_decoded(parser, stream, atom)?;
    let track = parser.current_track_mut(&atom)?;
    track.frame_count = runs.iter().map(|run| run.count as u64).sum();
    track.time_to_sample = runs;
    Ok(Flow::Continue)
}

pub(crate) fn read_stsc(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let SampleToChunkBox(runs) = read_decoded(parser, stream, atom)?;
    parser.current_track_mut(&atom)?.sample_to_chunk = runs;
    Ok(Flow::Continue)
}

pub(crate) fn read_stsz(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let SampleSizeBox(sizes) = read_decoded(parser, stream, atom)?;
    parser.current_track_mut(&atom)?.sample_sizes = sizes;
    Ok(Flow::Continue)
}

pub(crate) fn read_stss(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let SyncSampleBox(keyframes) = read_decoded(parser, stream, atom)?;
    parser.current_track_mut(&atom)?.keyframes = Some(keyframes);
    Ok(Flow::Continue)
}

fn set_chunk_offsets(parser: &mut QuickTimeParser<'_>, atom: Atom, offsets: Vec<u64>) -> Result<Flow> {
    let begin = parser.chunk_begin_offset as u64;
    let offsets = offsets
        .into_iter()
        .map(|offset| offset.checked_sub(begin))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| atom.malformed("chunk offset precedes the chunk begin offset"))?;
    parser.current_track_mut(&atom)?.chunk_offsets = offsets;
    Ok(Flow::Continue)
}

pub(crate) fn read_stco(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let ChunkOffsetBox(offsets) = read_decoded(parser, stream, atom)?;
    set_chunk_offsets(parser, atom, offsets)
}

pub(crate) fn read_co64(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let ChunkLargeOffsetBox(offsets) = read_decoded(parser, stream, atom)?;
    set_chunk_offsets(parser, atom, offsets)
}

pub(crate) fn read_wave(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    if parser.current_sample_desc_mut(&atom)?.codec_tag() == FourCC::QDM2 {
        let data = atom.read_payload(stream, parser.options.max_payload_size)?;
        parser.current_sample_desc_mut(&atom)?.base_mut().extra_data = Some(data);
        return Ok(Flow::Continue);
    }
    if atom.payload_size() > 8 {
        parser.read_default(stream, atom)?;
    }
    Ok(Flow::Continue)
}

pub(crate) fn read_esds(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let descriptor: EsDescriptor = read_decoded(parser, stream, atom)?;
    let desc = parser.current_sample_desc_mut(&atom)?;
    if let Some(config) = descriptor.decoder_config {
        let base = desc.base_mut();
        base.object_type_mp4 = config.object_type;
        base.extra_data = config.specific_info;
    }
    Ok(Flow::Continue)
}

/// Keeps the whole payload as codec configuration of the current sample description.
pub(crate) fn read_extra_data(
    parser: &mut QuickTimeParser<'_>,
    stream: &mut dyn ByteStream,
    atom: Atom,
) -> Result<Flow> {
    let data = atom.read_payload(stream, parser.options.max_payload_size)?;
    parser.current_sample_desc_mut(&atom)?.base_mut().extra_data = Some(data);
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_factor() {
        assert_eq!(scale_factor(I16F16::from_num(1)), Ratio::from_integer(1));
        assert_eq!(scale_factor(I16F16::from_num(2)), Ratio::new(1, 2));
        assert_eq!(scale_factor(I16F16::from_num(-0.5)), Ratio::from_integer(-2));
        assert_eq!(scale_factor(I16F16::from_num(0)), Ratio::from_integer(1));
    }
}

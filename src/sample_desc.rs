use std::{
    any::Any,
    collections::HashMap,
    fmt::{Debug, Formatter},
};

use crate::{
    marshal::{
        sample_entry::{SoundSampleEntry, VisualSampleEntry},
        Decode, FourCC,
    },
    track::{CodecType, Track},
    Error, Result,
};

/// Fields every sample description carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleDescBase {
    pub codec_tag: FourCC,
    /// Codec configuration from `esds`, `wave`, `SMI ` or similar atoms.
    pub extra_data: Option<Vec<u8>>,
    /// Object type indication from the MPEG-4 decoder config, 0 when absent.
    pub object_type_mp4: u8,
}

impl SampleDescBase {
    pub fn new(codec_tag: FourCC) -> Self {
        Self {
            codec_tag,
            ..Default::default()
        }
    }
}

/// One entry of a track's sample description table.
pub trait SampleDesc: Debug + Any {
    fn base(&self) -> &SampleDescBase;

    fn base_mut(&mut self) -> &mut SampleDescBase;

    fn as_any(&self) -> &dyn Any;

    fn codec_tag(&self) -> FourCC {
        self.base().codec_tag
    }

    fn extra_data(&self) -> Option<&[u8]> {
        self.base().extra_data.as_deref()
    }

    fn object_type_mp4(&self) -> u8 {
        self.base().object_type_mp4
    }
}

impl dyn SampleDesc {
    pub fn downcast_ref<T: SampleDesc>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

macro_rules! impl_sample_desc {
    ($type:ty) => {
        impl SampleDesc for $type {
            fn base(&self) -> &SampleDescBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut SampleDescBase {
                &mut self.base
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSampleDesc {
    pub base: SampleDescBase,
    pub entry: VisualSampleEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSampleDesc {
    pub base: SampleDescBase,
    pub entry: SoundSampleEntry,
}

/// Music track description. The payload is kept whole as extra data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiSampleDesc {
    pub base: SampleDescBase,
}

/// Placeholder for an entry no factory recognized, keeping the 1-based ids aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSampleDesc {
    pub base: SampleDescBase,
}

impl_sample_desc!(VideoSampleDesc);
impl_sample_desc!(AudioSampleDesc);
impl_sample_desc!(MidiSampleDesc);
impl_sample_desc!(UnknownSampleDesc);

/// Builds sample descriptions from the body of each `stsd` entry.
pub trait SampleDescFactory {
    /// `payload` holds the entry after its 16 byte header. Bytes left unconsumed are walked as
    /// nested atoms. `Ok(None)` skips the entry, an error aborts the parse.
    fn read_sample_desc(
        &self,
        track: &Track,
        codec_tag: FourCC,
        payload: &mut &[u8],
    ) -> Result<Option<Box<dyn SampleDesc>>>;
}

pub type SampleDescConstructor =
    fn(&Track, FourCC, &mut &[u8]) -> Result<Option<Box<dyn SampleDesc>>>;

/// Factory dispatching on the codec tag, falling back on the track's codec type.
#[derive(Clone, Default)]
pub struct SampleDescRegistry {
    codecs: HashMap<FourCC, SampleDescConstructor>,
}

impl Debug for SampleDescRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.codecs.keys()).finish()
    }
}

impl SampleDescRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for `codec_tag`, returning the one it replaces.
    pub fn register(
        &mut self,
        codec_tag: FourCC,
        constructor: SampleDescConstructor,
    ) -> Option<SampleDescConstructor> {
        self.codecs.insert(codec_tag, constructor)
    }
}

impl SampleDescFactory for SampleDescRegistry {
    fn read_sample_desc(
        &self,
        track: &Track,
        codec_tag: FourCC,
        payload: &mut &[u8],
    ) -> Result<Option<Box<dyn SampleDesc>>> {
        if let Some(constructor) = self.codecs.get(&codec_tag) {
            return constructor(track, codec_tag, payload);
        }
        match track.codec_type {
            CodecType::Video => read_video_sample_desc(track, codec_tag, payload),
            CodecType::Audio => read_audio_sample_desc(track, codec_tag, payload),
            CodecType::Midi => read_midi_sample_desc(track, codec_tag, payload),
            CodecType::Other => Ok(None),
        }
    }
}

fn factory_error(codec: FourCC, error: Error) -> Error {
    Error::CodecFactory {
        codec,
        reason: error.to_string(),
    }
}

pub fn read_video_sample_desc(
    _: &Track,
    codec_tag: FourCC,
    payload: &mut &[u8],
) -> Result<Option<Box<dyn SampleDesc>>> {
    let entry = VisualSampleEntry::decode(payload).map_err(|error| factory_error(codec_tag, error))?;
    Ok(Some(Box::new(VideoSampleDesc {
        base: SampleDescBase::new(codec_tag),
        entry,
    })))
}

pub fn read_audio_sample_desc(
    _: &Track,
    codec_tag: FourCC,
    payload: &mut &[u8],
) -> Result<Option<Box<dyn SampleDesc>>> {
    let entry = SoundSampleEntry::decode(payload).map_err(|error| factory_error(codec_tag, error))?;
    Ok(Some(Box::new(AudioSampleDesc {
        base: SampleDescBase::new(codec_tag),
        entry,
    })))
}

pub fn read_midi_sample_desc(
    _: &Track,
    codec_tag: FourCC,
    payload: &mut &[u8],
) -> Result<Option<Box<dyn SampleDesc>>> {
    let mut base = SampleDescBase::new(codec_tag);
    base.extra_data = Some(payload.to_vec());
    *payload = &payload[payload.len()..];
    Ok(Some(Box::new(MidiSampleDesc { base })))
}

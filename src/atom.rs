use std::{
    fmt::{Debug, Formatter},
    io::{ErrorKind, Read, Seek, SeekFrom},
};

use bstringify::bstringify;
use byteorder::{BigEndian, ReadBytesExt};
use tracing::{trace, warn};

use crate::{
    cmov::read_cmov,
    handlers::*,
    marshal::FourCC,
    options::ZeroSizePolicy,
    parser::QuickTimeParser,
    stream::ByteStream,
    Error, Result,
};

/// Position and extent of one atom in the stream being walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom {
    pub r#type: FourCC,
    /// Absolute offset of the atom header.
    pub offset: u64,
    /// Size including the header.
    pub size: u64,
    /// 8, 16 for extended sizes, or 0 for a range that has no header of its own.
    pub header_size: u64,
}

impl Atom {
    /// A headerless range, such as a whole stream or the tail of a sample description.
    pub fn root(r#type: FourCC, offset: u64, size: u64) -> Self {
        Self {
            r#type,
            offset,
            size,
            header_size: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.header_size == 0
    }

    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_size
    }

    pub fn payload_size(&self) -> u64 {
        self.size - self.header_size
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedAtom {
            r#type: self.r#type,
            offset: self.offset,
            reason: reason.into(),
        }
    }

    /// Attributes a payload decoding error to this atom.
    pub fn decode_error(&self, error: Error) -> Error {
        match error {
            Error::Io(error) if error.kind() == ErrorKind::UnexpectedEof => {
                self.malformed("payload is shorter than its fields")
            }
            Error::InvalidPayload(reason) => self.malformed(reason),
            error => error,
        }
    }

    /// Reads the whole payload, the stream being positioned at its start.
    pub fn read_payload(&self, stream: &mut dyn ByteStream, limit: u64) -> Result<Vec<u8>> {
        let len = self.payload_size();
        if len > limit {
            return Err(self.malformed(format!("payload of {len} bytes exceeds the limit")));
        }
        let mut data = Vec::with_capacity(len as usize);
        stream.take(len).read_to_end(&mut data)?;
        if (data.len() as u64) < len {
            return Err(Error::TruncatedStream {
                offset: self.payload_offset() + data.len() as u64,
                need: len - data.len() as u64,
            });
        }
        Ok(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The movie atom has been read; nothing further is walked.
    Stop,
}

/// Reads the payload of `atom`, the stream being positioned at its start.
pub type ReadFn = fn(&mut QuickTimeParser<'_>, &mut dyn ByteStream, Atom) -> Result<Flow>;

#[derive(Clone, Copy)]
pub enum Handler {
    /// Walk the payload as a list of child atoms.
    Default,
    /// Skip the payload.
    Leaf,
    Read(ReadFn),
}

impl Debug for Handler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Default => f.write_str("Default"),
            Handler::Leaf => f.write_str("Leaf"),
            Handler::Read(_) => f.write_str("Read(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseEntry {
    pub r#type: FourCC,
    pub handler: Handler,
}

macro_rules! parse_table {
    (@tag $type:ident) => {
        bstringify!($type)
    };
    (@tag $type:literal) => {
        $type
    };
    ($($type:tt => $handler:expr),* $(,)?) => {
        vec![$(
            ParseEntry {
                r#type: FourCC::new(parse_table!(@tag $type)),
                handler: $handler,
            },
        )*]
    };
}

/// Ordered mapping from atom type to handler. The first matching entry wins.
#[derive(Debug, Clone)]
pub struct ParseTable(Vec<ParseEntry>);

impl ParseTable {
    pub fn new(entries: Vec<ParseEntry>) -> Self {
        Self(entries)
    }

    /// Returns the table with `handler` taking precedence for `type`.
    pub fn with(mut self, r#type: FourCC, handler: Handler) -> Self {
        self.0.insert(0, ParseEntry { r#type, handler });
        self
    }

    /// Appends an entry, only consulted for types no earlier entry matches.
    pub fn push(&mut self, r#type: FourCC, handler: Handler) {
        self.0.push(ParseEntry { r#type, handler });
    }

    pub fn entries(&self) -> &[ParseEntry] {
        &self.0
    }

    pub fn lookup(&self, r#type: FourCC) -> Option<Handler> {
        self.0
            .iter()
            .find(|entry| entry.r#type == r#type)
            .map(|entry| entry.handler)
    }
}

impl Default for ParseTable {
    fn default() -> Self {
        Self(parse_table! {
            dinf => Handler::Default,
            dref => Handler::Leaf,
            edts => Handler::Default,
            elst => Handler::Read(read_elst),
            hdlr => Handler::Read(read_hdlr),
            mdat => Handler::Leaf,
            mdhd => Handler::Read(read_mdhd),
            mdia => Handler::Default,
            minf => Handler::Default,
            moov => Handler::Read(read_moov),
            mvhd => Handler::Read(read_mvhd),
            smhd => Handler::Leaf,
            stbl => Handler::Default,
            stco => Handler::Read(read_stco),
            co64 => Handler::Read(read_co64),
            stsc => Handler::Read(read_stsc),
            stsd => Handler::Read(read_stsd),
            stss => Handler::Read(read_stss),
            stsz => Handler::Read(read_stsz),
            stts => Handler::Read(read_stts),
            tkhd => Handler::Read(read_tkhd),
            trak => Handler::Read(read_trak),
            udta => Handler::Leaf,
            ctyp => Handler::Leaf,
            cmov => Handler::Read(read_cmov),
            wave => Handler::Read(read_wave),
            esds => Handler::Read(read_esds),
            b"SMI " => Handler::Read(read_extra_data),
            avcC => Handler::Read(read_extra_data),
            hvcC => Handler::Read(read_extra_data),
            gmhd => Handler::Default,
            gmin => Handler::Leaf,
        })
    }
}

impl<'s> QuickTimeParser<'s> {
    /// Walks the children of `parent`, dispatching each through the parse table.
    pub fn read_default(&mut self, stream: &mut dyn ByteStream, parent: Atom) -> Result<Flow> {
        if self.depth >= self.options.max_depth {
            return Err(parent.malformed("atoms nested too deep"));
        }
        self.depth += 1;
        let result = self.read_children(stream, parent);
        self.depth -= 1;
        result
    }

    fn read_children(&mut self, stream: &mut dyn ByteStream, parent: Atom) -> Result<Flow> {
        let end = parent.end();
        let mut offset = parent.payload_offset();
        while offset + 8 <= end {
            stream.seek(SeekFrom::Start(offset))?;
            let Some(atom) = self.read_atom_header(stream, parent, offset)? else {
                break;
            };
            trace!(
                "{:indent$}{} at {}, {} bytes",
                "",
                atom.r#type,
                atom.offset,
                atom.size,
                indent = self.depth as usize * 2
            );

            let flow = match self.parse_table.lookup(atom.r#type) {
                None => {
                    trace!("skipping unsupported atom {}", atom.r#type);
                    Flow::Continue
                }
                Some(Handler::Leaf) => Flow::Continue,
                Some(Handler::Default) => self.read_default(stream, atom)?,
                Some(Handler::Read(read)) => {
                    stream.seek(SeekFrom::Start(atom.payload_offset()))?;
                    let flow = read(self, stream, atom)?;
                    if stream.stream_position()? > atom.end() {
                        return Err(atom.malformed("handler read past the end of the atom"));
                    }
                    flow
                }
            };
            if flow == Flow::Stop {
                return Ok(Flow::Stop);
            }
            offset = atom.end();
        }
        Ok(Flow::Continue)
    }

    /// Reads the header at `offset`, returning `None` when traversal of `parent` should end.
    fn read_atom_header(
        &self,
        stream: &mut dyn ByteStream,
        parent: Atom,
        offset: u64,
    ) -> Result<Option<Atom>> {
        let end = parent.end();
        let mut size = stream.read_u32::<BigEndian>()? as u64;
        let r#type = FourCC(stream.read_u32::<BigEndian>()?);
        let mut header_size = 8;
        let malformed = |reason: &str| Error::MalformedAtom {
            r#type,
            offset,
            reason: reason.to_owned(),
        };

        let tolerate_junk = parent.is_root() && self.options.tolerate_trailing_junk;
        let junk = || {
            warn!(
                "ignoring {} bytes of trailing junk at offset {offset}",
                end - offset
            );
            Ok(None)
        };

        match size {
            0 => match self.options.zero_size_atoms {
                ZeroSizePolicy::ExtendToEnd => size = end - offset,
                ZeroSizePolicy::Terminate => return Ok(None),
                ZeroSizePolicy::Reject => return Err(malformed("atom has a size of zero")),
            },
            1 => {
                if offset + 16 > end {
                    if tolerate_junk {
                        return junk();
                    }
                    return Err(malformed("extended size runs past its container"));
                }
                size = stream.read_u64::<BigEndian>()?;
                header_size = 16;
                if size < 16 {
                    return Err(malformed("extended size is smaller than its header"));
                }
            }
            2..=7 => return Err(malformed("size is smaller than its header")),
            _ => {}
        }

        if offset.checked_add(size).map_or(true, |atom_end| atom_end > end) {
            if tolerate_junk {
                return junk();
            }
            return Err(malformed("atom extends past its container"));
        }
        Ok(Some(Atom {
            r#type,
            offset,
            size,
            header_size,
        }))
    }
}

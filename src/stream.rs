use std::io::{Read, Seek, SeekFrom};

use crate::Result;

/// Seekable byte source the parser reads atoms from.
pub trait ByteStream: Read + Seek {}

impl<T: Read + Seek> ByteStream for T {}

/// Whether the parser releases its stream on [`close`](crate::QuickTimeParser::close) or hands
/// it back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposeAfterUse {
    No,
    #[default]
    Yes,
}

/// Length of the stream, leaving the position unchanged.
pub fn stream_len(stream: &mut dyn ByteStream) -> Result<u64> {
    let position = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(position))?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_stream_len_keeps_position() {
        let mut cursor = Cursor::new(vec![0u8; 32]);
        cursor.seek(SeekFrom::Start(5)).unwrap();
        assert_eq!(stream_len(&mut cursor).unwrap(), 32);
        assert_eq!(cursor.position(), 5);
    }
}

//! Block scanner: finds the next block tag the decoder knows how to handle.
//!
//! Blocks are introduced by a four-byte ASCII tag followed by a 32-bit size.
//! When the bytes under the cursor are not a known tag the scanner slides
//! forward one byte at a time until one turns up. Running out of data while
//! scanning is the normal end of a file, not an error.

use std::fmt;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::reader::Reader;

/// Tags of the blocks the decoder reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    /// `LINE`: one system of the printed score.
    Line,
    /// `MEAS`: one measure and its element stream.
    Measure,
    /// `TITL`: title, subtitles, author, copyright, …
    Title,
    /// `TEXT`: free text items.
    Text,
    /// `TK<d><d>`: an instrument; the two digits are kept as a number.
    Instrument(u8),
}

impl BlockTag {
    /// Recognize a four-byte tag.
    pub fn classify(tag: &[u8; 4]) -> Option<Self> {
        match tag {
            b"LINE" => Some(BlockTag::Line),
            b"MEAS" => Some(BlockTag::Measure),
            b"TITL" => Some(BlockTag::Title),
            b"TEXT" => Some(BlockTag::Text),
            [b'T', b'K', d1, d2] if d1.is_ascii_digit() && d2.is_ascii_digit() => {
                Some(BlockTag::Instrument((d1 - b'0') * 10 + (d2 - b'0')))
            }
            _ => None,
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Line => f.write_str("LINE"),
            BlockTag::Measure => f.write_str("MEAS"),
            BlockTag::Title => f.write_str("TITL"),
            BlockTag::Text => f.write_str("TEXT"),
            BlockTag::Instrument(n) => write!(f, "TK{n:02}"),
        }
    }
}

/// A recognized tag and the offset of its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundBlock {
    pub tag: BlockTag,
    pub offset: usize,
}

/// Find the next known block tag, leaving the reader just past it.
///
/// Returns `None` once the buffer is exhausted; the reader is then at the end.
pub fn next_block(reader: &mut Reader<'_>, diag: &mut dyn Diagnostics) -> Option<FoundBlock> {
    let start = reader.position();
    if reader.remaining() < 4 {
        reader.skip(reader.remaining());
        return None;
    }

    let mut window = reader.read_tag().ok()?;
    loop {
        if let Some(tag) = BlockTag::classify(&window) {
            let offset = reader.position() - 4;
            if offset > start {
                diag.report(Diagnostic::Resync {
                    from: start,
                    to: offset,
                });
            }
            return Some(FoundBlock { tag, offset });
        }
        if reader.at_end() {
            diag.report(Diagnostic::Resync {
                from: start,
                to: reader.position(),
            });
            return None;
        }
        let next = reader.read_u8().ok()?;
        window = [window[1], window[2], window[3], next];
    }
}

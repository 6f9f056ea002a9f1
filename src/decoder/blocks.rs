//! Fixed-layout blocks: header, instruments, title page, free text, systems.

use super::skip;
use crate::diagnostics::Diagnostics;
use crate::error::{DecodeError, Result};
use crate::model::*;
use crate::reader::Reader;

/// Size of the fixed header, magic included.
const HEADER_SIZE: i64 = 0xC2;
/// Bytes of tag and size field in front of every block.
const BLOCK_PREFIX: i64 = 8;
/// Instrument blocks longer than this store names in two-byte characters.
pub(crate) const ONE_BYTE_NAME_LIMIT: u32 = 250;

const TITLE_ITEM_HEADER: i64 = 30;
const TITLE_ITEM_ONE_BYTE: usize = 66;
const TITLE_ITEM_TWO_BYTES: usize = 1026;
const STAFF_ENTRY_SIZE: i64 = 30;

// ─── Header ──────────────────────────────────────────────────────────

pub(crate) fn read_header(r: &mut Reader<'_>, diag: &mut dyn Diagnostics) -> Result<Header> {
    let tag = r.read_tag()?;
    let magic = FileMagic::from_tag(&tag).ok_or(DecodeError::InvalidMagic(tag))?;
    r.set_endian(magic.endian());
    log::debug!("magic {} ({:?})", magic.as_str(), magic.endian());

    let format_code = r.read_u8()?;
    skip(r, diag, 0x28 - 5);
    let header = Header {
        magic,
        format_code,
        version: r.read_u16()?,
        unknown1: r.read_u16()?,
        unknown2: r.read_u16()?,
        system_count: r.read_i16()?,
        page_count: r.read_i16()?,
        instrument_count: r.read_i8()?,
        staves_per_system: r.read_i8()?,
        measure_count: r.read_i16()?,
    };
    skip(r, diag, HEADER_SIZE - 0x36);
    Ok(header)
}

// ─── Instrument ──────────────────────────────────────────────────────

/// Read a `TKnn` block. The low 16 bits of the size field give the block
/// length including the tag and size field.
pub(crate) fn read_instrument(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    size: u32,
    number: u8,
) -> Result<Instrument> {
    let block_size = size & 0xFFFF;
    let two_bytes = block_size > ONE_BYTE_NAME_LIMIT;
    let mut nread = BLOCK_PREFIX;
    let mut name = String::new();

    while nread < block_size as i64 {
        let code = if two_bytes {
            nread += 2;
            r.read_u16()? as u32
        } else {
            nread += 1;
            r.read_u8()? as u32
        };
        if code == 0 {
            break;
        }
        name.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    skip(r, diag, block_size as i64 - nread);

    Ok(Instrument {
        name,
        tag_number: Some(number),
        block_size,
        staff_count: 0,
    })
}

// ─── Title ───────────────────────────────────────────────────────────

pub(crate) fn read_title(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    size: u32,
    width: CharWidth,
) -> Result<Title> {
    let start = r.position();
    skip(r, diag, 2);

    let title = read_title_items(r, diag, width, 1)?.concat();
    let subtitles = read_title_items(r, diag, width, 2)?;
    let instructions = read_title_items(r, diag, width, 3)?;
    let authors = read_title_items(r, diag, width, 4)?;
    let headers = read_title_items(r, diag, width, 2)?;
    let footers = read_title_items(r, diag, width, 2)?;
    let copyrights = read_title_items(r, diag, width, 6)?;

    skip(
        r,
        diag,
        match width {
            CharWidth::OneByte => 504,
            CharWidth::TwoBytes => 120,
        },
    );
    skip(r, diag, size as i64 - (r.position() - start) as i64);

    Ok(Title {
        title,
        subtitles: non_empty(subtitles),
        instructions: non_empty(instructions),
        authors: non_empty(authors),
        headers: non_empty(headers),
        footers: non_empty(footers),
        copyrights: non_empty(copyrights),
    })
}

/// One title item: a 30-byte item header and a fixed-size, NUL-terminated
/// string field. Two-byte characters are stored low byte first regardless
/// of the file's byte order.
fn read_title_item(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    width: CharWidth,
) -> Result<String> {
    skip(r, diag, TITLE_ITEM_HEADER);
    Ok(match width {
        CharWidth::OneByte => latin1_until(r.read_bytes(TITLE_ITEM_ONE_BYTE)?, &[0]),
        CharWidth::TwoBytes => utf16le_until_nul(r.read_bytes(TITLE_ITEM_TWO_BYTES)?),
    })
}

fn read_title_items(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    width: CharWidth,
    count: usize,
) -> Result<Vec<String>> {
    (0..count).map(|_| read_title_item(r, diag, width)).collect()
}

fn non_empty(items: Vec<String>) -> Vec<String> {
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

// ─── Free text ───────────────────────────────────────────────────────

pub(crate) fn read_free_text(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    size: u32,
) -> Result<FreeText> {
    let start = r.position();
    skip(r, diag, 2);
    let count = r.read_u16()?;
    skip(r, diag, 4);

    let mut texts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        // The size covers the rest of the 16-byte text header plus the string.
        let text_size = r.read_u16()? as usize;
        skip(r, diag, 14);
        let raw = r.read_bytes(text_size.saturating_sub(14))?;
        texts.push(latin1_until(raw, &[0, 4]));
    }
    skip(r, diag, size as i64 - (r.position() - start) as i64);

    Ok(FreeText { texts })
}

// ─── System ──────────────────────────────────────────────────────────

/// Read a `LINE` block with `staves_per_system` staff entries.
pub(crate) fn read_system(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    size: u32,
    staves_per_system: usize,
) -> Result<System> {
    skip(r, diag, 10);
    let start_measure = r.read_u16()?;
    let measure_count = r.read_u8()?;
    // 21 bytes read so far, counting tag and size

    let mut staves = Vec::with_capacity(staves_per_system);
    for _ in 0..staves_per_system {
        staves.push(read_staff_entry(r, diag)?);
    }
    skip(
        r,
        diag,
        size as i64 + BLOCK_PREFIX - 21 - STAFF_ENTRY_SIZE * staves_per_system as i64,
    );

    Ok(System {
        start_measure,
        measure_count,
        staves,
    })
}

fn read_staff_entry(r: &mut Reader<'_>, diag: &mut dyn Diagnostics) -> Result<StaffEntry> {
    skip(r, diag, 14);
    let clef = ClefKind::from_code(r.read_i8()?);
    let key = r.read_u8()?;
    let page = r.read_u8()?;
    skip(r, diag, 3);
    let kind = StaffKind::from_code(r.read_u8()?);
    let instrument_staff = r.read_u8()?;
    skip(r, diag, 8);
    Ok(StaffEntry {
        clef,
        key,
        page,
        kind,
        instrument_staff,
    })
}

// ─── Strings ─────────────────────────────────────────────────────────

/// One byte per character, ending at the first of `stops`.
pub(crate) fn latin1_until(bytes: &[u8], stops: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| !stops.contains(b))
        .map(|&b| b as char)
        .collect()
}

/// Two bytes per character, low byte first, ending at NUL.
pub(crate) fn utf16le_until_nul(bytes: &[u8]) -> String {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from(pair[0]) | (u16::from(pair[1]) << 8))
        .take_while(|&c| c != 0)
        .map(|c| char::from_u32(c as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

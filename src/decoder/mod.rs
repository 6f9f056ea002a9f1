//! Decoder: turns an Encore file buffer into a [`ScoreFile`].
//!
//! One pass from top to bottom: header, then every known block in file
//! order, then the fixups that fill in what the file leaves implicit
//! (default instruments, per-instrument staff counts, spanner ends).

mod blocks;
mod measure;

use crate::connector;
use crate::diagnostics::{Diagnostic, Diagnostics, LogSink};
use crate::error::Result;
use crate::model::*;
use crate::reader::Reader;
use crate::scanner::{next_block, BlockTag};

/// Options for decoding and note connection.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Append synthesized slur/wedge stop ornaments to their target measures.
    /// Turn off to see exactly the elements stored in the file.
    pub synthesize_spanner_ends: bool,
    /// Look up directions even for big-endian (`SCO5`) files, whose ornament
    /// fields are frequently zeroed.
    pub trust_big_endian_ornaments: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            synthesize_spanner_ends: true,
            trust_big_endian_ornaments: false,
        }
    }
}

/// Decode `data` with default options, logging diagnostics through `log`.
pub fn decode(data: &[u8]) -> Result<ScoreFile> {
    decode_with(data, &DecodeOptions::default(), &mut LogSink)
}

/// Decode `data`, reporting everything noteworthy to `diag`.
pub fn decode_with(
    data: &[u8],
    options: &DecodeOptions,
    diag: &mut dyn Diagnostics,
) -> Result<ScoreFile> {
    let mut r = Reader::new(data);
    let header = blocks::read_header(&mut r, diag)?;
    let staves_per_system = header.staves_per_system.max(0) as usize;

    let mut score = ScoreFile {
        header,
        title: Title::default(),
        free_text: FreeText::default(),
        instruments: Vec::new(),
        systems: Vec::new(),
        measures: Vec::new(),
        elements: Vec::new(),
    };
    // Width of title strings follows the last instrument block seen.
    let mut char_width = CharWidth::OneByte;

    while let Some(found) = next_block(&mut r, diag) {
        // A tag with no room left for its size is a desync tail, not a block.
        if r.remaining() < 4 {
            diag.report(Diagnostic::Resync {
                from: found.offset,
                to: r.len(),
            });
            r.skip(r.remaining());
            break;
        }
        let size = r.read_u32()?;
        diag.report(Diagnostic::Block {
            offset: found.offset,
            tag: found.tag.to_string(),
            size,
        });

        match found.tag {
            BlockTag::Line => {
                let system = blocks::read_system(&mut r, diag, size, staves_per_system)?;
                score.systems.push(system);
            }
            BlockTag::Measure => measure::read_measure(&mut r, diag, size, &mut score)?,
            BlockTag::Text => {
                score.free_text = blocks::read_free_text(&mut r, diag, size)?;
            }
            BlockTag::Title => {
                score.title = blocks::read_title(&mut r, diag, size, char_width)?;
            }
            BlockTag::Instrument(number) => {
                let instrument = blocks::read_instrument(&mut r, diag, size, number)?;
                char_width = instrument.char_width();
                score.instruments.push(instrument);
            }
        }
    }

    fixup_instruments(&mut score, diag);
    count_staves(&mut score);
    if options.synthesize_spanner_ends {
        connector::synthesize_spanner_ends(&mut score, diag);
    }

    log::debug!(
        "decoded {} instruments, {} systems, {} measures, {} elements",
        score.instruments.len(),
        score.systems.len(),
        score.measures.len(),
        score.elements.len()
    );
    Ok(score)
}

// ─── Fixups ──────────────────────────────────────────────────────────

/// Files without `TKnn` blocks get one "Part N" per instrument in the header.
fn fixup_instruments(score: &mut ScoreFile, diag: &mut dyn Diagnostics) {
    if !score.instruments.is_empty() {
        return;
    }
    let count = score.header.instrument_count.max(0) as usize;
    score.instruments = (0..count)
        .map(|i| Instrument {
            name: format!("Part {}", i + 1),
            tag_number: None,
            block_size: 0,
            staff_count: 0,
        })
        .collect();
    diag.report(Diagnostic::MissingInstruments { synthesized: count });
}

/// Count each instrument's staves in the first system; every system shares
/// one staff layout.
fn count_staves(score: &mut ScoreFile) {
    let staves: &[StaffEntry] = score
        .systems
        .first()
        .map(|s| s.staves.as_slice())
        .unwrap_or(&[]);
    for (i, instrument) in score.instruments.iter_mut().enumerate() {
        instrument.staff_count = staves.iter().filter(|s| s.instrument_index() == i).count();
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Skip `n` bytes; negative counts skip nothing, and a skip that would run
/// past the end of the buffer is cut short and reported.
pub(crate) fn skip(r: &mut Reader<'_>, diag: &mut dyn Diagnostics, n: i64) {
    if n <= 0 {
        return;
    }
    let requested = n as usize;
    let offset = r.position();
    let available = r.skip(requested);
    if available < requested {
        diag.report(Diagnostic::SkipClamped {
            offset,
            requested,
            available,
        });
    }
}

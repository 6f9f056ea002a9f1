//! `MEAS` blocks: measure metadata and the element stream.

use super::{blocks::utf16le_until_nul, skip};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{DecodeError, Result};
use crate::model::*;
use crate::reader::Reader;

/// Tick value that ends a measure's element stream.
const END_OF_ELEMENTS: u16 = 0xFFFF;
/// Bytes of fixed measure fields after the block size.
const MEASURE_FIXED_SIZE: i64 = 59 - 5;
/// Bytes of chord name (18 two-byte characters) when the chord has one.
const CHORD_NAME_SIZE: usize = 2 * 18;

/// Read one `MEAS` block and append the measure and its elements to `score`.
pub(crate) fn read_measure(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    size: u32,
    score: &mut ScoreFile,
) -> Result<()> {
    let index = score.measures.len();
    let start = r.position();
    let bpm = r.read_u16()?;
    let time_sig_glyph = r.read_u8()?;
    skip(r, diag, 1);
    let beat_ticks = r.read_u16()?;
    let duration_ticks = r.read_u16()?;
    let beats = r.read_u8()?;
    let beat_type = r.read_u8()?;
    skip(r, diag, 2);
    let bar_start = BarStyle::from_code(r.read_u8()?);
    let bar_end = BarStyle::from_code(r.read_u8()?);
    let repeat_marker = r.read_u8()?;
    let repeat_alternative = r.read_u8()?;
    skip(r, diag, 9);
    let end_signal = r.read_u32()?;
    skip(r, diag, MEASURE_FIXED_SIZE - (r.position() - start) as i64);

    score.measures.push(Measure {
        block_size: size,
        bpm,
        time_sig_glyph,
        beat_ticks,
        duration_ticks,
        time_signature: TimeSignature { beats, beat_type },
        bar_start,
        bar_end,
        repeat_marker,
        repeat_alternative,
        end_signal,
        elements: Vec::new(),
    });

    let mut element_bytes: i64 = 0;
    let mut tick = r.read_u16()?;
    while tick != END_OF_ELEMENTS {
        let type_voice_offset = r.position();
        let type_voice = r.read_u8()?;
        // The terminator sometimes lands one byte late, in the type/voice
        // byte and the byte after it.
        if type_voice == 0xFF {
            skip(r, diag, 1);
            diag.report(Diagnostic::AnomalousTerminator {
                offset: type_voice_offset,
                measure: index,
            });
            break;
        }

        let (element, registered) = read_element(r, diag, tick, type_voice, type_voice_offset)?;
        element_bytes += element.size as i64;
        if registered {
            score.push_element(index, element);
        }
        tick = r.read_u16()?;
    }

    skip(r, diag, size as i64 - element_bytes - 4);
    Ok(())
}

/// Decode one element record whose tick and type/voice byte have already
/// been read. Returns the element and whether it belongs in the measure.
fn read_element(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    tick: u16,
    type_voice: u8,
    type_voice_offset: usize,
) -> Result<(MeasureElement, bool)> {
    let type_code = type_voice >> 4;
    let voice = type_voice & 0x0F;
    if type_code > 11 {
        return Err(DecodeError::UnknownElementType {
            type_code,
            offset: type_voice_offset,
        });
    }
    let size = r.read_u8()?;
    let staff = r.read_u8()? & 0x3F;
    // Offsets below count from the tick; 5 bytes are consumed here.
    let record = size as i64;

    let mut x_offset = 0;
    let kind = match type_code {
        0 => {
            skip(r, diag, record - 5);
            ElementKind::Unknown(0)
        }
        1 => {
            skip(r, diag, record - 5);
            ElementKind::Clef
        }
        2 => {
            let key = r.read_u8()?;
            skip(r, diag, record - 6);
            ElementKind::KeyChange(KeyChange { key })
        }
        3 => {
            skip(r, diag, 5);
            x_offset = r.read_u8()?;
            skip(r, diag, record - 11);
            ElementKind::Tie
        }
        4 => {
            skip(r, diag, record - 5);
            x_offset = 255;
            ElementKind::Beam
        }
        5 => {
            let (ornament, x) = read_ornament(r, diag, record)?;
            x_offset = x;
            ElementKind::Ornament(ornament)
        }
        6 => {
            skip(r, diag, record - 5);
            ElementKind::Lyric
        }
        7 => {
            let (chord, x) = read_chord(r, diag, record)?;
            x_offset = x;
            ElementKind::Chord(chord)
        }
        8 => {
            let face_value = r.read_u8()?;
            skip(r, diag, 4);
            x_offset = r.read_u8()?;
            skip(r, diag, 2);
            let tuplet = r.read_u8()?;
            let dot_control = r.read_u8()?;
            skip(r, diag, record - 15);
            ElementKind::Rest(Rest {
                face_value,
                tuplet,
                dot_control,
            })
        }
        9 => {
            let (note, x) = read_note(r, diag, record)?;
            x_offset = x;
            ElementKind::Note(note)
        }
        _ => {
            skip(r, diag, record - 5);
            ElementKind::Unknown(type_code)
        }
    };

    let element = MeasureElement {
        tick,
        voice,
        staff,
        x_offset,
        size,
        kind,
    };
    Ok((element, type_code != 0))
}

// ─── Note ────────────────────────────────────────────────────────────

fn read_note(r: &mut Reader<'_>, diag: &mut dyn Diagnostics, record: i64) -> Result<(Note, u8)> {
    let face_value = r.read_u8()?;
    let grace1 = r.read_u8()?;
    let grace2 = r.read_u8()?;
    skip(r, diag, 2);
    let x_offset = r.read_u8()?;
    skip(r, diag, 1);
    let position = r.read_i8()?;
    let tuplet = r.read_u8()?;
    let dot_control = r.read_u8()?;
    let pitch = r.read_u8()?;
    let playback_ticks = r.read_u16()?;
    skip(r, diag, 1);
    let velocity = r.read_u8()?;
    let options = r.read_u8()?;
    let accidental_glyph = r.read_u8()?;
    skip(r, diag, 2);
    let articulation_up = r.read_u8()?;
    skip(r, diag, 1);
    let articulation_down = r.read_u8()?;
    skip(r, diag, record - 27);

    let note = Note {
        face_value,
        grace1,
        grace2,
        position,
        tuplet,
        dot_control,
        pitch,
        playback_ticks,
        velocity,
        options,
        accidental_glyph,
        articulation_up,
        articulation_down,
    };
    Ok((note, x_offset))
}

// ─── Ornament ────────────────────────────────────────────────────────

fn read_ornament(
    r: &mut Reader<'_>,
    diag: &mut dyn Diagnostics,
    record: i64,
) -> Result<(Ornament, u8)> {
    let code = r.read_u8()?;
    skip(r, diag, 4);
    let x_offset = r.read_u8()?;
    skip(r, diag, 7);
    let relative_measures = r.read_u8()?;
    skip(r, diag, 1);
    let partner_x = r.read_u8()?;
    skip(r, diag, 5);
    let mirror = r.read_u8()? & 3;
    skip(r, diag, 1);
    let note = r.read_u8()?;
    skip(r, diag, 1);
    let tempo = r.read_u8()?;
    skip(r, diag, 1);
    let text_index = r.read_u8()?;
    skip(r, diag, record - 33);

    let ornament = Ornament {
        code,
        relative_measures,
        partner_x,
        mirror,
        note,
        tempo,
        text_index,
        synthesized: false,
    };
    Ok((ornament, x_offset))
}

// ─── Chord ───────────────────────────────────────────────────────────

fn read_chord(r: &mut Reader<'_>, diag: &mut dyn Diagnostics, record: i64) -> Result<(Chord, u8)> {
    let tonic = r.read_u8()?;
    let flags = r.read_u8()?;
    skip(r, diag, 3);
    let x_offset = r.read_u8()?;
    skip(r, diag, 1);
    let root = r.read_u8()?;
    let bass = r.read_u8()?;

    let name = if flags & 1 != 0 {
        let text = utf16le_until_nul(r.read_bytes(CHORD_NAME_SIZE)?);
        skip(r, diag, record - 14 - CHORD_NAME_SIZE as i64);
        Some(text)
    } else {
        skip(r, diag, record - 14);
        None
    };

    let chord = Chord {
        tonic,
        flags,
        root,
        bass,
        name,
    };
    Ok((chord, x_offset))
}

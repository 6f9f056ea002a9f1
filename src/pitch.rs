//! Key signatures, pitch spelling and clef signs.

use serde::{Deserialize, Serialize};

use crate::model::{Accidental, ClefKind};

/// Fifths for key codes 0–14: C F B♭ E♭ A♭ D♭ G♭ C♭ G D A E B F♯ C♯.
const KEY_FIFTHS: [i8; 15] = [0, -1, -2, -3, -4, -5, -6, -7, 1, 2, 3, 4, 5, 6, 7];

const NOTE_STEPS: [char; 12] = ['C', 'C', 'D', 'D', 'E', 'F', 'F', 'G', 'G', 'A', 'A', 'B'];
const NOTE_ALTERS: [i8; 12] = [0, 1, 0, 1, 0, 0, 1, 0, 1, 0, 1, 0];

/// Signed fifths count of a key code, `None` for codes beyond 14.
pub fn key_to_fifths(key: u8) -> Option<i8> {
    KEY_FIFTHS.get(key as usize).copied()
}

/// A spelled pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pitch {
    /// Step name (C, D, E, F, G, A, B)
    pub step: char,
    /// Chromatic alteration: -1 flat, 0 natural, 1 sharp
    pub alter: i8,
    /// Octave number (4 = middle C octave)
    pub octave: i8,
}

/// Spell a semitone pitch (60 = C4).
///
/// An explicit flat always spells flat. A black-key pitch without an
/// accidental spells flat in flat keys and sharp otherwise; everything else
/// uses the sharp table. The accidental of an earlier note in the measure is
/// not carried over, so a repeated flat written once is spelled sharp on its
/// second occurrence.
pub fn spell_pitch(pitch: u8, accidental: Accidental, fifths: i8) -> Pitch {
    let p = pitch as usize;
    let flat = accidental == Accidental::Flat
        || (NOTE_ALTERS[p % 12] != 0 && accidental == Accidental::None && fifths < 0);
    if flat {
        Pitch {
            step: NOTE_STEPS[(p + 1) % 12],
            alter: -1,
            octave: ((p + 1) / 12) as i8 - 1,
        }
    } else {
        Pitch {
            step: NOTE_STEPS[p % 12],
            alter: NOTE_ALTERS[p % 12],
            octave: (p / 12) as i8 - 1,
        }
    }
}

/// Sign, staff line and octave transposition of a clef.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClefSign {
    pub sign: &'static str,
    pub line: u8,
    pub octave_change: i8,
}

/// Clef sign for a clef kind; `None` for alias and unknown clefs.
pub fn clef_sign(clef: ClefKind) -> Option<ClefSign> {
    let (sign, line, octave_change) = match clef {
        ClefKind::Treble => ("G", 2, 0),
        ClefKind::Bass => ("F", 4, 0),
        ClefKind::Alto => ("C", 3, 0),
        ClefKind::Tenor => ("C", 4, 0),
        ClefKind::TrebleOctaveUp => ("G", 2, 1),
        ClefKind::TrebleOctaveDown => ("G", 2, -1),
        ClefKind::BassOctaveDown => ("F", 4, -1),
        ClefKind::Percussion => ("percussion", 2, 0),
        ClefKind::Tab => ("TAB", 5, 0),
        ClefKind::Alias | ClefKind::Unknown(_) => return None,
    };
    Some(ClefSign {
        sign,
        line,
        octave_change,
    })
}

//! Data model for a decoded Encore score.
//!
//! Measure elements live in one flat arena on [`ScoreFile`]; measures refer
//! to them by [`ElementId`], and so does everything derived from the score
//! (the connector's slur/wedge maps, the query layer). Handles are plain
//! indices, so derived data never borrows from or owns the model.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reader::Endian;

/// A complete decoded Encore file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreFile {
    /// File header (`SCOW` / `SCO5` block)
    pub header: Header,
    /// Title page texts (`TITL` block); empty if the file has none
    pub title: Title,
    /// Free text items (`TEXT` block); empty if the file has none
    pub free_text: FreeText,
    /// Instruments in file order
    pub instruments: Vec<Instrument>,
    /// Systems (printed lines) in file order
    pub systems: Vec<System>,
    /// Measures in file order
    pub measures: Vec<Measure>,
    /// Storage for every measure element, addressed by [`ElementId`]
    pub elements: Vec<MeasureElement>,
}

/// Handle of a measure element inside [`ScoreFile::elements`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The file-identifying magic, which also fixes the byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileMagic {
    /// `SCOW`: little-endian
    Scow,
    /// `SCO5`: big-endian revision with unreliable ornament fields
    Sco5,
}

impl FileMagic {
    pub fn from_tag(tag: &[u8; 4]) -> Option<Self> {
        match tag {
            b"SCOW" => Some(FileMagic::Scow),
            b"SCO5" => Some(FileMagic::Sco5),
            _ => None,
        }
    }

    pub fn endian(self) -> Endian {
        match self {
            FileMagic::Scow => Endian::Little,
            FileMagic::Sco5 => Endian::Big,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileMagic::Scow => "SCOW",
            FileMagic::Sco5 => "SCO5",
        }
    }
}

/// Fixed-size file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub magic: FileMagic,
    /// Format code (byte following the magic)
    pub format_code: u8,
    /// Format version
    pub version: u16,
    /// Two header words of unknown meaning, kept for analysis output
    pub unknown1: u16,
    pub unknown2: u16,
    /// Number of systems
    pub system_count: i16,
    /// Number of pages
    pub page_count: i16,
    /// Number of instruments
    pub instrument_count: i8,
    /// Staves per system; sizes the per-staff arrays in every system
    pub staves_per_system: i8,
    /// Number of measures
    pub measure_count: i16,
}

impl Header {
    pub fn endian(&self) -> Endian {
        self.magic.endian()
    }

    /// Whether this file belongs to the revision whose ornament fields are
    /// frequently zeroed.
    pub fn has_unreliable_ornaments(&self) -> bool {
        self.magic == FileMagic::Sco5
    }
}

/// Texts of the title page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Title {
    pub title: String,
    pub subtitles: Vec<String>,
    pub instructions: Vec<String>,
    pub authors: Vec<String>,
    pub headers: Vec<String>,
    pub footers: Vec<String>,
    pub copyrights: Vec<String>,
}

/// Free text items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreeText {
    pub texts: Vec<String>,
}

/// Character width of strings in instrument and title blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CharWidth {
    #[default]
    OneByte,
    TwoBytes,
}

/// An instrument (part).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Display name; "Part N" when the file has no instrument blocks
    pub name: String,
    /// Number from the `TKnn` tag, `None` for synthesized instruments
    pub tag_number: Option<u8>,
    /// Declared block length (low 16 bits of the size field)
    pub block_size: u32,
    /// Staves owned by this instrument, counted after decoding
    pub staff_count: usize,
}

impl Instrument {
    pub fn char_width(&self) -> CharWidth {
        if self.block_size > 250 {
            CharWidth::TwoBytes
        } else {
            CharWidth::OneByte
        }
    }
}

/// One system ("line") of the printed score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    /// Index of the first measure on this system
    pub start_measure: u16,
    /// Number of measures on this system
    pub measure_count: u8,
    /// One entry per staff, `staves_per_system` long
    pub staves: Vec<StaffEntry>,
}

impl System {
    /// Whether measure `index` is laid out on this system.
    pub fn contains_measure(&self, index: usize) -> bool {
        let start = self.start_measure as usize;
        index >= start && index < start + self.measure_count as usize
    }
}

/// Per-staff metadata of a system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffEntry {
    pub clef: ClefKind,
    /// Key signature code 0–14, see [`crate::pitch::key_to_fifths`]
    pub key: u8,
    pub page: u8,
    pub kind: StaffKind,
    /// Owning instrument (high nibble) and staff within it (low nibble)
    pub instrument_staff: u8,
}

impl StaffEntry {
    pub fn instrument_index(&self) -> usize {
        (self.instrument_staff >> 4) as usize
    }

    pub fn staff_in_instrument(&self) -> usize {
        (self.instrument_staff & 0x0F) as usize
    }
}

/// Clef of a staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClefKind {
    Alias,
    Treble,
    Bass,
    /// C clef on the third line
    Alto,
    /// C clef on the fourth line
    Tenor,
    /// G clef an octave up
    TrebleOctaveUp,
    /// G clef an octave down
    TrebleOctaveDown,
    /// F clef an octave down
    BassOctaveDown,
    Percussion,
    Tab,
    Unknown(i8),
}

impl ClefKind {
    pub fn from_code(code: i8) -> Self {
        match code {
            -1 => ClefKind::Alias,
            0 => ClefKind::Treble,
            1 => ClefKind::Bass,
            2 => ClefKind::Alto,
            3 => ClefKind::Tenor,
            4 => ClefKind::TrebleOctaveUp,
            5 => ClefKind::TrebleOctaveDown,
            6 => ClefKind::BassOctaveDown,
            7 => ClefKind::Percussion,
            8 => ClefKind::Tab,
            other => ClefKind::Unknown(other),
        }
    }
}

/// Kind of a staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaffKind {
    Melody,
    Tablature,
    Rhythm,
    Unknown(u8),
}

impl StaffKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => StaffKind::Melody,
            1 => StaffKind::Tablature,
            2 => StaffKind::Rhythm,
            other => StaffKind::Unknown(other),
        }
    }
}

/// A single measure (bar) and its elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// Declared block size
    pub block_size: u32,
    /// Tempo in beats per minute
    pub bpm: u16,
    pub time_sig_glyph: u8,
    pub beat_ticks: u16,
    pub duration_ticks: u16,
    pub time_signature: TimeSignature,
    pub bar_start: BarStyle,
    pub bar_end: BarStyle,
    pub repeat_marker: u8,
    /// One bit per repeat pass on which this measure is played
    pub repeat_alternative: u8,
    /// End-of-measure signal; bits 8..15 carry the jump marker
    pub end_signal: u32,
    /// Elements in file order (synthesized spanner ends are appended)
    pub elements: Vec<ElementId>,
}

impl Measure {
    pub fn jump_marker(&self) -> JumpMarker {
        JumpMarker::from_code(((self.end_signal >> 8) & 0xFF) as u8)
    }

    /// Whether this measure belongs to the alternative ending played on
    /// (1-based) `pass`. Measures outside any alternative play on every pass.
    pub fn plays_on_pass(&self, pass: u32) -> bool {
        if self.repeat_alternative == 0 {
            return true;
        }
        pass >= 1 && pass <= 8 && self.repeat_alternative & (1 << (pass - 1)) != 0
    }

    /// Passes (1-based) encoded by the repeat-alternative bitmask.
    pub fn ending_passes(&self) -> Vec<u32> {
        (0..8)
            .filter(|bit| self.repeat_alternative & (1 << bit) != 0)
            .map(|bit| bit + 1)
            .collect()
    }

    /// Ending number text such as "1" or "1, 2"; at most four passes
    /// are printed.
    pub fn ending_number(&self) -> String {
        self.ending_passes()
            .into_iter()
            .filter(|&p| p <= 4)
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Numerator (e.g., 3 in 3/4)
    pub beats: u8,
    /// Denominator (e.g., 4 in 3/4)
    pub beat_type: u8,
}

/// Bar line style at the start or end of a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarStyle {
    Normal,
    RepeatStart,
    DoubleLeft,
    RepeatEnd,
    Final,
    DoubleRight,
    Other(u8),
}

impl BarStyle {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => BarStyle::Normal,
            2 => BarStyle::RepeatStart,
            3 => BarStyle::DoubleLeft,
            4 => BarStyle::RepeatEnd,
            5 => BarStyle::Final,
            6 => BarStyle::DoubleRight,
            other => BarStyle::Other(other),
        }
    }
}

/// Navigation instruction signalled at the end of a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpMarker {
    None,
    DaCapoAlCoda,
    DalSegnoAlCoda,
    DaCapoAlFine,
    DalSegnoAlFine,
    DalSegno,
    Coda,
    Fine,
    DaCapo,
    Segno,
    Coda2,
    Other(u8),
}

impl JumpMarker {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => JumpMarker::None,
            0x80 => JumpMarker::DaCapoAlCoda,
            0x81 => JumpMarker::DalSegnoAlCoda,
            0x82 => JumpMarker::DaCapoAlFine,
            0x83 => JumpMarker::DalSegnoAlFine,
            0x84 => JumpMarker::DalSegno,
            0x85 => JumpMarker::Coda,
            0x86 => JumpMarker::Fine,
            0x87 => JumpMarker::DaCapo,
            0x88 => JumpMarker::Segno,
            0x89 => JumpMarker::Coda2,
            other => JumpMarker::Other(other),
        }
    }

    /// Printed instruction, empty for markers drawn as symbols.
    pub fn words(self) -> &'static str {
        match self {
            JumpMarker::DalSegno => "D.S.",
            JumpMarker::DaCapoAlCoda => "D.C. al Coda",
            JumpMarker::DaCapoAlFine => "D.C. al Fine",
            JumpMarker::DalSegnoAlCoda => "D.S. al Coda",
            JumpMarker::DalSegnoAlFine => "D.S. al Fine",
            JumpMarker::DaCapo => "D.C.",
            JumpMarker::Fine => "Fine",
            _ => "",
        }
    }

    pub fn is_coda(self) -> bool {
        matches!(self, JumpMarker::Coda | JumpMarker::Coda2)
    }

    pub fn is_segno(self) -> bool {
        self == JumpMarker::Segno
    }

    pub fn is_da_capo(self) -> bool {
        matches!(
            self,
            JumpMarker::DaCapo | JumpMarker::DaCapoAlCoda | JumpMarker::DaCapoAlFine
        )
    }

    pub fn is_dal_segno(self) -> bool {
        matches!(
            self,
            JumpMarker::DalSegno | JumpMarker::DalSegnoAlCoda | JumpMarker::DalSegnoAlFine
        )
    }
}

/// One record of a measure's element stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureElement {
    /// Nominal time position within the measure (not always reliable)
    pub tick: u16,
    /// Voice (low nibble of the type/voice byte)
    pub voice: u8,
    /// Staff index within the system
    pub staff: u8,
    /// Horizontal offset, used for all proximity matching
    pub x_offset: u8,
    /// Encoded record size in bytes, counted from the tick
    pub size: u8,
    pub kind: ElementKind,
}

impl MeasureElement {
    pub fn as_note(&self) -> Option<&Note> {
        match &self.kind {
            ElementKind::Note(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_rest(&self) -> Option<&Rest> {
        match &self.kind {
            ElementKind::Rest(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_ornament(&self) -> Option<&Ornament> {
        match &self.kind {
            ElementKind::Ornament(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self.kind, ElementKind::Note(_))
    }

    pub fn is_tie(&self) -> bool {
        matches!(self.kind, ElementKind::Tie)
    }

    /// Same voice and staff as `other`.
    pub fn same_line(&self, other: &MeasureElement) -> bool {
        self.voice == other.voice && self.staff == other.staff
    }
}

/// Element payload, selected by the record's type nibble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElementKind {
    Clef,
    KeyChange(KeyChange),
    Tie,
    Beam,
    Ornament(Ornament),
    Lyric,
    Chord(Chord),
    Rest(Rest),
    Note(Note),
    /// Type codes 10 and 11: layout unknown, record skipped
    Unknown(u8),
}

/// A key signature change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeyChange {
    /// Key signature code 0–14
    pub key: u8,
}

/// A note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Face value; the low nibble is the duration code (1 = whole … 8 = 128th)
    pub face_value: u8,
    /// Grace bit-fields G1 and G2
    pub grace1: u8,
    pub grace2: u8,
    /// Vertical staff position
    pub position: i8,
    /// Tuplet ratio: actual notes (high nibble), normal notes (low nibble)
    pub tuplet: u8,
    /// Dot count in the low two bits
    pub dot_control: u8,
    /// Sounding pitch, MIDI numbering (60 = C4)
    pub pitch: u8,
    pub playback_ticks: u16,
    pub velocity: u8,
    pub options: u8,
    /// Explicit accidental glyph code
    pub accidental_glyph: u8,
    pub articulation_up: u8,
    pub articulation_down: u8,
}

impl Note {
    pub fn duration_code(&self) -> u8 {
        self.face_value & 0x0F
    }

    pub fn dots(&self) -> u8 {
        self.dot_control & 3
    }

    pub fn actual_notes(&self) -> u8 {
        self.tuplet >> 4
    }

    pub fn normal_notes(&self) -> u8 {
        self.tuplet & 0x0F
    }

    pub fn accidental(&self) -> Accidental {
        Accidental::from_code(self.accidental_glyph)
    }

    /// Grace classification from the two grace bit-fields.
    pub fn grace(&self) -> GraceType {
        GraceType::classify(self.grace1, self.grace2)
    }

    pub fn is_grace(&self) -> bool {
        self.grace() != GraceType::Normal
    }

    /// Duration in ticks (240 per quarter), zero for grace notes.
    pub fn playable_ticks(&self) -> u32 {
        if self.is_grace() {
            return 0;
        }
        crate::duration::playable_ticks(
            self.duration_code(),
            self.dots(),
            self.actual_notes(),
            self.normal_notes(),
        )
    }
}

/// A rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rest {
    pub face_value: u8,
    pub tuplet: u8,
    pub dot_control: u8,
}

impl Rest {
    pub fn duration_code(&self) -> u8 {
        self.face_value & 0x0F
    }

    pub fn dots(&self) -> u8 {
        self.dot_control & 3
    }

    pub fn actual_notes(&self) -> u8 {
        self.tuplet >> 4
    }

    pub fn normal_notes(&self) -> u8 {
        self.tuplet & 0x0F
    }

    pub fn playable_ticks(&self) -> u32 {
        crate::duration::playable_ticks(
            self.duration_code(),
            self.dots(),
            self.actual_notes(),
            self.normal_notes(),
        )
    }
}

/// An ornament: spanners (slurs, wedges) and other decorations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ornament {
    /// Raw ornament type code
    pub code: u8,
    /// Measures between this ornament and its partner
    pub relative_measures: u8,
    /// Horizontal offset of the partner
    pub partner_x: u8,
    /// Mirror flags (low two bits); bit 0 turns a crescendo into a diminuendo
    pub mirror: u8,
    pub note: u8,
    pub tempo: u8,
    pub text_index: u8,
    /// Created by spanner-end synthesis rather than read from the file
    pub synthesized: bool,
}

pub const ORNAMENT_WEDGE_START: u8 = 0x1D;
pub const ORNAMENT_STAFF_TEXT: u8 = 0x1E;
pub const ORNAMENT_SLUR_START: u8 = 0x21;
pub const ORNAMENT_TEMPO: u8 = 0x32;
pub const ORNAMENT_SLUR_STOP: u8 = 0x41;
pub const ORNAMENT_WEDGE_STOP: u8 = 0x4D;

impl Ornament {
    pub fn kind(&self) -> OrnamentKind {
        match self.code {
            ORNAMENT_SLUR_START => OrnamentKind::SlurStart,
            ORNAMENT_SLUR_STOP => OrnamentKind::SlurStop,
            ORNAMENT_WEDGE_START if self.mirror & 0x01 != 0 => OrnamentKind::DiminuendoStart,
            ORNAMENT_WEDGE_START => OrnamentKind::CrescendoStart,
            ORNAMENT_WEDGE_STOP => OrnamentKind::WedgeStop,
            ORNAMENT_STAFF_TEXT => OrnamentKind::StaffText,
            ORNAMENT_TEMPO => OrnamentKind::Tempo,
            other => OrnamentKind::Decoration(other),
        }
    }

    pub fn is_slur_start(&self) -> bool {
        self.code == ORNAMENT_SLUR_START
    }

    pub fn is_wedge_start(&self) -> bool {
        self.code == ORNAMENT_WEDGE_START
    }
}

/// Classified ornament type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrnamentKind {
    SlurStart,
    SlurStop,
    CrescendoStart,
    DiminuendoStart,
    WedgeStop,
    StaffText,
    Tempo,
    Decoration(u8),
}

/// A chord symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chord {
    pub tonic: u8,
    /// Bit 0: a chord name follows; bit 1: slash chord with bass
    pub flags: u8,
    /// Root step (low nibble) and alteration (high nibble)
    pub root: u8,
    /// Bass step (low nibble) and alteration (high nibble)
    pub bass: u8,
    /// Chord name, present only when flag bit 0 is set
    pub name: Option<String>,
}

impl Chord {
    pub fn has_bass(&self) -> bool {
        self.flags & 0x02 != 0
    }
}

/// Grace note classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraceType {
    Normal,
    Acciaccatura,
    Appoggiatura,
}

impl GraceType {
    /// Classify from the raw grace bit-fields.
    pub fn classify(grace1: u8, grace2: u8) -> Self {
        let g1 = grace1 & 0x30;
        let g2 = grace2 & 0x05;
        if g1 == 0x20 && g2 == 0x04 {
            GraceType::Acciaccatura
        } else if g1 > 0x10 && g2 != 0x01 {
            GraceType::Appoggiatura
        } else {
            GraceType::Normal
        }
    }
}

/// Explicit accidental glyph on a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accidental {
    None,
    Sharp,
    Flat,
    Natural,
    Other(u8),
}

impl Accidental {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Accidental::None,
            1 => Accidental::Sharp,
            2 => Accidental::Flat,
            3 => Accidental::Natural,
            other => Accidental::Other(other),
        }
    }
}

impl ScoreFile {
    pub fn element(&self, id: ElementId) -> Option<&MeasureElement> {
        self.elements.get(id.0)
    }

    pub fn note(&self, id: ElementId) -> Option<&Note> {
        self.element(id).and_then(MeasureElement::as_note)
    }

    /// Elements of measure `index` in file order, with their handles.
    pub fn measure_elements(
        &self,
        index: usize,
    ) -> impl Iterator<Item = (ElementId, &MeasureElement)> + '_ {
        self.measures
            .get(index)
            .map(|m| m.elements.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |&id| self.element(id).map(|e| (id, e)))
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    /// Store `element` and append it to measure `measure`.
    pub(crate) fn push_element(&mut self, measure: usize, element: MeasureElement) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(element);
        if let Some(m) = self.measures.get_mut(measure) {
            m.elements.push(id);
        }
        id
    }
}

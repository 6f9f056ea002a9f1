//! Synthetic Encore file builder shared by the integration tests.
//!
//! Emits the same byte layouts the decoder reads, in either byte order, so
//! the suites need no binary fixtures.

#![allow(dead_code)]

pub const QUARTER: u8 = 3;
pub const EIGHTH: u8 = 4;

/// Builds an Encore buffer block by block.
pub struct EncBuilder {
    big_endian: bool,
    systems: i16,
    pages: i16,
    instruments: i8,
    staves_per_system: i8,
    measures: i16,
    blocks: Vec<u8>,
}

impl EncBuilder {
    /// `SCOW` file (little-endian).
    pub fn little() -> Self {
        Self::new(false)
    }

    /// `SCO5` file (big-endian).
    pub fn big() -> Self {
        Self::new(true)
    }

    fn new(big_endian: bool) -> Self {
        Self {
            big_endian,
            systems: 1,
            pages: 1,
            instruments: 1,
            staves_per_system: 1,
            measures: 1,
            blocks: Vec::new(),
        }
    }

    /// Header counts.
    pub fn counts(mut self, systems: i16, instruments: i8, staves_per_system: i8, measures: i16) -> Self {
        self.systems = systems;
        self.instruments = instruments;
        self.staves_per_system = staves_per_system;
        self.measures = measures;
        self
    }

    fn u16(&self, v: u16) -> [u8; 2] {
        if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn u32(&self, v: u32) -> [u8; 4] {
        if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn block(mut self, tag: &[u8; 4], size: u32, content: &[u8]) -> Self {
        let size = self.u32(size);
        self.blocks.extend_from_slice(tag);
        self.blocks.extend_from_slice(&size);
        self.blocks.extend_from_slice(content);
        self
    }

    /// Bytes that are not a block, e.g. garbage the scanner must pass over.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.blocks.extend_from_slice(bytes);
        self
    }

    /// `TKnn` block with a one-byte character name.
    pub fn instrument(self, number: u8, name: &str) -> Self {
        let mut content: Vec<u8> = name.bytes().collect();
        content.push(0);
        let tag = [b'T', b'K', b'0' + number / 10, b'0' + number % 10];
        let size = content.len() as u32 + 8;
        self.block(&tag, size, &content)
    }

    /// `TITL` block with one-byte characters; remaining items are empty.
    pub fn title(self, title: &str, subtitle: &str, author: &str) -> Self {
        let mut content = vec![0u8; 2];
        for item in 0..20 {
            let text = match item {
                0 => title,
                1 => subtitle,
                6 => author,
                _ => "",
            };
            let mut field = vec![0u8; 30 + 66];
            field[30..30 + text.len()].copy_from_slice(text.as_bytes());
            content.extend_from_slice(&field);
        }
        content.extend_from_slice(&[0u8; 504]);
        let size = content.len() as u32;
        self.block(b"TITL", size, &content)
    }

    /// `TEXT` block.
    pub fn text(self, texts: &[&str]) -> Self {
        let mut content = vec![0u8; 2];
        content.extend_from_slice(&self.u16(texts.len() as u16));
        content.extend_from_slice(&[0u8; 4]);
        for text in texts {
            let mut body: Vec<u8> = text.bytes().collect();
            body.push(0);
            content.extend_from_slice(&self.u16(14 + body.len() as u16));
            content.extend_from_slice(&[0u8; 14]);
            content.extend_from_slice(&body);
        }
        let size = content.len() as u32;
        self.block(b"TEXT", size, &content)
    }

    /// `LINE` block.
    pub fn system(self, start_measure: u16, measure_count: u8, staves: &[Staff]) -> Self {
        let mut content = vec![0u8; 10];
        content.extend_from_slice(&self.u16(start_measure));
        content.push(measure_count);
        for staff in staves {
            let mut entry = [0u8; 30];
            entry[14] = staff.clef as u8;
            entry[15] = staff.key;
            entry[20] = staff.kind;
            entry[21] = staff.instrument_staff;
            content.extend_from_slice(&entry);
        }
        let size = content.len() as u32;
        self.block(b"LINE", size, &content)
    }

    /// `MEAS` block.
    pub fn measure(self, m: MeasureSpec) -> Self {
        let mut content = vec![0u8; 54];
        content[0..2].copy_from_slice(&self.u16(m.bpm));
        content[4..6].copy_from_slice(&self.u16(240));
        content[6..8].copy_from_slice(&self.u16(960));
        content[8] = m.beats;
        content[9] = m.beat_type;
        content[12] = m.bar_start;
        content[13] = m.bar_end;
        content[15] = m.repeat_alternative;
        content[25..29].copy_from_slice(&self.u32((m.jump_marker as u32) << 8));

        let mut element_bytes = 0u32;
        for element in &m.elements {
            element_bytes += element.size as u32;
            content.extend_from_slice(&element.encode(self.big_endian));
        }
        if m.early_terminator {
            content.extend_from_slice(&[0x00, 0x00, 0xFF, 0xFF]);
        } else {
            content.extend_from_slice(&[0xFF, 0xFF]);
        }
        self.block(b"MEAS", element_bytes + 4, &content)
    }

    pub fn build(self) -> Vec<u8> {
        let mut header = vec![0u8; 0xC2];
        header[0..4].copy_from_slice(if self.big_endian { b"SCO5" } else { b"SCOW" });
        header[0x28..0x2A].copy_from_slice(&self.u16(0x0100));
        header[0x2E..0x30].copy_from_slice(&self.u16(self.systems as u16));
        header[0x30..0x32].copy_from_slice(&self.u16(self.pages as u16));
        header[0x32] = self.instruments as u8;
        header[0x33] = self.staves_per_system as u8;
        header[0x34..0x36].copy_from_slice(&self.u16(self.measures as u16));
        header.extend_from_slice(&self.blocks);
        header
    }
}

/// One staff entry of a `LINE` block.
#[derive(Clone, Copy)]
pub struct Staff {
    pub clef: i8,
    pub key: u8,
    pub kind: u8,
    pub instrument_staff: u8,
}

/// Treble staff of instrument `instrument`.
pub fn staff(instrument: u8, key: u8) -> Staff {
    Staff {
        clef: 0,
        key,
        kind: 0,
        instrument_staff: instrument << 4,
    }
}

/// Contents of a `MEAS` block.
#[derive(Clone)]
pub struct MeasureSpec {
    pub bpm: u16,
    pub beats: u8,
    pub beat_type: u8,
    pub bar_start: u8,
    pub bar_end: u8,
    pub repeat_alternative: u8,
    pub jump_marker: u8,
    pub elements: Vec<Element>,
    pub early_terminator: bool,
}

/// A 4/4 measure at 120 BPM.
pub fn measure(elements: Vec<Element>) -> MeasureSpec {
    MeasureSpec {
        bpm: 120,
        beats: 4,
        beat_type: 4,
        bar_start: 0,
        bar_end: 0,
        repeat_alternative: 0,
        jump_marker: 0,
        elements,
        early_terminator: false,
    }
}

/// One element record.
#[derive(Clone)]
pub struct Element {
    tick: u16,
    type_voice: u8,
    size: u8,
    staff: u8,
    bytes: Vec<(usize, u8)>,
}

impl Element {
    fn new(type_code: u8, tick: u16, voice: u8, size: u8) -> Self {
        Self {
            tick,
            type_voice: (type_code << 4) | (voice & 0x0F),
            size,
            staff: 0,
            bytes: Vec::new(),
        }
    }

    pub fn staff(mut self, staff: u8) -> Self {
        self.staff = staff;
        self
    }

    /// Set the byte at `offset` (counted from the tick).
    pub fn set(mut self, offset: usize, value: u8) -> Self {
        self.bytes.push((offset, value));
        self
    }

    fn encode(&self, big_endian: bool) -> Vec<u8> {
        let mut out = vec![0u8; self.size as usize];
        let tick = if big_endian {
            self.tick.to_be_bytes()
        } else {
            self.tick.to_le_bytes()
        };
        out[0..2].copy_from_slice(&tick);
        out[2] = self.type_voice;
        out[3] = self.size;
        out[4] = self.staff;
        for &(offset, value) in &self.bytes {
            out[offset] = value;
        }
        out
    }
}

/// Quarter note with no accidental.
pub fn note(tick: u16, voice: u8, x: u8, pitch: u8) -> Element {
    Element::new(9, tick, voice, 28)
        .set(5, QUARTER)
        .set(10, x)
        .set(15, pitch)
}

pub fn rest(tick: u16, voice: u8, x: u8, face_value: u8) -> Element {
    Element::new(8, tick, voice, 16).set(5, face_value).set(10, x)
}

pub fn tie(tick: u16, voice: u8, x: u8) -> Element {
    Element::new(3, tick, voice, 12).set(10, x)
}

pub fn key_change(tick: u16, key: u8) -> Element {
    Element::new(2, tick, 0, 6).set(5, key)
}

pub fn ornament(tick: u16, voice: u8, x: u8, code: u8, relative: u8, partner_x: u8) -> Element {
    Element::new(5, tick, voice, 34)
        .set(5, code)
        .set(10, x)
        .set(18, relative)
        .set(20, partner_x)
}

pub fn slur(tick: u16, voice: u8, x: u8, relative: u8, partner_x: u8) -> Element {
    ornament(tick, voice, x, 0x21, relative, partner_x)
}

pub fn wedge(tick: u16, voice: u8, x: u8, relative: u8, partner_x: u8) -> Element {
    ornament(tick, voice, x, 0x1D, relative, partner_x)
}

/// Chord symbol; a name is stored as 18 two-byte characters.
pub fn chord(tick: u16, x: u8, name: Option<&str>) -> Element {
    match name {
        Some(name) => {
            let mut element = Element::new(7, tick, 0, 14 + 36).set(6, 1).set(10, x);
            for (i, unit) in name.encode_utf16().take(17).enumerate() {
                let [lo, hi] = unit.to_le_bytes();
                element = element.set(14 + 2 * i, lo).set(15 + 2 * i, hi);
            }
            element
        }
        None => Element::new(7, tick, 0, 14).set(10, x),
    }
}

//! Read-only query surface over a decoded score.
//!
//! [`DecodedScore`] pairs the [`ScoreFile`] with the [`Connector`] built
//! from it and answers everything a renderer asks about notes: ties, slurs,
//! wedges, directions, grace and duration, spelled pitch, voices and
//! reconstructed onsets.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::connector::Connector;
use crate::decoder::{self, DecodeOptions};
use crate::diagnostics::{Diagnostics, LogSink};
use crate::error::Result;
use crate::model::*;
use crate::pitch::{key_to_fifths, spell_pitch, Pitch};
use crate::tuplet::{TupletState, TupletTracker};

/// A decoded score together with its note connections.
#[derive(Debug, Clone)]
pub struct DecodedScore {
    score: ScoreFile,
    connector: Connector,
}

impl DecodedScore {
    /// Decode and connect `data` with default options, logging diagnostics.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_with(data, &DecodeOptions::default(), &mut LogSink)
    }

    pub fn decode_with(
        data: &[u8],
        options: &DecodeOptions,
        diag: &mut dyn Diagnostics,
    ) -> Result<Self> {
        let score = decoder::decode_with(data, options, diag)?;
        Ok(Self::from_score(score, options, diag))
    }

    /// Connect an already decoded score.
    pub fn from_score(score: ScoreFile, options: &DecodeOptions, diag: &mut dyn Diagnostics) -> Self {
        let connector = Connector::new(&score, options, diag);
        Self { score, connector }
    }

    pub fn score(&self) -> &ScoreFile {
        &self.score
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn into_score(self) -> ScoreFile {
        self.score
    }

    // ─── Enumeration ─────────────────────────────────────────────────

    pub fn instruments(&self) -> &[Instrument] {
        &self.score.instruments
    }

    pub fn systems(&self) -> &[System] {
        &self.score.systems
    }

    pub fn measures(&self) -> &[Measure] {
        &self.score.measures
    }

    /// Elements of measure `index` in file order.
    pub fn elements(&self, index: usize) -> impl Iterator<Item = (ElementId, &MeasureElement)> + '_ {
        self.score.measure_elements(index)
    }

    /// Notes of measure `index` in file order.
    pub fn notes(&self, index: usize) -> impl Iterator<Item = NoteView<'_>> + '_ {
        self.elements(index).filter_map(move |(id, _)| self.note(id))
    }

    /// View of the note `id`; `None` if `id` is not a note.
    pub fn note(&self, id: ElementId) -> Option<NoteView<'_>> {
        let element = self.score.element(id)?;
        let note = element.as_note()?;
        let measure = self.connector.measure_of(id)?;
        Some(NoteView {
            decoded: self,
            id,
            element,
            note,
            measure,
        })
    }

    /// The system that lays out measure `index`.
    pub fn system_for_measure(&self, index: usize) -> Option<&System> {
        self.score.systems.iter().find(|s| s.contains_measure(index))
    }

    /// Key signature code in force for `staff` in measure `index`.
    ///
    /// The key starts as the staff's key in the system covering the measure
    /// (else the first staff of the first system, else C major). Key changes
    /// on `staff` from the start of that system through measure `index`
    /// then override it in file order; the last one wins.
    pub fn key_code(&self, index: usize, staff: u8) -> u8 {
        let system = self.system_for_measure(index);
        let initial = system
            .and_then(|s| s.staves.get(staff as usize))
            .or_else(|| self.score.systems.first().and_then(|s| s.staves.first()))
            .map_or(0, |entry| entry.key);
        let from = system.map_or(0, |s| s.start_measure as usize);

        (from..=index)
            .flat_map(|m| self.elements(m))
            .filter(|(_, e)| e.staff == staff)
            .filter_map(|(_, e)| match &e.kind {
                ElementKind::KeyChange(k) => Some(k.key),
                _ => None,
            })
            .last()
            .unwrap_or(initial)
    }

    /// Fifths of the key in force for `staff` in measure `index`.
    pub fn key_fifths(&self, index: usize, staff: u8) -> i8 {
        key_to_fifths(self.key_code(index, staff)).unwrap_or(0)
    }

    // ─── Voices ──────────────────────────────────────────────────────

    /// Voices used on `staff` in measure `index`, ascending.
    pub fn voices(&self, index: usize, staff: u8) -> Vec<u8> {
        self.elements(index)
            .filter(|(_, e)| e.staff == staff)
            .map(|(_, e)| e.voice)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Notes and rests of one voice with reconstructed onsets.
    ///
    /// The stored ticks are not trusted: the voice starts at tick 0 and each
    /// event follows the previous one without gaps. A note on the same tick
    /// and x-offset as the note before it joins that note's chord and takes
    /// no time. Tuplet brackets are tracked per voice.
    pub fn voice_events(&self, index: usize, staff: u8, voice: u8) -> Vec<VoiceEvent> {
        let mut events: Vec<VoiceEvent> = Vec::new();
        let mut tuplets = TupletTracker::new();
        let mut onset: u32 = 0;
        let mut previous_note: Option<&MeasureElement> = None;

        for (id, element) in self.elements(index) {
            if element.staff != staff || element.voice != voice {
                continue;
            }
            match &element.kind {
                ElementKind::Note(note) => {
                    let chord = previous_note.is_some_and(|prev| notes_in_chord(prev, element));
                    let duration = if chord { 0 } else { note.playable_ticks() };
                    let start = if chord {
                        events.last().map_or(onset, |e| e.onset)
                    } else {
                        onset
                    };
                    events.push(VoiceEvent {
                        element: id,
                        onset: start,
                        duration,
                        chord,
                        tuplet: tuplets.next(
                            note.actual_notes(),
                            note.normal_notes(),
                            note.duration_code(),
                        ),
                    });
                    onset += duration;
                    previous_note = Some(element);
                }
                ElementKind::Rest(rest) => {
                    let duration = rest.playable_ticks();
                    events.push(VoiceEvent {
                        element: id,
                        onset,
                        duration,
                        chord: false,
                        tuplet: tuplets.next(
                            rest.actual_notes(),
                            rest.normal_notes(),
                            rest.duration_code(),
                        ),
                    });
                    onset += duration;
                    previous_note = None;
                }
                _ => {}
            }
        }
        events
    }

    /// Reconstructed onset of every note and rest on `staff` in measure
    /// `index`, keyed by element.
    pub fn onsets(&self, index: usize, staff: u8) -> HashMap<ElementId, u32> {
        self.voices(index, staff)
            .into_iter()
            .flat_map(|voice| self.voice_events(index, staff, voice))
            .map(|event| (event.element, event.onset))
            .collect()
    }

    // ─── Alternative endings ─────────────────────────────────────────

    /// Whether measure `index` opens an alternative ending.
    pub fn is_first_in_alternative_ending(&self, index: usize) -> bool {
        let measures = &self.score.measures;
        let Some(measure) = measures.get(index) else {
            return false;
        };
        let alternative = measure.repeat_alternative;
        if alternative == 0 {
            return false;
        }
        index == 0 || measures[index - 1].repeat_alternative != alternative
    }

    /// Whether measure `index` closes an alternative ending.
    pub fn is_last_in_alternative_ending(&self, index: usize) -> bool {
        let measures = &self.score.measures;
        let Some(measure) = measures.get(index) else {
            return false;
        };
        let alternative = measure.repeat_alternative;
        if alternative == 0 {
            return false;
        }
        measures
            .get(index + 1)
            .map_or(true, |next| next.repeat_alternative != alternative)
    }
}

/// Two notes sound as one chord iff they share tick and x-offset.
pub fn notes_in_chord(a: &MeasureElement, b: &MeasureElement) -> bool {
    a.is_note() && b.is_note() && a.tick == b.tick && a.x_offset == b.x_offset
}

/// A note or rest placed on its voice's reconstructed timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceEvent {
    pub element: ElementId,
    /// Start in ticks from the beginning of the measure
    pub onset: u32,
    /// Ticks the event advances the voice; zero for chord members
    pub duration: u32,
    /// Joins the chord of the preceding note
    pub chord: bool,
    pub tuplet: TupletState,
}

/// Read-only view of one note and everything connected to it.
#[derive(Debug, Clone, Copy)]
pub struct NoteView<'a> {
    decoded: &'a DecodedScore,
    id: ElementId,
    element: &'a MeasureElement,
    note: &'a Note,
    measure: usize,
}

impl<'a> NoteView<'a> {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn element(&self) -> &'a MeasureElement {
        self.element
    }

    pub fn note(&self) -> &'a Note {
        self.note
    }

    /// Index of the measure holding this note.
    pub fn measure(&self) -> usize {
        self.measure
    }

    pub fn tie_start(&self) -> bool {
        self.decoded.connector.tie_start(&self.decoded.score, self.id)
    }

    pub fn tie_stop(&self) -> bool {
        self.decoded.connector.tie_stop(&self.decoded.score, self.id)
    }

    pub fn slur_start(&self) -> Option<ElementId> {
        self.decoded.connector.slur_start(self.id)
    }

    pub fn slur_stop(&self) -> Option<ElementId> {
        self.decoded.connector.slur_stop(self.id)
    }

    pub fn wedge_start(&self) -> Option<ElementId> {
        self.decoded.connector.wedge_start(self.id)
    }

    pub fn wedge_stop(&self) -> Option<ElementId> {
        self.decoded.connector.wedge_stop(self.id)
    }

    /// Staff text or tempo ornament attached to this note.
    pub fn direction(&self) -> Option<ElementId> {
        self.decoded.connector.direction(&self.decoded.score, self.id)
    }

    pub fn grace(&self) -> GraceType {
        self.note.grace()
    }

    /// Playable duration in ticks, zero for grace notes.
    pub fn playable_ticks(&self) -> u32 {
        self.note.playable_ticks()
    }

    /// Note type name ("quarter", ...) of the nominal duration.
    pub fn type_name(&self) -> Option<&'static str> {
        crate::duration::face_value_name(self.note.duration_code())
    }

    /// Pitch spelled against the key in force on this note's staff.
    pub fn pitch(&self) -> Pitch {
        let fifths = self.decoded.key_fifths(self.measure, self.element.staff);
        spell_pitch(self.note.pitch, self.note.accidental(), fifths)
    }

    /// Other notes of this note's measure, voice and staff that share its
    /// chord, in file order (this note included).
    pub fn chord_notes(&self) -> Vec<ElementId> {
        self.decoded
            .elements(self.measure)
            .filter(|(_, e)| e.same_line(self.element) && notes_in_chord(e, self.element))
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;
    use pretty_assertions::assert_eq;

    fn measure(alternative: u8) -> Measure {
        Measure {
            block_size: 0,
            bpm: 120,
            time_sig_glyph: 0,
            beat_ticks: 240,
            duration_ticks: 960,
            time_signature: TimeSignature { beats: 4, beat_type: 4 },
            bar_start: BarStyle::Normal,
            bar_end: BarStyle::Normal,
            repeat_marker: 0,
            repeat_alternative: alternative,
            end_signal: 0,
            elements: Vec::new(),
        }
    }

    fn score(measures: Vec<Measure>, key: u8) -> ScoreFile {
        ScoreFile {
            header: Header {
                magic: FileMagic::Scow,
                format_code: 0,
                version: 0,
                unknown1: 0,
                unknown2: 0,
                system_count: 1,
                page_count: 1,
                instrument_count: 1,
                staves_per_system: 1,
                measure_count: measures.len() as i16,
            },
            title: Title::default(),
            free_text: FreeText::default(),
            instruments: Vec::new(),
            systems: vec![System {
                start_measure: 0,
                measure_count: measures.len() as u8,
                staves: vec![StaffEntry {
                    clef: ClefKind::Treble,
                    key,
                    page: 0,
                    kind: StaffKind::Melody,
                    instrument_staff: 0,
                }],
            }],
            measures,
            elements: Vec::new(),
        }
    }

    fn note(tick: u16, voice: u8, x: u8, code: u8, pitch: u8, tuplet: u8) -> MeasureElement {
        MeasureElement {
            tick,
            voice,
            staff: 0,
            x_offset: x,
            size: 30,
            kind: ElementKind::Note(Note {
                face_value: code,
                grace1: 0,
                grace2: 0,
                position: 0,
                tuplet,
                dot_control: 0,
                pitch,
                playback_ticks: 0,
                velocity: 64,
                options: 0,
                accidental_glyph: 0,
                articulation_up: 0,
                articulation_down: 0,
            }),
        }
    }

    fn rest(tick: u16, voice: u8, code: u8) -> MeasureElement {
        MeasureElement {
            tick,
            voice,
            staff: 0,
            x_offset: 0,
            size: 16,
            kind: ElementKind::Rest(Rest {
                face_value: code,
                tuplet: 0,
                dot_control: 0,
            }),
        }
    }

    fn decoded(score: ScoreFile) -> DecodedScore {
        DecodedScore::from_score(score, &DecodeOptions::default(), &mut NullSink)
    }

    #[test]
    fn onsets_ignore_stored_ticks_and_chords_take_no_time() {
        let mut s = score(vec![measure(0)], 0);
        let a = s.push_element(0, note(0, 0, 10, 3, 60, 0));
        let b = s.push_element(0, note(0, 0, 10, 3, 64, 0));
        // stored tick is off by a few ticks
        let c = s.push_element(0, note(243, 0, 30, 3, 62, 0));
        let r = s.push_element(0, rest(480, 0, 2));
        let d = decoded(s);

        let events = d.voice_events(0, 0, 0);
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.element, e.onset, e.duration, e.chord))
            .collect();
        assert_eq!(
            summary,
            vec![
                (a, 0, 240, false),
                (b, 0, 0, true),
                (c, 240, 240, false),
                (r, 480, 480, false),
            ]
        );
        assert_eq!(d.note(a).unwrap().chord_notes(), vec![a, b]);
    }

    #[test]
    fn voices_are_sorted_and_start_at_zero() {
        let mut s = score(vec![measure(0)], 0);
        s.push_element(0, note(0, 1, 10, 2, 55, 0));
        let upper = s.push_element(0, note(0, 0, 10, 2, 72, 0));
        let lower = s.push_element(0, note(480, 1, 50, 2, 57, 0));
        let d = decoded(s);

        assert_eq!(d.voices(0, 0), vec![0, 1]);
        let onsets = d.onsets(0, 0);
        assert_eq!(onsets[&upper], 0);
        assert_eq!(onsets[&lower], 480);
    }

    #[test]
    fn triplet_brackets_per_voice() {
        let mut s = score(vec![measure(0)], 0);
        for i in 0..3 {
            s.push_element(0, note(i * 80, 0, 10 + i as u8 * 10, 4, 60, 0x32));
        }
        let d = decoded(s);
        let states: Vec<_> = d.voice_events(0, 0, 0).iter().map(|e| e.tuplet).collect();
        assert_eq!(
            states,
            vec![TupletState::Start, TupletState::Mid, TupletState::Stop]
        );
        assert_eq!(d.voice_events(0, 0, 0)[2].onset, 160);
    }

    #[test]
    fn prevailing_key_spells_pitch() {
        let mut s = score(vec![measure(0), measure(0)], 2); // B flat major
        let first = s.push_element(0, note(0, 0, 10, 3, 70, 0));
        s.push_element(
            1,
            MeasureElement {
                tick: 0,
                voice: 0,
                staff: 0,
                x_offset: 0,
                size: 6,
                kind: ElementKind::KeyChange(KeyChange { key: 9 }), // D major
            },
        );
        let second = s.push_element(1, note(0, 0, 10, 3, 66, 0));
        let d = decoded(s);

        let p = d.note(first).unwrap().pitch();
        assert_eq!((p.step, p.alter, p.octave), ('B', -1, 4));
        let p = d.note(second).unwrap().pitch();
        assert_eq!((p.step, p.alter, p.octave), ('F', 1, 4));
        assert_eq!(d.key_fifths(1, 0), 2);
    }

    #[test]
    fn alternative_ending_bounds() {
        let s = score(
            vec![measure(0), measure(0b01), measure(0b01), measure(0b10), measure(0)],
            0,
        );
        let d = decoded(s);
        let first: Vec<_> = (0..5).map(|i| d.is_first_in_alternative_ending(i)).collect();
        let last: Vec<_> = (0..5).map(|i| d.is_last_in_alternative_ending(i)).collect();
        assert_eq!(first, vec![false, true, false, true, false]);
        assert_eq!(last, vec![false, false, true, true, false]);
        assert!(!d.is_first_in_alternative_ending(9));
    }

    #[test]
    fn note_view_defaults() {
        let mut s = score(vec![measure(0)], 0);
        let id = s.push_element(0, note(0, 0, 10, 3, 60, 0));
        let r = s.push_element(0, rest(240, 0, 3));
        let d = decoded(s);

        let view = d.note(id).unwrap();
        assert_eq!(view.measure(), 0);
        assert_eq!(view.type_name(), Some("quarter"));
        assert_eq!(view.playable_ticks(), 240);
        assert_eq!(view.grace(), GraceType::Normal);
        assert!(!view.tie_start() && !view.tie_stop());
        assert_eq!(view.slur_start(), None);
        assert_eq!(view.direction(), None);
        assert!(d.note(r).is_none());
        assert_eq!(d.notes(0).count(), 1);
        assert!(d.system_for_measure(0).is_some());
        assert!(d.system_for_measure(1).is_none());
    }
}

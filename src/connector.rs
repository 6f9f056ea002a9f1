//! Note connector: reconstructs the relationships the file only encodes by
//! position.
//!
//! Slurs and wedges are stored as a start ornament that points at its end by
//! relative measure count and horizontal offset; ties are stored as a tie
//! element that sits on the same tick and x-offset as the note it starts.
//! The [`Connector`] resolves these to notes once, holding only [`ElementId`]
//! handles, and answers per-note queries against the score afterwards.

use std::collections::HashMap;

use crate::decoder::DecodeOptions;
use crate::diagnostics::{Diagnostic, Diagnostics, DropReason};
use crate::model::*;

// ─── Spanner-end synthesis ───────────────────────────────────────────

/// Append a stop ornament for every slur and wedge start to the measure it
/// ends in. The stop is a copy of the start with the stop type code and the
/// partner offset as its own x-offset.
///
/// All stops are collected before any is appended, so a spanner ending in a
/// later measure never sees stops synthesized during the same pass.
pub fn synthesize_spanner_ends(score: &mut ScoreFile, diag: &mut dyn Diagnostics) {
    let measure_count = score.measures.len();
    let mut pending: Vec<(usize, MeasureElement)> = Vec::new();

    for measure in 0..measure_count {
        for (_, element) in score.measure_elements(measure) {
            let Some(ornament) = element.as_ornament() else {
                continue;
            };
            let stop_code = if ornament.is_slur_start() {
                ORNAMENT_SLUR_STOP
            } else if ornament.is_wedge_start() {
                ORNAMENT_WEDGE_STOP
            } else {
                continue;
            };

            let target = measure + ornament.relative_measures as usize;
            if target >= measure_count {
                diag.report(Diagnostic::SpannerTargetOutOfRange {
                    measure,
                    target,
                    measure_count,
                });
                continue;
            }

            let mut stop = ornament.clone();
            stop.code = stop_code;
            stop.synthesized = true;
            pending.push((
                target,
                MeasureElement {
                    x_offset: ornament.partner_x,
                    kind: ElementKind::Ornament(stop),
                    ..element.clone()
                },
            ));
        }
    }

    for (target, element) in pending {
        score.push_element(target, element);
    }
}

// ─── Note lookup helpers ─────────────────────────────────────────────

fn notes_in<'a>(
    score: &'a ScoreFile,
    measure: usize,
    voice: u8,
    staff: u8,
) -> impl Iterator<Item = (ElementId, &'a MeasureElement)> + 'a {
    score
        .measure_elements(measure)
        .filter(move |(_, e)| e.is_note() && e.voice == voice && e.staff == staff)
}

/// The note in `measure` on `voice`/`staff` whose x-offset is nearest to
/// `x`. On equal distance the note earliest in file order wins.
pub fn find_closest_note(
    score: &ScoreFile,
    x: u8,
    voice: u8,
    staff: u8,
    measure: usize,
) -> Option<ElementId> {
    let mut closest = None;
    let mut minimum = i32::MAX;
    for (id, note) in notes_in(score, measure, voice, staff) {
        let distance = (x as i32 - note.x_offset as i32).abs();
        if distance < minimum {
            minimum = distance;
            closest = Some(id);
        }
    }
    closest
}

/// The first note in `measure` on `voice`/`staff` with an x-offset
/// greater than `x`.
pub fn find_first_note_after_x(
    score: &ScoreFile,
    x: u8,
    voice: u8,
    staff: u8,
    measure: usize,
) -> Option<ElementId> {
    notes_in(score, measure, voice, staff)
        .find(|(_, note)| note.x_offset > x)
        .map(|(id, _)| id)
}

/// The last note (file order) in `measure` on `voice`/`staff` with an
/// x-offset less than `x`.
pub fn find_last_note_before_x(
    score: &ScoreFile,
    x: u8,
    voice: u8,
    staff: u8,
    measure: usize,
) -> Option<ElementId> {
    notes_in(score, measure, voice, staff)
        .filter(|(_, note)| note.x_offset < x)
        .last()
        .map(|(id, _)| id)
}

/// The last note (file order) in `measure` on the same voice and staff
/// as `note`.
pub fn find_last_note(score: &ScoreFile, note: &MeasureElement, measure: usize) -> Option<ElementId> {
    notes_in(score, measure, note.voice, note.staff)
        .last()
        .map(|(id, _)| id)
}

/// The last note (file order) in `measure` on the same voice and staff as
/// `note` with a smaller tick. Notes on tick 0 have no previous note.
pub fn find_previous_note(
    score: &ScoreFile,
    note: &MeasureElement,
    measure: usize,
) -> Option<ElementId> {
    if note.tick == 0 {
        return None;
    }
    notes_in(score, measure, note.voice, note.staff)
        .filter(|(_, prev)| prev.tick < note.tick)
        .last()
        .map(|(id, _)| id)
}

// ─── Connector ───────────────────────────────────────────────────────

/// Derived indices linking notes to the spanners that start or stop on them.
#[derive(Debug, Clone, Default)]
pub struct Connector {
    /// Measure index of every element, indexed by [`ElementId`]
    measure_of: Vec<Option<usize>>,
    slur_starts: HashMap<ElementId, ElementId>,
    slur_stops: HashMap<ElementId, ElementId>,
    wedge_starts: HashMap<ElementId, ElementId>,
    wedge_stops: HashMap<ElementId, ElementId>,
    directions_enabled: bool,
}

impl Connector {
    /// Resolve every slur and wedge start in `score` to its start and stop
    /// notes. Spanners that cannot be resolved are reported and dropped.
    pub fn new(score: &ScoreFile, options: &DecodeOptions, diag: &mut dyn Diagnostics) -> Self {
        let directions_enabled =
            !score.header.has_unreliable_ornaments() || options.trust_big_endian_ornaments;
        if !directions_enabled {
            diag.report(Diagnostic::DirectionsDisabled);
        }

        let mut connector = Connector {
            measure_of: vec![None; score.elements.len()],
            directions_enabled,
            ..Default::default()
        };
        for (index, measure) in score.measures.iter().enumerate() {
            for id in &measure.elements {
                if let Some(slot) = connector.measure_of.get_mut(id.0) {
                    *slot = Some(index);
                }
            }
        }

        for index in 0..score.measures.len() {
            for (id, element) in score.measure_elements(index) {
                let Some(ornament) = element.as_ornament() else {
                    continue;
                };
                if ornament.is_slur_start() {
                    connector.add_slur(score, id, element, ornament, index, diag);
                } else if ornament.is_wedge_start() {
                    connector.add_wedge(score, id, element, ornament, index, diag);
                }
            }
        }

        log::debug!(
            "connected {} slurs and {} wedges",
            connector.slur_starts.len(),
            connector.wedge_starts.len()
        );
        connector
    }

    fn add_slur(
        &mut self,
        score: &ScoreFile,
        id: ElementId,
        element: &MeasureElement,
        ornament: &Ornament,
        measure: usize,
        diag: &mut dyn Diagnostics,
    ) {
        let target = measure + ornament.relative_measures as usize;
        let start = find_closest_note(score, element.x_offset, element.voice, element.staff, measure);
        let stop = if target < score.measures.len() {
            find_closest_note(score, ornament.partner_x, element.voice, element.staff, target)
        } else {
            None
        };

        let reason = match (start, stop) {
            _ if target >= score.measures.len() => Some(DropReason::TargetOutOfRange),
            (None, _) => Some(DropReason::NoStartNote),
            (_, None) => Some(DropReason::NoStopNote),
            (Some(a), Some(b)) if a == b => Some(DropReason::SameStartAndStop),
            (Some(a), _) if self.slur_starts.contains_key(&a) => {
                Some(DropReason::StartAlreadyClaimed)
            }
            (_, Some(b)) if self.slur_stops.contains_key(&b) => Some(DropReason::StopAlreadyClaimed),
            (Some(a), Some(b)) => {
                self.slur_starts.insert(a, id);
                self.slur_stops.insert(b, id);
                None
            }
        };
        if let Some(reason) = reason {
            diag.report(Diagnostic::SpannerDropped {
                ornament: id,
                reason,
            });
        }
    }

    fn add_wedge(
        &mut self,
        score: &ScoreFile,
        id: ElementId,
        element: &MeasureElement,
        ornament: &Ornament,
        measure: usize,
        diag: &mut dyn Diagnostics,
    ) {
        let target = measure + ornament.relative_measures as usize;
        let start = find_closest_note(score, element.x_offset, element.voice, element.staff, measure);
        let stop = if target < score.measures.len() {
            find_last_note_before_x(score, ornament.partner_x, element.voice, element.staff, target)
        } else {
            None
        };

        let reason = match (start, stop) {
            _ if target >= score.measures.len() => Some(DropReason::TargetOutOfRange),
            (None, _) => Some(DropReason::NoStartNote),
            (_, None) => Some(DropReason::NoStopNote),
            (Some(a), _) if self.wedge_starts.contains_key(&a) => {
                Some(DropReason::StartAlreadyClaimed)
            }
            (_, Some(b)) if self.wedge_stops.contains_key(&b) => {
                Some(DropReason::StopAlreadyClaimed)
            }
            (Some(a), Some(b)) => {
                self.wedge_starts.insert(a, id);
                self.wedge_stops.insert(b, id);
                None
            }
        };
        if let Some(reason) = reason {
            diag.report(Diagnostic::SpannerDropped {
                ornament: id,
                reason,
            });
        }
    }

    /// Measure index of `element`.
    pub fn measure_of(&self, element: ElementId) -> Option<usize> {
        self.measure_of.get(element.0).copied().flatten()
    }

    /// Whether direction lookups are answered for this file.
    pub fn directions_enabled(&self) -> bool {
        self.directions_enabled
    }

    /// Slur ornament starting on `note`.
    pub fn slur_start(&self, note: ElementId) -> Option<ElementId> {
        self.slur_starts.get(&note).copied()
    }

    /// Slur ornament stopping on `note`.
    pub fn slur_stop(&self, note: ElementId) -> Option<ElementId> {
        self.slur_stops.get(&note).copied()
    }

    /// Wedge ornament starting on `note`.
    pub fn wedge_start(&self, note: ElementId) -> Option<ElementId> {
        self.wedge_starts.get(&note).copied()
    }

    /// Wedge ornament stopping on `note`.
    pub fn wedge_stop(&self, note: ElementId) -> Option<ElementId> {
        self.wedge_stops.get(&note).copied()
    }

    /// Whether a tie starts on `note`: a tie element in the same measure
    /// shares its tick, voice, staff and x-offset.
    pub fn tie_start(&self, score: &ScoreFile, note: ElementId) -> bool {
        let (Some(element), Some(measure)) = (score.element(note), self.measure_of(note)) else {
            return false;
        };
        score.measure_elements(measure).any(|(_, tie)| {
            tie.is_tie()
                && tie.tick == element.tick
                && tie.same_line(element)
                && tie.x_offset == element.x_offset
        })
    }

    /// Whether a tie stops on `note`: the note before it on the same voice
    /// and staff starts a tie. For a note on tick 0 that is the last such
    /// note of the previous measure.
    pub fn tie_stop(&self, score: &ScoreFile, note: ElementId) -> bool {
        let (Some(element), Some(measure)) = (score.element(note), self.measure_of(note)) else {
            return false;
        };
        let previous = if element.tick > 0 {
            find_previous_note(score, element, measure)
        } else if measure > 0 {
            find_last_note(score, element, measure - 1)
        } else {
            None
        };
        previous.is_some_and(|prev| self.tie_start(score, prev))
    }

    /// Staff text or tempo ornament on the same tick, voice and staff as
    /// `note`. Always `None` when directions are disabled.
    pub fn direction(&self, score: &ScoreFile, note: ElementId) -> Option<ElementId> {
        if !self.directions_enabled {
            return None;
        }
        let element = score.element(note)?;
        let measure = self.measure_of(note)?;
        score
            .measure_elements(measure)
            .find(|(_, e)| {
                e.tick == element.tick
                    && e.same_line(element)
                    && e.as_ornament().is_some_and(|o| {
                        matches!(o.kind(), OrnamentKind::StaffText | OrnamentKind::Tempo)
                    })
            })
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;

    fn header(magic: FileMagic) -> Header {
        Header {
            magic,
            format_code: 0,
            version: 0,
            unknown1: 0,
            unknown2: 0,
            system_count: 1,
            page_count: 1,
            instrument_count: 1,
            staves_per_system: 1,
            measure_count: 0,
        }
    }

    fn measure() -> Measure {
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
            repeat_alternative: 0,
            end_signal: 0,
            elements: Vec::new(),
        }
    }

    fn score(measures: usize) -> ScoreFile {
        ScoreFile {
            header: header(FileMagic::Scow),
            title: Title::default(),
            free_text: FreeText::default(),
            instruments: Vec::new(),
            systems: Vec::new(),
            measures: (0..measures).map(|_| measure()).collect(),
            elements: Vec::new(),
        }
    }

    fn element(tick: u16, x: u8, kind: ElementKind) -> MeasureElement {
        MeasureElement {
            tick,
            voice: 0,
            staff: 0,
            x_offset: x,
            size: 0,
            kind,
        }
    }

    fn note(tick: u16, x: u8) -> MeasureElement {
        element(
            tick,
            x,
            ElementKind::Note(Note {
                face_value: 3,
                grace1: 0,
                grace2: 0,
                position: 0,
                tuplet: 0,
                dot_control: 0,
                pitch: 60,
                playback_ticks: 240,
                velocity: 64,
                options: 0,
                accidental_glyph: 0,
                articulation_up: 0,
                articulation_down: 0,
            }),
        )
    }

    fn ornament(code: u8, x: u8, relative_measures: u8, partner_x: u8) -> MeasureElement {
        element(
            0,
            x,
            ElementKind::Ornament(Ornament {
                code,
                relative_measures,
                partner_x,
                mirror: 0,
                note: 0,
                tempo: 0,
                text_index: 0,
                synthesized: false,
            }),
        )
    }

    #[test]
    fn closest_note_prefers_file_order_on_ties() {
        let mut s = score(1);
        let first = s.push_element(0, note(0, 8));
        let second = s.push_element(0, note(0, 12));
        assert_eq!(find_closest_note(&s, 10, 0, 0, 0), Some(first));
        assert_eq!(find_closest_note(&s, 11, 0, 0, 0), Some(second));
        assert_eq!(find_closest_note(&s, 10, 1, 0, 0), None);
    }

    #[test]
    fn slur_resolves_to_closest_notes() {
        let mut s = score(2);
        s.push_element(0, note(0, 8));
        let start = s.push_element(0, note(240, 12));
        let slur = s.push_element(0, ornament(ORNAMENT_SLUR_START, 11, 1, 40));
        let near = s.push_element(1, note(0, 38));
        s.push_element(1, note(240, 42));

        synthesize_spanner_ends(&mut s, &mut NullSink);
        let c = Connector::new(&s, &DecodeOptions::default(), &mut NullSink);
        assert_eq!(c.slur_start(start), Some(slur));
        assert_eq!(c.slur_stop(near), Some(slur));

        // equal distance: 38 and 42 are both 2 away from 40, 38 comes first
        let mut s = score(2);
        s.push_element(0, note(0, 12));
        s.push_element(0, ornament(ORNAMENT_SLUR_START, 10, 1, 40));
        let first = s.push_element(1, note(0, 38));
        let second = s.push_element(1, note(240, 42));
        let c = Connector::new(&s, &DecodeOptions::default(), &mut NullSink);
        assert!(c.slur_stop(first).is_some());
        assert!(c.slur_stop(second).is_none());
    }

    #[test]
    fn wedge_stops_on_last_note_before_partner() {
        let mut s = score(2);
        let start = s.push_element(0, note(0, 5));
        let wedge = s.push_element(0, ornament(ORNAMENT_WEDGE_START, 5, 1, 25));
        s.push_element(1, note(0, 10));
        let twenty = s.push_element(1, note(240, 20));
        let thirty = s.push_element(1, note(480, 30));

        let c = Connector::new(&s, &DecodeOptions::default(), &mut NullSink);
        assert_eq!(c.wedge_start(start), Some(wedge));
        assert_eq!(c.wedge_stop(twenty), Some(wedge));
        assert_eq!(c.wedge_stop(thirty), None);
    }

    #[test]
    fn slur_on_a_single_note_is_dropped() {
        let mut s = score(1);
        let only = s.push_element(0, note(0, 10));
        let slur = s.push_element(0, ornament(ORNAMENT_SLUR_START, 10, 0, 12));
        let mut diag: Vec<Diagnostic> = Vec::new();
        let c = Connector::new(&s, &DecodeOptions::default(), &mut diag);
        assert_eq!(c.slur_start(only), None);
        assert_eq!(
            diag,
            vec![Diagnostic::SpannerDropped {
                ornament: slur,
                reason: DropReason::SameStartAndStop
            }]
        );
    }

    #[test]
    fn second_slur_on_claimed_note_is_dropped() {
        let mut s = score(1);
        let a = s.push_element(0, note(0, 10));
        let b = s.push_element(0, note(240, 30));
        let first = s.push_element(0, ornament(ORNAMENT_SLUR_START, 10, 0, 30));
        let second = s.push_element(0, ornament(ORNAMENT_SLUR_START, 11, 0, 29));
        let mut diag: Vec<Diagnostic> = Vec::new();
        let c = Connector::new(&s, &DecodeOptions::default(), &mut diag);
        assert_eq!(c.slur_start(a), Some(first));
        assert_eq!(c.slur_stop(b), Some(first));
        assert_eq!(
            diag,
            vec![Diagnostic::SpannerDropped {
                ornament: second,
                reason: DropReason::StartAlreadyClaimed
            }]
        );
    }

    #[test]
    fn synthesis_appends_stops_and_reports_bad_targets() {
        let mut s = score(2);
        s.push_element(0, ornament(ORNAMENT_SLUR_START, 10, 1, 40));
        s.push_element(1, ornament(ORNAMENT_WEDGE_START, 10, 5, 40));
        let mut diag: Vec<Diagnostic> = Vec::new();
        synthesize_spanner_ends(&mut s, &mut diag);

        let last = s.measures[1].elements.last().copied().unwrap();
        let stop = s.element(last).unwrap();
        assert_eq!(stop.x_offset, 40);
        let o = stop.as_ornament().unwrap();
        assert_eq!(o.kind(), OrnamentKind::SlurStop);
        assert!(o.synthesized);
        assert_eq!(s.measures[1].elements.len(), 2);
        assert_eq!(
            diag,
            vec![Diagnostic::SpannerTargetOutOfRange {
                measure: 1,
                target: 6,
                measure_count: 2
            }]
        );
    }

    #[test]
    fn ties_by_coincidence_and_across_barlines() {
        let mut s = score(2);
        let a = s.push_element(0, note(0, 10));
        s.push_element(0, element(0, 10, ElementKind::Tie));
        let b = s.push_element(0, note(480, 40));
        s.push_element(0, element(480, 40, ElementKind::Tie));
        let c_note = s.push_element(1, note(0, 10));

        let c = Connector::new(&s, &DecodeOptions::default(), &mut NullSink);
        assert!(c.tie_start(&s, a));
        assert!(!c.tie_stop(&s, a));
        assert!(c.tie_start(&s, b));
        assert!(c.tie_stop(&s, b));
        assert!(!c.tie_start(&s, c_note));
        assert!(c.tie_stop(&s, c_note));
    }

    #[test]
    fn directions_disabled_for_big_endian_files() {
        let mut s = score(1);
        let n = s.push_element(0, note(0, 10));
        let text = s.push_element(0, ornament(ORNAMENT_STAFF_TEXT, 10, 0, 0));

        let c = Connector::new(&s, &DecodeOptions::default(), &mut NullSink);
        assert_eq!(c.direction(&s, n), Some(text));

        s.header.magic = FileMagic::Sco5;
        let mut diag: Vec<Diagnostic> = Vec::new();
        let c = Connector::new(&s, &DecodeOptions::default(), &mut diag);
        assert_eq!(c.direction(&s, n), None);
        assert_eq!(diag, vec![Diagnostic::DirectionsDisabled]);

        let trusting = DecodeOptions {
            trust_big_endian_ornaments: true,
            ..Default::default()
        };
        let c = Connector::new(&s, &trusting, &mut NullSink);
        assert_eq!(c.direction(&s, n), Some(text));
    }

    #[test]
    fn first_note_after_x() {
        let mut s = score(1);
        s.push_element(0, note(0, 10));
        let b = s.push_element(0, note(240, 20));
        s.push_element(0, note(480, 30));
        assert_eq!(find_first_note_after_x(&s, 10, 0, 0, 0), Some(b));
        assert_eq!(find_first_note_after_x(&s, 30, 0, 0, 0), None);
    }
}

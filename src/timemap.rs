//! Compute absolute timestamps and durations for each measure in the
//! unrolled sequence.  It answers "when does each measure start?" and
//! "how long is it?" in wall-clock time.

use serde::{Deserialize, Serialize};

use crate::duration::TICKS_PER_QUARTER;
use crate::model::ScoreFile;
use crate::unroller::UnrolledMeasure;

/// Timing information for one measure in the unrolled sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimemapEntry {
    /// Index in the unrolled sequence (0-based)
    pub index: usize,
    /// Index into `ScoreFile::measures` for the original measure data
    pub original_index: usize,
    /// Cumulative start time in milliseconds from the beginning
    pub timestamp_ms: f64,
    /// Duration of this measure in milliseconds
    pub duration_ms: f64,
    /// Duration of this measure in ticks (240 per quarter)
    pub duration_ticks: u32,
    /// Active tempo (BPM) at this measure
    pub tempo_bpm: f64,
    /// Time signature: (beats, beat_type)
    pub time_sig: (u8, u8),
}

/// Tempo used until the score sets one.
pub const DEFAULT_TEMPO: f64 = 120.0;
/// Time signature used until the score sets one.
pub const DEFAULT_TIME_SIG: (u8, u8) = (4, 4);

/// State snapshot at a particular original measure position.
/// Pre-computed by walking measures in score order so that jumps
/// (D.S., D.C.) correctly restore the tempo/time-sig that were in effect
/// at the jump destination.
#[derive(Debug, Clone, Copy)]
struct MeasureState {
    tempo: f64,
    time_sig: (u8, u8),
}

/// Effective tempo and time signature at each original measure. Zero
/// fields (unset in the file) keep the previous measure's value.
fn precompute_measure_states(score: &ScoreFile) -> Vec<MeasureState> {
    let mut states = Vec::with_capacity(score.measures.len());
    let mut tempo = DEFAULT_TEMPO;
    let mut time_sig = DEFAULT_TIME_SIG;

    for measure in &score.measures {
        if measure.bpm > 0 {
            tempo = measure.bpm as f64;
        }
        let ts = measure.time_signature;
        if ts.beats > 0 && ts.beat_type > 0 {
            time_sig = (ts.beats, ts.beat_type);
        }
        states.push(MeasureState { tempo, time_sig });
    }

    states
}

/// Generate a timemap for an unrolled measure sequence.
///
/// Entries whose `original_index` is outside the score are skipped.
pub fn generate_timemap(score: &ScoreFile, unrolled: &[UnrolledMeasure]) -> Vec<TimemapEntry> {
    let states = precompute_measure_states(score);

    let mut entries = Vec::with_capacity(unrolled.len());
    let mut current_time_ms: f64 = 0.0;

    for um in unrolled {
        let Some(state) = states.get(um.original_index) else {
            continue;
        };
        let (beats, beat_type) = state.time_sig;

        // quarter_notes = (beats / beat_type) * 4
        let quarter_notes = (beats as f64 / beat_type as f64) * 4.0;
        let ms_per_quarter = 60_000.0 / state.tempo;
        let duration_ms = quarter_notes * ms_per_quarter;
        let duration_ticks = beats as u32 * TICKS_PER_QUARTER * 4 / beat_type as u32;

        entries.push(TimemapEntry {
            index: entries.len(),
            original_index: um.original_index,
            timestamp_ms: current_time_ms,
            duration_ms,
            duration_ticks,
            tempo_bpm: state.tempo,
            time_sig: state.time_sig,
        });

        current_time_ms += duration_ms;
    }

    entries
}

/// Total duration of the entire timemap in milliseconds.
pub fn total_duration_ms(timemap: &[TimemapEntry]) -> f64 {
    timemap.last().map_or(0.0, |e| e.timestamp_ms + e.duration_ms)
}

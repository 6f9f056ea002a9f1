//! Unroll a score by expanding repeats and navigation jumps into a linear
//! measure sequence.  Timing (see [`crate::timemap`]) is computed over this
//! play-order list rather than over the measures as stored.
//!
//! Handles:
//! - Repeat-start / repeat-end bar lines
//! - Alternative endings from the repeat-alternative bitmask (pass N plays
//!   the measures whose bit N-1 is set)
//! - D.S. / D.C. (plain, al Fine, al Coda) from the end-of-measure jump marker
//! - Fine: stop on the D.S./D.C. pass
//! - Coda: on the D.S./D.C. pass, jump from a coda mark to the next one
//! - Senza ripetizione: repeats are NOT taken again after a D.S./D.C. jump

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{BarStyle, JumpMarker, ScoreFile};

/// One entry in the unrolled (play-order) sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnrolledMeasure {
    /// Index into `ScoreFile::measures` for the original measure data.
    pub original_index: usize,
    /// Repeat pass (1-based) on which the measure is played.
    pub pass: u32,
}

/// Unroll the measures of `score` into play order.
///
/// All instruments share one measure sequence in an Encore file, so the
/// result applies to every part.
pub fn unroll(score: &ScoreFile) -> Vec<UnrolledMeasure> {
    let measures = &score.measures;
    if measures.is_empty() {
        return Vec::new();
    }

    // ── Pre-scan: locate segno and coda marks ───────────────────────
    let segno_index = measures.iter().position(|m| m.jump_marker().is_segno());
    let coda_marks: Vec<usize> = measures
        .iter()
        .enumerate()
        .filter(|(_, m)| m.jump_marker().is_coda())
        .map(|(i, _)| i)
        .collect();

    // ── Pre-scan: compute max passes per repeat section ────────────
    // For each repeat-start position, find the highest alternative pass
    // in its section.  This tells us how many passes to take.
    let mut section_max_passes: HashMap<usize, u32> = HashMap::new();
    {
        // Start with 0 as the implicit repeat start (handles repeat ends
        // that have no explicit repeat-start bar line).
        let mut current_start: usize = 0;
        for (i, m) in measures.iter().enumerate() {
            if m.bar_start == BarStyle::RepeatStart {
                current_start = i;
            }
            if let Some(&highest) = m.ending_passes().iter().max() {
                let entry = section_max_passes.entry(current_start).or_insert(2);
                *entry = (*entry).max(highest);
            }
        }
    }

    // ── Walk: expand into play order ────────────────────────────────
    let mut result: Vec<UnrolledMeasure> = Vec::new();
    let mut pos: usize = 0;
    let mut repeat_start: usize = 0;
    let mut repeat_pass: u32 = 1; // 1-based pass counter (1st, 2nd, 3rd, …)
    let mut jump_taken = false;
    // Safety limit: generous enough for scores with many alternative endings.
    let max_iterations = measures.len() * 50;
    let mut iterations = 0;

    while pos < measures.len() {
        iterations += 1;
        if iterations > max_iterations {
            log::warn!(
                "unroller hit safety limit ({} iterations), output may be truncated; \
                 raw measures: {}, unrolled so far: {}",
                max_iterations,
                measures.len(),
                result.len()
            );
            break;
        }

        let m = &measures[pos];
        let marker = m.jump_marker();

        // Only update repeat_start on the very first encounter (pass 1);
        // on subsequent passes we're jumping back here, so don't reset.
        if m.bar_start == BarStyle::RepeatStart && repeat_pass == 1 {
            repeat_start = pos;
        }

        // Alternative ending not played on this pass.
        if !m.plays_on_pass(repeat_pass) {
            pos += 1;
            continue;
        }

        // Fine ends the piece once a D.S./D.C. jump has been taken.
        if jump_taken && marker == JumpMarker::Fine {
            result.push(UnrolledMeasure {
                original_index: pos,
                pass: repeat_pass,
            });
            break;
        }

        // On the jump pass, a coda mark sends us on to the next coda mark.
        if jump_taken && marker.is_coda() {
            if let Some(&coda) = coda_marks.iter().find(|&&c| c > pos) {
                pos = coda;
                jump_taken = false; // reset so we don't loop
                continue;
            }
        }

        result.push(UnrolledMeasure {
            original_index: pos,
            pass: repeat_pass,
        });

        // SENZA RIPETIZIONE: after a D.S./D.C. jump, repeats are NOT taken.
        if !jump_taken && m.bar_end == BarStyle::RepeatEnd {
            // Default to 2 passes (simple repeat) unless alternatives ask for more.
            let max_pass = section_max_passes.get(&repeat_start).copied().unwrap_or(2);
            if repeat_pass < max_pass {
                repeat_pass += 1;
                pos = repeat_start;
                continue;
            }
            // Last pass done, continue forward.
        }

        if !jump_taken {
            let target = if marker.is_da_capo() {
                Some(0)
            } else if marker.is_dal_segno() {
                segno_index
            } else {
                None
            };
            if let Some(target) = target {
                pos = target;
                jump_taken = true;
                repeat_pass = 1;
                continue;
            }
        }

        pos += 1;
        // Reset repeat pass when we've finished all passes and move past
        // the last alternative ending of a repeat section.
        if repeat_pass > 1 {
            let leaving_section = measures
                .get(pos.wrapping_sub(1))
                .is_some_and(|pm| pm.bar_end == BarStyle::RepeatEnd || pm.repeat_alternative != 0);
            let next_is_alternative = measures
                .get(pos)
                .is_some_and(|nm| nm.repeat_alternative != 0);
            if leaving_section && !next_is_alternative {
                repeat_pass = 1;
                // Any later repeat end without an explicit repeat start goes
                // back here, not to the previous section's start.
                repeat_start = pos;
            }
        }
    }

    result
}

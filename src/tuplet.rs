//! Tuplet bracketing state machine.
//!
//! Fed with every note and rest of one voice in file order, it marks the
//! first member of each tuplet group `Start`, the last `Stop` and anything in
//! between `Mid`. Members shorter or longer than the first one are weighed
//! by powers of two, so a quarter followed by an eighth closes a 3:2 eighth
//! triplet just as three eighths do.

use serde::{Deserialize, Serialize};

/// Bracket position of one note or rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupletState {
    None,
    Start,
    Mid,
    Stop,
}

/// Per-voice tuplet tracker.
#[derive(Debug, Clone, Default)]
pub struct TupletTracker {
    /// Members counted so far, in units of the current baseline
    count: u32,
    /// Duration code of the baseline unit
    value: u8,
}

impl TupletTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next note or rest of the voice.
    pub fn next(&mut self, actual_notes: u8, normal_notes: u8, duration_code: u8) -> TupletState {
        if actual_notes == 0 || normal_notes == 0 {
            self.count = 0;
            return TupletState::None;
        }

        if self.count == 0 {
            self.count = 1;
            self.value = duration_code;
            return TupletState::Start;
        }

        // Shorter notes refine the baseline, longer ones count as several units.
        let mut weight: u32 = 1;
        let mut value = duration_code;
        while value > self.value {
            self.count = self.count.saturating_mul(2);
            self.value += 1;
        }
        while self.value > value {
            weight = weight.saturating_mul(2);
            value += 1;
        }
        self.count = self.count.saturating_add(weight);

        if self.count >= actual_notes as u32 {
            self.count = 0;
            TupletState::Stop
        } else {
            TupletState::Mid
        }
    }

    /// Members counted in the open group; zero outside a group.
    pub fn count(&self) -> u32 {
        self.count
    }
}

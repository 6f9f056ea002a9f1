//! Note values and playable durations.
//!
//! Durations are in ticks at 240 per quarter note (960 per whole).

/// Ticks per quarter note.
pub const TICKS_PER_QUARTER: u32 = 240;

/// Nominal ticks of a duration code (1 = whole … 8 = 128th); zero for
/// anything else.
pub fn face_value_ticks(duration_code: u8) -> u32 {
    match duration_code {
        1 => 960,
        2 => 480,
        3 => 240,
        4 => 120,
        5 => 60,
        6 => 30,
        7 => 15,
        8 => 7,
        _ => 0,
    }
}

/// Note type name of a duration code, `None` outside 1–8.
pub fn face_value_name(duration_code: u8) -> Option<&'static str> {
    Some(match duration_code {
        1 => "whole",
        2 => "half",
        3 => "quarter",
        4 => "eighth",
        5 => "16th",
        6 => "32nd",
        7 => "64th",
        8 => "128th",
        _ => return None,
    })
}

/// Ticks a note or rest occupies: nominal value, each dot adding half of
/// the previous value, scaled by the tuplet ratio when one is set.
/// Integer arithmetic throughout, truncating at every step.
pub fn playable_ticks(duration_code: u8, dots: u8, actual_notes: u8, normal_notes: u8) -> u32 {
    let mut ticks = face_value_ticks(duration_code);
    for _ in 0..(dots & 3) {
        ticks = ticks * 3 / 2;
    }
    if actual_notes > 0 && normal_notes > 0 {
        ticks = ticks * normal_notes as u32 / actual_notes as u32;
    }
    ticks
}

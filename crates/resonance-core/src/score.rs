//! Coherence scoring.
//!
//! The score is a pure function of the length of `intent + "-" + tone`,
//! counted in Unicode scalar values (`str::chars`). Ports must keep the
//! same counting unit, the same modulus and the same table order or the
//! scores drift apart.

/// Response lines, indexed by key length modulo the table size.
pub const RESPONSE_TABLE: [&str; 6] = [
    "The pattern holds; what you send returns intact.",
    "The echo arrives, bent slightly by the medium.",
    "Two frequencies meet and briefly agree.",
    "The field is quiet. Try a different projection.",
    "Partial resonance: the tone colours the intent.",
    "Alignment found. The shape turns into focus.",
];

/// Computed resolution text and coherence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub text: &'static str,
    /// Always within 0..=100
    pub score: u8,
}

/// Stateless coherence calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreEngine;

impl ScoreEngine {
    /// Compute the response for an intent/tone pair.
    pub fn compute_response(intent: &str, tone: &str) -> Response {
        // Same as (intent + "-" + tone).chars().count(), minus the allocation.
        let h = intent.chars().count() + 1 + tone.chars().count();
        Response {
            text: RESPONSE_TABLE[h % RESPONSE_TABLE.len()],
            score: Self::coherence(h),
        }
    }

    /// `100 - |50 - (h mod 100)|`
    pub fn coherence(h: usize) -> u8 {
        let m = (h % 100) as i64;
        (100 - (50 - m).abs()) as u8
    }
}

use super::types::{MediaFormat, ValidationResult};

/// Confirmed results, best first: format priority, then static matches before
/// network ones, then discovery order.
pub fn rank(results: &[ValidationResult]) -> Vec<&ValidationResult> {
    let mut confirmed: Vec<&ValidationResult> =
        results.iter().filter(|result| result.is_confirmed()).collect();
    confirmed.sort_by_key(|result| {
        let candidate = result.candidate();
        (
            result
                .detected_format()
                .map(MediaFormat::priority)
                .unwrap_or(u8::MAX),
            candidate.discovered_via,
            candidate.sequence,
        )
    });
    confirmed
}

pub fn select(results: &[ValidationResult]) -> Option<&ValidationResult> {
    rank(results).into_iter().next()
}

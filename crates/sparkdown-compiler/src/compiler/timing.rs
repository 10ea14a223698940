//! Speech duration estimates.

const PAUSE_MARKS: [char; 7] = ['.', ',', ';', ':', '!', '?', '…'];

/// Seconds it takes to say `text` at `words_per_minute`, plus `pause_seconds`
/// for every punctuation mark.
pub fn speech_duration(text: &str, words_per_minute: f64, pause_seconds: f64) -> f64 {
    if words_per_minute <= 0.0 {
        return 0.0;
    }
    let words = text.split_whitespace().count() as f64;
    let pauses = text.chars().filter(|c| PAUSE_MARKS.contains(c)).count() as f64;
    words / words_per_minute * 60.0 + pauses * pause_seconds
}

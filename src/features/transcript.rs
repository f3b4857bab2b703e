use crate::config::FILLER_WORDS;

pub(crate) fn word_count(transcript: &str) -> usize {
    transcript.split_whitespace().count()
}

/// Words per minute; 0 for empty clips.
pub(crate) fn speaking_rate(word_count: usize, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    word_count as f64 / (duration_secs / 60.0)
}

/// Case-insensitive substring occurrences of every filler term. Substring
/// matching also counts fillers embedded in longer words ("um" in "umbrella").
pub(crate) fn filler_count(transcript: &str) -> u32 {
    let lowered = transcript.to_lowercase();
    FILLER_WORDS
        .iter()
        .map(|filler| lowered.matches(filler).count() as u32)
        .sum()
}

//! Normalized movie titles: the fuzzy join key between the scheduling
//! backend, the spreadsheet, and the remote status ledger, none of which
//! share a numeric ID.

/// Marketing/format words that carry no identity and differ between systems.
const NOISE_WORDS: &[&str] = &[
    "2d",
    "3d",
    "4dx",
    "imax",
    "dubbed",
    "subtitled",
    "remastered",
    "premiere",
];

/// Strip noise phrases and punctuation from a movie title so that the same
/// film keys identically across systems. Bracketed segments (format tags,
/// language notes) are dropped entirely.
pub fn normalize_movie_title(title: &str) -> String {
    let mut stripped = String::with_capacity(title.len());
    let mut depth = 0usize;
    for ch in title.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(ch),
            _ => {}
        }
    }

    let lowered = stripped.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|word| !NOISE_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

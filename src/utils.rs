use chrono::{DateTime, Utc};
use std::time::Duration;
use url::Url;

/// Frame filenames sort lexicographically in capture order.
pub const FRAME_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn frame_stem(captured_at: &DateTime<Utc>) -> String {
    captured_at.format(FRAME_TIMESTAMP_FORMAT).to_string()
}

pub fn frame_filename(captured_at: &DateTime<Utc>, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{}.{ext}", frame_stem(captured_at)),
        None => frame_stem(captured_at),
    }
}

/// Map Greek letters to Latin ones so camera directories stay ASCII on
/// filesystems and archives that mangle UTF-8. Other characters pass
/// through untouched.
pub fn transliterate(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let mapped = match c {
            'α' | 'ά' => "a",
            'Α' | 'Ά' => "A",
            'β' => "v",
            'Β' => "V",
            'γ' => "g",
            'Γ' => "G",
            'δ' => "d",
            'Δ' => "D",
            'ε' | 'έ' => "e",
            'Ε' | 'Έ' => "E",
            'ζ' => "z",
            'Ζ' => "Z",
            'η' | 'ή' => "i",
            'Η' | 'Ή' => "I",
            'θ' => "th",
            'Θ' => "Th",
            'ι' | 'ί' | 'ϊ' | 'ΐ' => "i",
            'Ι' | 'Ί' | 'Ϊ' => "I",
            'κ' => "k",
            'Κ' => "K",
            'λ' => "l",
            'Λ' => "L",
            'μ' => "m",
            'Μ' => "M",
            'ν' => "n",
            'Ν' => "N",
            'ξ' => "x",
            'Ξ' => "X",
            'ο' | 'ό' => "o",
            'Ο' | 'Ό' => "O",
            'π' => "p",
            'Π' => "P",
            'ρ' => "r",
            'Ρ' => "R",
            'σ' | 'ς' => "s",
            'Σ' => "S",
            'τ' => "t",
            'Τ' => "T",
            'υ' | 'ύ' | 'ϋ' | 'ΰ' => "y",
            'Υ' | 'Ύ' | 'Ϋ' => "Y",
            'φ' => "f",
            'Φ' => "F",
            'χ' => "ch",
            'Χ' => "Ch",
            'ψ' => "ps",
            'Ψ' => "Ps",
            'ω' | 'ώ' => "o",
            'Ω' | 'Ώ' => "O",
            other => {
                out.push(other);
                continue;
            }
        };
        out.push_str(mapped);
    }
    out
}

/// Make a camera name safe to use as a single path segment.
pub fn sanitize_camera_name(input: &str) -> String {
    let sanitized = transliterate(input)
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>();

    let trimmed = sanitized
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == ' ');

    match trimmed {
        "" | "." | ".." => "_".to_string(),
        name => name.to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

pub fn validate_url(url: &str) -> Result<Url, url::ParseError> {
    let parsed = Url::parse(url)?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(url::ParseError::InvalidPort),
    }
}

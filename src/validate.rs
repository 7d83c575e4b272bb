//! Plate text normalization and format checks.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fmt;

/// Brazilian plates: Mercosul `LLLNLNN` (e.g. ABC4E67) or legacy `LLLNNNN` (e.g. ABC1234).
pub const DEFAULT_PLATE_PATTERN: &str = r"^[A-Z]{3}[0-9][A-Z0-9][0-9]{2}$|^[A-Z]{3}[0-9]{4}$";

/// Plates are seven characters in the default layout; longer reads carry trailing noise.
pub const DEFAULT_MAX_LEN: usize = 7;

/// Positional look-alike correction applied after normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CharCorrection {
    /// Leave characters as read.
    None,
    /// Seven-character Brazilian layouts (`LLLNLNN` / `LLLNNNN`).
    #[default]
    Mercosul,
}

impl CharCorrection {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "mercosul" | "brazil" => Ok(Self::Mercosul),
            other => Err(anyhow!(
                "unknown plate correction '{}'; expected 'none' or 'mercosul'",
                other
            )),
        }
    }

    fn apply(self, text: String) -> String {
        match self {
            Self::None => text,
            Self::Mercosul => correct_mercosul(text),
        }
    }
}

/// Why a reading was dropped. Rejections are expected traffic, not errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Nothing plate-like survived normalization.
    Empty,
    /// Normalized text does not match the plate pattern.
    PatternMismatch(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "no plate characters"),
            Rejection::PatternMismatch(text) => write!(f, "'{}' does not match plate pattern", text),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlateValidator {
    pattern: Regex,
    max_len: Option<usize>,
    correction: CharCorrection,
}

impl PlateValidator {
    pub fn new(pattern: &str, max_len: Option<usize>, correction: CharCorrection) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("invalid plate pattern '{}'", pattern))?;
        Ok(Self {
            pattern,
            max_len: max_len.filter(|&n| n > 0),
            correction,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Upper-case, strip everything outside `[A-Z0-9]`, truncate, correct.
    pub fn normalize(&self, raw: &str) -> String {
        let mut text: String = raw
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            .collect();
        if let Some(max_len) = self.max_len {
            text.truncate(max_len);
        }
        self.correction.apply(text)
    }

    /// Normalize `raw` and check it against the plate pattern.
    pub fn validate(&self, raw: &str) -> Result<String, Rejection> {
        let text = self.normalize(raw);
        if text.is_empty() {
            return Err(Rejection::Empty);
        }
        if self.pattern.is_match(&text) {
            Ok(text)
        } else {
            Err(Rejection::PatternMismatch(text))
        }
    }
}

impl Default for PlateValidator {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_PLATE_PATTERN).expect("default plate pattern compiles"),
            max_len: Some(DEFAULT_MAX_LEN),
            correction: CharCorrection::Mercosul,
        }
    }
}

fn digit_to_letter(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '5' => 'S',
        '8' => 'B',
        other => other,
    }
}

fn letter_to_digit(c: char) -> char {
    match c {
        'O' => '0',
        'I' => '1',
        'S' => '5',
        'G' => '6',
        'Z' => '2',
        'B' => '8',
        'A' => '4',
        other => other,
    }
}

fn correct_mercosul(text: String) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    if chars.len() != 7 {
        return text;
    }

    for c in chars.iter_mut().take(3) {
        *c = digit_to_letter(*c);
    }

    // The fifth character decides the layout: a letter means Mercosul.
    if chars[4].is_ascii_alphabetic() {
        chars[3] = letter_to_digit(chars[3]);
        chars[4] = digit_to_letter(chars[4]);
        for c in chars.iter_mut().skip(5) {
            *c = letter_to_digit(*c);
        }
    } else {
        for c in chars.iter_mut().skip(3) {
            *c = letter_to_digit(*c);
        }
    }

    chars.into_iter().collect()
}

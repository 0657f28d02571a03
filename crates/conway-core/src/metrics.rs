//! Result extraction — turns an engine's free-text reply into metrics.
//!
//! Engines print one summary line per size exponent, e.g.
//!
//! ```text
//! tam=8; gens=10; tempo=0.0120;
//! tam=16; gens=26; tempo=0.0450;
//! ```
//!
//! Every line is scanned for `key = value` tokens. Keys are not restricted
//! to a fixed vocabulary; the same scanner serves every engine's output
//! shape. Aggregation across lines:
//!   tam   — board size, last occurrence wins
//!   gens  — generation count, summed over all occurrences
//!   tempo — elapsed seconds, last occurrence wins
//!
//! Missing keys stay unset. Extraction never fails a request.

pub const BOARD_SIZE_KEY: &str = "tam";
pub const GENERATIONS_KEY: &str = "gens";
pub const ELAPSED_KEY: &str = "tempo";

/// Prefixes engines use to signal that the reply is an error message.
pub const ERROR_MARKERS: [&str; 2] = ["ERROR:", "Exception:"];

/// A numeric token value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Int(v) => v as f64,
            MetricValue::Float(v) => v,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            MetricValue::Int(v) => v,
            MetricValue::Float(v) => v as i64,
        }
    }
}

/// Metrics pulled out of one engine reply.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExtractedMetrics {
    /// Last seen board size.
    pub board_size: Option<i64>,
    /// Sum of every generation count seen.
    pub total_generations: Option<i64>,
    /// Last seen elapsed compute time.
    pub elapsed_seconds: Option<f64>,
}

impl ExtractedMetrics {
    /// Board size, `-1` when unset.
    pub fn board_size_or_sentinel(&self) -> i64 {
        self.board_size.unwrap_or(-1)
    }

    /// Total generations, `-1` when unset.
    pub fn generations_or_sentinel(&self) -> i64 {
        self.total_generations.unwrap_or(-1)
    }

    /// Elapsed time in milliseconds, `0` when unset.
    pub fn duration_ms(&self) -> f64 {
        self.elapsed_seconds.map(|s| s * 1000.0).unwrap_or(0.0)
    }
}

/// True if the reply starts with one of the engines' error markers.
pub fn is_error_text(text: &str) -> bool {
    let text = text.trim_start();
    ERROR_MARKERS.iter().any(|marker| text.starts_with(marker))
}

/// Aggregate metrics over every line of `text`.
pub fn extract(text: &str) -> ExtractedMetrics {
    let mut metrics = ExtractedMetrics::default();
    for line in text.lines() {
        for (key, value) in parse_pairs(line) {
            match key {
                BOARD_SIZE_KEY => metrics.board_size = Some(value.as_i64()),
                GENERATIONS_KEY => {
                    let total = metrics.total_generations.unwrap_or(0);
                    metrics.total_generations = Some(total.saturating_add(value.as_i64()));
                }
                ELAPSED_KEY => metrics.elapsed_seconds = Some(value.as_f64()),
                _ => {}
            }
        }
    }
    metrics
}

/// Every `key = value` token on one line, in order.
///
/// A key is `[A-Za-z_][A-Za-z0-9_]*`; a value is `digits` or
/// `digits.digits`. Whitespace around `=` is allowed.
pub fn parse_pairs(line: &str) -> Vec<(&str, MetricValue)> {
    let bytes = line.as_bytes();
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !is_ident_start(bytes[i]) {
            i += 1;
            continue;
        }

        let key_start = i;
        while i < bytes.len() && is_ident_continue(bytes[i]) {
            i += 1;
        }
        let key_end = i;

        let mut j = skip_spaces(bytes, i);
        if j >= bytes.len() || bytes[j] != b'=' {
            continue;
        }
        j = skip_spaces(bytes, j + 1);

        let value_start = j;
        j = skip_digits(bytes, j);
        if j == value_start {
            continue;
        }
        let mut is_float = false;
        if j + 1 < bytes.len() && bytes[j] == b'.' && bytes[j + 1].is_ascii_digit() {
            is_float = true;
            j = skip_digits(bytes, j + 1);
        }

        // Token boundaries fall on ASCII bytes, so slicing stays on char boundaries.
        let raw = &line[value_start..j];
        let value = if is_float {
            raw.parse().ok().map(MetricValue::Float)
        } else {
            raw.parse()
                .ok()
                .map(MetricValue::Int)
                .or_else(|| raw.parse().ok().map(MetricValue::Float))
        };
        if let Some(value) = value {
            pairs.push((&line[key_start..key_end], value));
        }
        i = j;
    }

    pairs
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_spaces(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    i
}

fn skip_digits(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    i
}

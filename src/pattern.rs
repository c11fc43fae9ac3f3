//! Format patterns in paths, e.g. `data/air_{year}.nc`.
//!
//! A pattern is a format string with named fields. [`path_to_glob`] turns it
//! into a glob matching all the files it describes, and [`reverse_format`] is
//! the inverse of formatting: it recovers the field values from a path that
//! matches the pattern.
//!
//! ```
//! use ncsource::pattern::{reverse_format, path_to_glob, FieldValue};
//!
//! assert_eq!(path_to_glob("data/air_{year}.nc").unwrap(), "data/air_*.nc");
//!
//! let fields = reverse_format("data/air_{year:d}.nc", "/home/me/data/air_1999.nc").unwrap();
//! assert_eq!(fields["year"], FieldValue::Int(1999));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Field { name: String, spec: String },
}

/// A value recovered from a path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Interpret `value` according to the format `spec` it was written with.
    /// Values which do not parse are kept as strings.
    pub fn convert(value: &str, spec: &str) -> FieldValue {
        let typed = || -> Option<FieldValue> {
            if spec.starts_with('%') {
                return NaiveDateTime::parse_from_str(value, spec)
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(value, spec)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
                    .map(FieldValue::DateTime);
            }

            match spec.chars().last()? {
                'b' | 'c' | 'd' | 'o' | 'x' | 'X' => value.parse().ok().map(FieldValue::Int),
                'e' | 'E' | 'f' | 'F' | 'g' | 'G' | 'n' => {
                    value.parse().ok().map(FieldValue::Float)
                }
                '%' => value
                    .strip_suffix('%')?
                    .parse::<f64>()
                    .ok()
                    .map(|v| FieldValue::Float(v / 100.)),
                _ => None,
            }
        };

        typed().unwrap_or_else(|| FieldValue::Str(value.to_string()))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::DateTime(d) => write!(f, "{d}"),
        }
    }
}

fn invalid(pattern: &str, reason: &str) -> SourceError {
    SourceError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}

/// Split a pattern into literal text and fields. `{{` and `}}` are escaped braces.
pub fn parse(pattern: &str) -> Result<Vec<Segment>, SourceError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(invalid(pattern, "nested fields")),
                        Some(c) => field.push(c),
                        None => return Err(invalid(pattern, "unterminated field")),
                    }
                }

                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));

                if name.contains('!') {
                    return Err(invalid(pattern, "conversions are not allowed"));
                }
                if name.is_empty() {
                    return Err(invalid(pattern, "fields must be named"));
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field {
                    name: name.to_string(),
                    spec: spec.to_string(),
                });
            }
            '}' => return Err(invalid(pattern, "single '}' encountered")),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

/// Whether `pattern` contains any fields.
pub fn has_fields(pattern: &str) -> bool {
    parse(pattern)
        .map(|s| s.iter().any(|s| matches!(s, Segment::Field { .. })))
        .unwrap_or(false)
}

/// Replace every run of fields with a single `*`.
pub fn path_to_glob(pattern: &str) -> Result<String, SourceError> {
    let mut glob = String::with_capacity(pattern.len());
    let mut in_field = false;

    for s in parse(pattern)? {
        match s {
            Segment::Literal(l) => {
                glob.push_str(&l);
                in_field = false;
            }
            Segment::Field { .. } if !in_field => {
                glob.push('*');
                in_field = true;
            }
            Segment::Field { .. } => {}
        }
    }

    Ok(glob)
}

fn make_posix(path: &str) -> String {
    path.replace('\\', "/")
}

/// Fixed number of characters a field with `spec` is written as, if known.
fn field_width(spec: &str) -> Option<usize> {
    if spec.starts_with('%') {
        let mut width = 0;
        let mut chars = spec.chars();
        while let Some(c) = chars.next() {
            width += match c {
                '%' => match chars.next()? {
                    'Y' => 4,
                    'j' => 3,
                    'm' | 'd' | 'H' | 'M' | 'S' | 'y' => 2,
                    '%' => 1,
                    _ => return None,
                },
                _ => 1,
            };
        }
        return Some(width);
    }

    let digits = spec
        .strip_suffix(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(spec);

    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Byte offset after `n` characters of `s`.
fn char_offset(s: &str, n: usize) -> Option<usize> {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(n)
}

/// Recover the values of the fields in `pattern` from `resolved`.
///
/// Text in `resolved` before the first literal of the pattern is skipped, so a
/// relative pattern matches an absolute path. The last literal must end the
/// path. Fields without a separator between them must give a width in their
/// format spec (`{year:4d}{month:2d}`).
pub fn reverse_format(
    pattern: &str,
    resolved: &str,
) -> Result<BTreeMap<String, FieldValue>, SourceError> {
    let posix_pattern = make_posix(pattern);
    let posix_resolved = make_posix(resolved);

    let segments = parse(&posix_pattern)?;
    if !segments.iter().any(|s| matches!(s, Segment::Field { .. })) {
        return Ok(BTreeMap::new());
    }

    let mismatch = |reason: String| SourceError::PatternMismatch {
        pattern: pattern.to_string(),
        path: resolved.to_string(),
        reason,
    };

    let mut rest = posix_resolved.as_str();
    let mut pending: Option<(&str, &str)> = None;
    let mut values: Vec<(&str, &str, &str)> = Vec::new();
    let last = segments.len() - 1;

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Literal(l) => {
                let pos = if i == last {
                    rest.strip_suffix(l.as_str())
                        .map(str::len)
                        .ok_or_else(|| mismatch(format!("does not end with '{l}'")))?
                } else {
                    rest.find(l.as_str())
                        .ok_or_else(|| mismatch(format!("'{l}' not found")))?
                };

                if let Some((name, spec)) = pending.take() {
                    let value = &rest[..pos];
                    if value.is_empty() {
                        return Err(mismatch(format!("no value for field '{name}'")));
                    }
                    values.push((name, spec, value));
                }

                rest = &rest[pos + l.len()..];
            }
            Segment::Field { name, spec } => {
                if let Some((pname, pspec)) = pending.take() {
                    let width = field_width(pspec).ok_or_else(|| {
                        invalid(
                            pattern,
                            "format spec must give a width if there is no separator between fields",
                        )
                    })?;
                    let off = char_offset(rest, width)
                        .ok_or_else(|| mismatch(format!("too short for field '{pname}'")))?;

                    values.push((pname, pspec, &rest[..off]));
                    rest = &rest[off..];
                }
                pending = Some((name.as_str(), spec.as_str()));
            }
        }
    }

    if let Some((name, spec)) = pending {
        if rest.is_empty() {
            return Err(mismatch(format!("no value for field '{name}'")));
        }
        values.push((name, spec, rest));
    }

    Ok(values
        .into_iter()
        .map(|(name, spec, value)| (name.to_string(), FieldValue::convert(value, spec)))
        .collect())
}

//! Line decoder for the text links.
//!
//! Fields are positional and comma separated: battery lines are
//! `voltage,current,power`, GPS lines are `lat,lng`.

use model::{BatteryReading, GpsFix, LinkId, LinkKind, Reading};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected} fields, got {got} in {line:?}")]
    FieldCount { expected: usize, got: usize, line: String },
    #[error("field {index} is not a number: {value:?}")]
    InvalidNumber { index: usize, value: String },
}

/// Decode one line received on `link`. `observed_at` stamps GPS fixes.
pub fn parse_line(
    line: &str,
    kind: LinkKind,
    link: &LinkId,
    observed_at: OffsetDateTime,
) -> Result<Reading, ParseError> {
    let v = numeric_fields(line, kind.field_count())?;
    Ok(match kind {
        LinkKind::Battery => Reading::Battery(BatteryReading {
            voltage: v[0],
            current: v[1],
            power: v[2],
            source_link: link.clone(),
        }),
        LinkKind::Gps => Reading::Gps {
            link: link.clone(),
            fix: GpsFix { lat: v[0], lng: v[1], observed_at },
        },
    })
}

fn numeric_fields(line: &str, expected: usize) -> Result<Vec<f64>, ParseError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != expected {
        return Err(ParseError::FieldCount { expected, got: parts.len(), line: line.to_string() });
    }
    parts
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let raw = raw.trim();
            match raw.parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(x),
                _ => Err(ParseError::InvalidNumber { index, value: raw.to_string() }),
            }
        })
        .collect()
}

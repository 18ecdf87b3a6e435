use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ParseError, Result};
use crate::models::{Observation, Reading};
use crate::utils::constants::{DEFAULT_BUFFER_SIZE, MIN_LINE_LENGTH, MISSING_SENTINEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Stored in tenths of the unit, divided by 10
    Tenths,
    /// Stored as-is
    Units,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
    pub scale: Scale,
}

const fn field(name: &'static str, start: usize, end: usize, scale: Scale) -> FieldSpec {
    FieldSpec {
        name,
        start,
        end,
        scale,
    }
}

/// Half-open byte ranges of the twelve ISD-Lite fields.
pub const FIELD_LAYOUT: [FieldSpec; 12] = [
    field("year", 0, 4, Scale::Units),
    field("month", 5, 7, Scale::Units),
    field("day", 8, 10, Scale::Units),
    field("hour", 11, 13, Scale::Units),
    field("temperature", 14, 20, Scale::Tenths),
    field("dew_point", 21, 25, Scale::Tenths),
    field("pressure", 26, 31, Scale::Tenths),
    field("wind_direction", 32, 37, Scale::Units),
    field("wind_speed", 38, 43, Scale::Tenths),
    field("sky_condition", 44, 49, Scale::Units),
    field("precip_1h", 50, 55, Scale::Tenths),
    field("precip_6h", 56, 61, Scale::Tenths),
];

/// A decoded line plus its `year+month+day+hour` sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub key: String,
    pub observation: Observation,
}

/// Decode one fixed-width ISD-Lite line.
pub fn parse_line(line: &str) -> std::result::Result<ParsedLine, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() < MIN_LINE_LENGTH {
        return Err(ParseError::ShortLine {
            length: line.len(),
            required: MIN_LINE_LENGTH,
        });
    }

    let mut raw = [""; 12];
    for (slot, layout) in raw.iter_mut().zip(FIELD_LAYOUT.iter()) {
        *slot = line
            .get(layout.start..layout.end)
            .ok_or(ParseError::NonAscii { field: layout.name })?
            .trim();
    }

    let key = format!("{}{}{}{}", raw[0], raw[1], raw[2], raw[3]);

    let observation = Observation {
        year: parse_calendar(raw[0], &FIELD_LAYOUT[0])?,
        month: parse_calendar(raw[1], &FIELD_LAYOUT[1])?,
        day: parse_calendar(raw[2], &FIELD_LAYOUT[2])?,
        hour: parse_calendar(raw[3], &FIELD_LAYOUT[3])?,
        temperature: parse_scaled(raw[4], &FIELD_LAYOUT[4])?,
        dew_point: parse_scaled(raw[5], &FIELD_LAYOUT[5])?,
        pressure: parse_scaled(raw[6], &FIELD_LAYOUT[6])?,
        wind_direction: parse_integral(raw[7], &FIELD_LAYOUT[7])?,
        wind_speed: parse_scaled(raw[8], &FIELD_LAYOUT[8])?,
        sky_condition: parse_integral(raw[9], &FIELD_LAYOUT[9])?,
        precip_1h: parse_scaled(raw[10], &FIELD_LAYOUT[10])?,
        precip_6h: parse_scaled(raw[11], &FIELD_LAYOUT[11])?,
    };

    Ok(ParsedLine { key, observation })
}

fn invalid(layout: &FieldSpec, value: &str) -> ParseError {
    ParseError::InvalidNumber {
        field: layout.name,
        value: value.to_string(),
    }
}

fn parse_calendar<T: std::str::FromStr>(
    value: &str,
    layout: &FieldSpec,
) -> std::result::Result<T, ParseError> {
    value.parse::<T>().map_err(|_| invalid(layout, value))
}

fn parse_scaled(value: &str, layout: &FieldSpec) -> std::result::Result<Reading<f64>, ParseError> {
    // Sentinel check runs on the raw text, never on the scaled number
    if value == MISSING_SENTINEL {
        return Ok(Reading::Missing);
    }

    let number = value.parse::<f64>().map_err(|_| invalid(layout, value))?;
    if !number.is_finite() {
        return Err(invalid(layout, value));
    }

    Ok(Reading::Observed(match layout.scale {
        Scale::Tenths => number / 10.0,
        Scale::Units => number,
    }))
}

fn parse_integral(value: &str, layout: &FieldSpec) -> std::result::Result<Reading<i32>, ParseError> {
    if value == MISSING_SENTINEL {
        return Ok(Reading::Missing);
    }
    value
        .parse::<i32>()
        .map(Reading::Observed)
        .map_err(|_| invalid(layout, value))
}

/// Outcome of reading one non-blank line from a station file.
#[derive(Debug)]
pub enum LineOutcome {
    Parsed(ParsedLine),
    Rejected { line: u64, error: ParseError },
}

/// Streams decoded lines out of a gzip-compressed station file.
pub struct IsdLiteReader<R: BufRead> {
    reader: R,
    line_number: u64,
    buffer: Vec<u8>,
}

impl IsdLiteReader<BufReader<MultiGzDecoder<File>>> {
    /// Open a station file. The gzip header is read eagerly so a file that
    /// is not gzip fails here rather than on the first line.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, MultiGzDecoder::new(file));
        reader.fill_buf()?;
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> IsdLiteReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buffer: Vec::with_capacity(128),
        }
    }
}

impl<R: BufRead> Iterator for IsdLiteReader<R> {
    type Item = Result<LineOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    let line = String::from_utf8_lossy(&self.buffer);
                    if line.trim().is_empty() {
                        continue;
                    }
                    let outcome = match parse_line(&line) {
                        Ok(parsed) => LineOutcome::Parsed(parsed),
                        Err(error) => LineOutcome::Rejected {
                            line: self.line_number,
                            error,
                        },
                    };
                    return Some(Ok(outcome));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

use csv::StringRecord;
use std::str::FromStr;

use crate::error::{ProcessingError, Result};
use crate::models::{Observation, Reading, StationId};
use crate::utils::constants::MERGED_FIELD_COUNT;

/// Column order of a merged archive line.
pub const MERGED_COLUMNS: [&str; MERGED_FIELD_COUNT] = [
    "station_id",
    "year",
    "month",
    "day",
    "hour",
    "temperature",
    "dew_point",
    "pressure",
    "wind_direction",
    "wind_speed",
    "sky_condition",
    "precip_1h",
    "precip_6h",
];

/// A station-tagged observation, the unit written to and read back from a
/// yearly archive.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub station_id: StationId,
    pub observation: Observation,
}

impl MergedRecord {
    pub fn new(station_id: StationId, observation: Observation) -> Self {
        Self {
            station_id,
            observation,
        }
    }

    /// Render the 13 archive fields in column order.
    pub fn csv_fields(&self) -> [String; MERGED_FIELD_COUNT] {
        let o = &self.observation;
        [
            self.station_id.to_string(),
            format!("{:04}", o.year),
            format!("{:02}", o.month),
            format!("{:02}", o.day),
            format!("{:02}", o.hour),
            o.temperature.to_string(),
            o.dew_point.to_string(),
            o.pressure.to_string(),
            o.wind_direction.to_string(),
            o.wind_speed.to_string(),
            o.sky_condition.to_string(),
            o.precip_1h.to_string(),
            o.precip_6h.to_string(),
        ]
    }

    pub fn to_csv_line(&self) -> String {
        self.csv_fields().join(",")
    }

    /// Decode an archive record. `line` is only used for error reporting.
    ///
    /// A scaled field written as a bare `0` can only have come from the
    /// sentinel, so it decodes back to `Reading::Missing`. Integral fields
    /// cannot make that distinction and decode as `Observed(0)`.
    pub fn from_csv_record(record: &StringRecord, line: u64) -> Result<Self> {
        if record.len() != MERGED_FIELD_COUNT {
            return Err(ProcessingError::RecordShape {
                line,
                expected: MERGED_FIELD_COUNT,
                found: record.len(),
            });
        }

        let field = |i: usize| record.get(i).unwrap_or_default().trim();

        let station_id = StationId::from_str(field(0)).map_err(|e| {
            ProcessingError::InvalidRecord {
                line,
                reason: e.to_string(),
            }
        })?;

        let observation = Observation {
            year: parse_number(field(1), MERGED_COLUMNS[1], line)?,
            month: parse_number(field(2), MERGED_COLUMNS[2], line)?,
            day: parse_number(field(3), MERGED_COLUMNS[3], line)?,
            hour: parse_number(field(4), MERGED_COLUMNS[4], line)?,
            temperature: parse_scaled(field(5), MERGED_COLUMNS[5], line)?,
            dew_point: parse_scaled(field(6), MERGED_COLUMNS[6], line)?,
            pressure: parse_scaled(field(7), MERGED_COLUMNS[7], line)?,
            wind_direction: Reading::Observed(parse_number(field(8), MERGED_COLUMNS[8], line)?),
            wind_speed: parse_scaled(field(9), MERGED_COLUMNS[9], line)?,
            sky_condition: Reading::Observed(parse_number(field(10), MERGED_COLUMNS[10], line)?),
            precip_1h: parse_scaled(field(11), MERGED_COLUMNS[11], line)?,
            precip_6h: parse_scaled(field(12), MERGED_COLUMNS[12], line)?,
        };

        Ok(Self {
            station_id,
            observation,
        })
    }
}

fn parse_number<T: FromStr>(value: &str, column: &str, line: u64) -> Result<T> {
    value.parse::<T>().map_err(|_| ProcessingError::InvalidRecord {
        line,
        reason: format!("{} is not a valid number: '{}'", column, value),
    })
}

fn parse_scaled(value: &str, column: &str, line: u64) -> Result<Reading<f64>> {
    if value == "0" {
        return Ok(Reading::Missing);
    }
    parse_number::<f64>(value, column, line).map(Reading::Observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record() -> MergedRecord {
        MergedRecord::new(
            StationId::new("032040", "99999"),
            Observation {
                year: 2005,
                month: 1,
                day: 1,
                hour: 0,
                temperature: Reading::Observed(12.3),
                dew_point: Reading::Observed(4.5),
                pressure: Reading::Observed(1013.2),
                wind_direction: Reading::Observed(180),
                wind_speed: Reading::Observed(5.2),
                sky_condition: Reading::Observed(4),
                precip_1h: Reading::Observed(0.0),
                precip_6h: Reading::Missing,
            },
        )
    }

    #[test]
    fn test_csv_line_rendering() {
        assert_eq!(
            record().to_csv_line(),
            "032040:99999,2005,01,01,00,12.3,4.5,1013.2,180,5.2,4,0.0,0"
        );
    }

    #[test]
    fn test_decode_restores_typed_values() {
        let line = record().to_csv_line();
        let fields = StringRecord::from(line.split(',').collect::<Vec<_>>());
        let decoded = MergedRecord::from_csv_record(&fields, 1).unwrap();
        assert_eq!(decoded, record());
    }

    #[test]
    fn test_short_record_is_shape_error() {
        let fields = StringRecord::from(vec!["032040:99999", "2005", "01", "01"]);
        match MergedRecord::from_csv_record(&fields, 7) {
            Err(ProcessingError::RecordShape {
                line,
                expected,
                found,
            }) => {
                assert_eq!(line, 7);
                assert_eq!(expected, 13);
                assert_eq!(found, 4);
            }
            other => panic!("expected RecordShape, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_field_is_invalid_record() {
        let mut fields: Vec<String> = record().csv_fields().to_vec();
        fields[7] = "high".to_string();
        let fields = StringRecord::from(fields);
        let err = MergedRecord::from_csv_record(&fields, 3).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidRecord { line: 3, .. }));
        assert!(err.to_string().contains("pressure"));
    }
}

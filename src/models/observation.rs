use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// A measured value, or the "no reading" marker that ISD-Lite writes as `-9999`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Observed(T),
    Missing,
}

impl<T: Copy + Default> Reading<T> {
    /// Numeric value of the reading. `Missing` resolves to zero.
    pub fn value(&self) -> T {
        match self {
            Reading::Observed(v) => *v,
            Reading::Missing => T::default(),
        }
    }
}

impl fmt::Display for Reading<f64> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Debug keeps the decimal point on whole numbers: 0.0, 18.0
            Reading::Observed(v) => write!(f, "{:?}", v),
            Reading::Missing => f.write_str("0"),
        }
    }
}

impl fmt::Display for Reading<i32> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Observed(v) => write!(f, "{}", v),
            Reading::Missing => f.write_str("0"),
        }
    }
}

/// One hourly ISD-Lite observation with scaling already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    /// Air temperature, degrees Celsius
    pub temperature: Reading<f64>,
    /// Dew point, degrees Celsius
    pub dew_point: Reading<f64>,
    /// Sea level pressure, hectopascals
    pub pressure: Reading<f64>,
    /// Wind direction, angular degrees
    pub wind_direction: Reading<i32>,
    /// Wind speed, metres per second
    pub wind_speed: Reading<f64>,
    /// Sky condition total coverage code
    pub sky_condition: Reading<i32>,
    /// Liquid precipitation over one hour, millimetres
    pub precip_1h: Reading<f64>,
    /// Liquid precipitation over six hours, millimetres
    pub precip_6h: Reading<f64>,
}

impl Observation {
    /// Timestamp of the observation, if the calendar fields form a real hour.
    pub fn observed_at(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|date| date.and_hms_opt(self.hour, 0, 0))
    }
}

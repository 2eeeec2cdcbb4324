/*
 * format.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Culture-dependent number and date formatting.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{LiquidError, LiquidResult};

/// Date/time pattern of the invariant provider.
pub const INVARIANT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number and date conventions for a render.
///
/// The invariant provider uses `.` as the decimal separator. Float
/// literals in markup are parsed with the provider's separator first and
/// the invariant separator second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatProvider {
    pub decimal_separator: char,
    /// strftime pattern used when a date/time value is rendered directly.
    pub datetime_format: String,
}

impl Default for FormatProvider {
    fn default() -> Self {
        Self::invariant()
    }
}

impl FormatProvider {
    pub fn invariant() -> Self {
        FormatProvider {
            decimal_separator: '.',
            datetime_format: INVARIANT_DATETIME_FORMAT.to_string(),
        }
    }

    pub fn with_decimal_separator(separator: char) -> Self {
        FormatProvider {
            decimal_separator: separator,
            ..Self::invariant()
        }
    }

    pub fn format_float(&self, value: f64) -> String {
        let text = value.to_string();
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }

    /// Format with `datetime_format`. An invalid strftime pattern is an
    /// argument error.
    pub fn format_datetime(&self, value: &DateTime<FixedOffset>) -> LiquidResult<String> {
        strftime(value, &self.datetime_format)
    }

    /// Parse a float literal, trying this provider's separator before the
    /// invariant one.
    pub fn parse_float(&self, text: &str) -> Option<f64> {
        if self.decimal_separator != '.' {
            let local = text.replace(self.decimal_separator, ".");
            if local.matches('.').count() <= 1
                && let Ok(value) = local.parse::<f64>()
            {
                return Some(value);
            }
        }
        text.parse::<f64>().ok()
    }
}

/// Format `value` with a strftime `pattern`, failing on invalid patterns.
pub fn strftime(value: &DateTime<FixedOffset>, pattern: &str) -> LiquidResult<String> {
    let mut formatted = String::new();
    write!(formatted, "{}", value.format(pattern))
        .map_err(|_| LiquidError::argument(format!("Invalid date format '{}'", pattern)))?;
    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_invariant_float_formatting() {
        let format = FormatProvider::invariant();
        assert_eq!(format.format_float(2.5), "2.5");
        assert_eq!(format.format_float(100.0), "100");
    }

    #[test]
    fn test_parse_float_prefers_local_separator() {
        let format = FormatProvider::with_decimal_separator(',');
        assert_eq!(format.parse_float("3,5"), Some(3.5));
        assert_eq!(format.parse_float("3.5"), Some(3.5));
        assert_eq!(format.parse_float("1,2,3"), None);
    }

    fn may_fifth() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2006, 5, 5, 10, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_datetime_formatting() {
        assert_eq!(
            FormatProvider::invariant().format_datetime(&may_fifth()).unwrap(),
            "2006-05-05 10:00:00"
        );
    }

    #[test]
    fn test_invalid_datetime_pattern_is_an_error() {
        let format = FormatProvider {
            datetime_format: "%Q".to_string(),
            ..FormatProvider::invariant()
        };
        assert_eq!(
            format.format_datetime(&may_fifth()),
            Err(LiquidError::argument("Invalid date format '%Q'"))
        );
    }
}

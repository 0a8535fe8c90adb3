//! Decoding of compact `YYDDD` detection date codes.

use chrono::{Days, NaiveDate};
use thiserror::Error;

/// Errors that can occur while decoding a date code.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DateError {
    #[error("date code {0} cannot be represented as a calendar date")]
    OutOfRange(i64),
}

/// Decode a `YYDDD` code into a calendar date.
///
/// `YY` is the year offset from 2000 and `DDD` the 1-based day of year. The
/// day is added to January 1st with plain calendar arithmetic, so a day past
/// the end of the year rolls into the next one (`19366` is 2020-01-01).
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use clearcut_clusters::core::dates::decode_date_code;
///
/// let date = decode_date_code(19032).unwrap();
/// assert_eq!(date, NaiveDate::from_ymd_opt(2019, 2, 1).unwrap());
/// ```
pub fn decode_date_code(code: i64) -> Result<NaiveDate, DateError> {
    if code < 0 {
        return Err(DateError::OutOfRange(code));
    }

    let year = i32::try_from(2000 + code / 1000).map_err(|_| DateError::OutOfRange(code))?;
    let day_of_year = (code % 1000) as u64;

    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(DateError::OutOfRange(code))?;

    // DDD == 0 lands on December 31st of the previous year
    if day_of_year == 0 {
        return jan_first
            .checked_sub_days(Days::new(1))
            .ok_or(DateError::OutOfRange(code));
    }

    jan_first
        .checked_add_days(Days::new(day_of_year - 1))
        .ok_or(DateError::OutOfRange(code))
}

/// Absolute number of days between two dates.
#[inline]
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_decode_known_codes() {
        assert_eq!(decode_date_code(19032).unwrap(), ymd(2019, 2, 1));
        assert_eq!(decode_date_code(20001).unwrap(), ymd(2020, 1, 1));
        assert_eq!(decode_date_code(1).unwrap(), ymd(2000, 1, 1));
    }

    #[test]
    fn test_decode_leap_year() {
        assert_eq!(decode_date_code(20060).unwrap(), ymd(2020, 2, 29));
        assert_eq!(decode_date_code(20366).unwrap(), ymd(2020, 12, 31));
    }

    #[test]
    fn test_decode_rolls_into_next_year() {
        assert_eq!(decode_date_code(19366).unwrap(), ymd(2020, 1, 1));
        assert_eq!(decode_date_code(21999).unwrap(), ymd(2023, 9, 26));
    }

    #[test]
    fn test_decode_day_zero() {
        assert_eq!(decode_date_code(20000).unwrap(), ymd(2019, 12, 31));
    }

    #[test]
    fn test_decode_negative_code() {
        assert_eq!(decode_date_code(-5), Err(DateError::OutOfRange(-5)));
    }

    #[test]
    fn test_days_between_is_symmetric() {
        let a = ymd(2019, 2, 1);
        let b = ymd(2019, 3, 1);
        assert_eq!(days_between(a, b), 28);
        assert_eq!(days_between(b, a), 28);
    }
}

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::fmt;

/// Expiration targeted by the chain request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    pub date: NaiveDate,
    /// Expires on the day it is fetched
    pub is_zero_dte: bool,
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))
    }
}

/// Weekly expirations fall on Wednesday and Friday: those days use same-day
/// contracts, any other day rolls forward to the next one
pub fn next_expiration(today: NaiveDate) -> Expiration {
    let days_ahead = match today.weekday() {
        Weekday::Wed | Weekday::Fri => 0,
        Weekday::Mon => 2,
        Weekday::Tue => 1,
        Weekday::Thu => 1,
        Weekday::Sat => 4,
        Weekday::Sun => 3,
    };

    Expiration {
        date: today + Duration::days(days_ahead),
        is_zero_dte: days_ahead == 0,
    }
}

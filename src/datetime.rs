use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::warn;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

#[derive(thiserror::Error, Debug)]
pub enum DatetimeError {
    #[error("could not parse datetime `{0}`")]
    UnparseableDatetime(String),
    #[error("could not parse duration `{0}`")]
    UnparseableDuration(String),
}

/// Granularity of datetimes and durations, ordered coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeUnit {
    /// The coarser of two units.
    pub fn coarser(self, other: TimeUnit) -> TimeUnit {
        self.min(other)
    }
}

/// A point in time carrying the unit it is trusted at.
///
/// Arithmetic on year and month granularity is calendar based, finer
/// granularities go through [chrono::Duration]. Derived comparisons work on
/// the raw instant; callers align units with [TimePoint::cast] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimePoint {
    instant: NaiveDateTime,
    unit: TimeUnit,
}

impl TimePoint {
    pub fn new(instant: NaiveDateTime, unit: TimeUnit) -> Self {
        Self { instant, unit }
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Relabel to `unit`, truncating fields below it. Conversions never add
    /// precision; losing precision is logged.
    pub fn cast(&self, unit: TimeUnit) -> TimePoint {
        if unit == self.unit {
            return *self;
        }
        if unit < self.unit {
            warn!("casting datetime {self} to coarser unit {unit:?}");
        }
        let date = self.instant.date();
        let instant = match unit {
            TimeUnit::Year => first_instant(date.year(), 1, 1),
            TimeUnit::Month => first_instant(date.year(), date.month(), 1),
            TimeUnit::Day => date.and_hms_opt(0, 0, 0).unwrap(),
            TimeUnit::Hour => date.and_hms_opt(self.instant.hour(), 0, 0).unwrap(),
            TimeUnit::Minute => date
                .and_hms_opt(self.instant.hour(), self.instant.minute(), 0)
                .unwrap(),
            TimeUnit::Second => self.instant,
        };
        TimePoint { instant, unit }
    }

    /// Number of whole `unit`s from `earlier` to `self` (negative when
    /// `self` lies before `earlier`).
    pub fn units_since(&self, earlier: &TimePoint, unit: TimeUnit) -> i64 {
        match unit {
            TimeUnit::Year => i64::from(self.instant.year() - earlier.instant.year()),
            TimeUnit::Month => {
                i64::from(self.instant.year() - earlier.instant.year()) * 12
                    + i64::from(self.instant.month() as i32 - earlier.instant.month() as i32)
            }
            TimeUnit::Day => (self.instant - earlier.instant).num_days(),
            TimeUnit::Hour => (self.instant - earlier.instant).num_hours(),
            TimeUnit::Minute => (self.instant - earlier.instant).num_minutes(),
            TimeUnit::Second => (self.instant - earlier.instant).num_seconds(),
        }
    }

    /// Advance by `n` times `unit`, keeping the unit label.
    pub fn add_units(&self, n: i64, unit: TimeUnit) -> TimePoint {
        let instant = match unit {
            TimeUnit::Year => {
                let date = self.instant.date();
                let year = date.year() + n as i32;
                let day = date.day().min(days_in_month(year, date.month()));
                first_instant(year, date.month(), day) + time_of_day(&self.instant)
            }
            TimeUnit::Month => {
                let date = self.instant.date();
                let months = i64::from(date.year()) * 12 + i64::from(date.month()) - 1 + n;
                let year = months.div_euclid(12) as i32;
                let month = months.rem_euclid(12) as u32 + 1;
                let day = date.day().min(days_in_month(year, month));
                first_instant(year, month, day) + time_of_day(&self.instant)
            }
            TimeUnit::Day => self.instant + chrono::Duration::days(n),
            TimeUnit::Hour => self.instant + chrono::Duration::hours(n),
            TimeUnit::Minute => self.instant + chrono::Duration::minutes(n),
            TimeUnit::Second => self.instant + chrono::Duration::seconds(n),
        };
        TimePoint {
            instant,
            unit: self.unit,
        }
    }
}

fn first_instant(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn time_of_day(instant: &NaiveDateTime) -> chrono::Duration {
    *instant - instant.date().and_hms_opt(0, 0, 0).unwrap()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.unit {
            TimeUnit::Year => "%Y",
            TimeUnit::Month => "%Y-%m",
            TimeUnit::Day => "%Y-%m-%d",
            TimeUnit::Hour => "%Y-%m-%dT%H",
            TimeUnit::Minute => "%Y-%m-%dT%H:%M",
            TimeUnit::Second => "%Y-%m-%dT%H:%M:%S",
        };
        write!(f, "{}", self.instant.format(pattern))
    }
}

impl FromStr for TimePoint {
    type Err = DatetimeError;

    /// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DDTHH`,
    /// `…THH:MM` and `…THH:MM:SS`; the unit follows the precision given.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let fail = || DatetimeError::UnparseableDatetime(s.to_string());
        if let Some((date_part, time_part)) = s.split_once('T') {
            let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| fail())?;
            let fields: Vec<&str> = time_part.split(':').collect();
            let mut clock = [0u32; 3];
            if fields.is_empty() || fields.len() > 3 {
                return Err(fail());
            }
            for (slot, field) in clock.iter_mut().zip(&fields) {
                *slot = field.parse().map_err(|_| fail())?;
            }
            let unit = match fields.len() {
                1 => TimeUnit::Hour,
                2 => TimeUnit::Minute,
                _ => TimeUnit::Second,
            };
            let instant = date
                .and_hms_opt(clock[0], clock[1], clock[2])
                .ok_or_else(fail)?;
            Ok(TimePoint { instant, unit })
        } else {
            let fields: Vec<&str> = s.split('-').collect();
            let mut ymd = [1i32, 1, 1];
            if fields.is_empty() || fields.len() > 3 {
                return Err(fail());
            }
            for (slot, field) in ymd.iter_mut().zip(&fields) {
                *slot = field.parse().map_err(|_| fail())?;
            }
            let unit = match fields.len() {
                1 => TimeUnit::Year,
                2 => TimeUnit::Month,
                _ => TimeUnit::Day,
            };
            let date =
                NaiveDate::from_ymd_opt(ymd[0], ymd[1] as u32, ymd[2] as u32).ok_or_else(fail)?;
            Ok(TimePoint {
                instant: date.and_hms_opt(0, 0, 0).unwrap(),
                unit,
            })
        }
    }
}

impl Serialize for TimePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimePoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A step width such as `P1D` or `PT6H`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDuration {
    pub count: i64,
    pub unit: TimeUnit,
}

impl TimeDuration {
    pub fn new(count: i64, unit: TimeUnit) -> Self {
        Self { count, unit }
    }

    /// Whole steps between two datetimes, floored. Both ends are compared at
    /// this duration's unit.
    pub fn steps_between(&self, t0: &TimePoint, t1: &TimePoint) -> i64 {
        let a = t0.cast(self.unit);
        let b = t1.cast(self.unit);
        b.units_since(&a, self.unit).div_euclid(self.count)
    }

    /// The span from `t0` to `t1` expressed at the coarser of their units.
    /// Never shorter than one unit, so a span can always serve as a step.
    pub fn between(t0: &TimePoint, t1: &TimePoint) -> TimeDuration {
        let unit = t0.unit().coarser(t1.unit());
        let count = t1.cast(unit).units_since(&t0.cast(unit), unit).max(1);
        TimeDuration { count, unit }
    }
}

impl fmt::Display for TimeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            TimeUnit::Year => write!(f, "P{}Y", self.count),
            TimeUnit::Month => write!(f, "P{}M", self.count),
            TimeUnit::Day => write!(f, "P{}D", self.count),
            TimeUnit::Hour => write!(f, "PT{}H", self.count),
            TimeUnit::Minute => write!(f, "PT{}M", self.count),
            TimeUnit::Second => write!(f, "PT{}S", self.count),
        }
    }
}

impl FromStr for TimeDuration {
    type Err = DatetimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = || DatetimeError::UnparseableDuration(s.to_string());
        let rest = s.trim().strip_prefix('P').ok_or_else(fail)?;
        let (rest, in_time_section) = match rest.strip_prefix('T') {
            Some(r) => (r, true),
            None => (rest, false),
        };
        if rest.len() < 2 {
            return Err(fail());
        }
        let (digits, designator) = rest.split_at(rest.len() - 1);
        let count: i64 = digits.parse().map_err(|_| fail())?;
        let unit = match (in_time_section, designator) {
            (false, "Y") => TimeUnit::Year,
            (false, "M") => TimeUnit::Month,
            (false, "D") => TimeUnit::Day,
            (true, "H") => TimeUnit::Hour,
            (true, "M") => TimeUnit::Minute,
            (true, "S") => TimeUnit::Second,
            _ => return Err(fail()),
        };
        Ok(TimeDuration { count, unit })
    }
}

impl Serialize for TimeDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_infers_unit_from_precision() {
        assert_eq!("2020".parse::<TimePoint>().unwrap().unit(), TimeUnit::Year);
        assert_eq!(
            "2020-03".parse::<TimePoint>().unwrap().unit(),
            TimeUnit::Month
        );
        assert_eq!(
            "2020-03-05".parse::<TimePoint>().unwrap().unit(),
            TimeUnit::Day
        );
        assert_eq!(
            "2020-03-05T14".parse::<TimePoint>().unwrap().unit(),
            TimeUnit::Hour
        );
        assert_eq!(
            "2020-03-05T14:30:59".parse::<TimePoint>().unwrap().unit(),
            TimeUnit::Second
        );
        assert!("2020-13-05".parse::<TimePoint>().is_err());
        assert!("abc".parse::<TimePoint>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for s in ["2020", "2020-03", "2020-03-05", "2020-03-05T14:30"] {
            assert_eq!(s.parse::<TimePoint>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn cast_truncates() {
        let t = "2020-03-05T14:30:59".parse::<TimePoint>().unwrap();
        assert_eq!(t.cast(TimeUnit::Month).to_string(), "2020-03");
        assert_eq!(t.cast(TimeUnit::Day).to_string(), "2020-03-05");
        assert_eq!(t.cast(TimeUnit::Hour).to_string(), "2020-03-05T14");
    }

    #[test]
    fn units_since_by_calendar() {
        let a = "2020-01-31".parse::<TimePoint>().unwrap();
        let b = "2021-03-01".parse::<TimePoint>().unwrap();
        assert_eq!(b.units_since(&a, TimeUnit::Year), 1);
        assert_eq!(b.units_since(&a, TimeUnit::Month), 14);
        assert_eq!(b.units_since(&a, TimeUnit::Day), 395);
        assert_eq!(a.units_since(&b, TimeUnit::Day), -395);
    }

    #[test]
    fn add_units_clamps_month_ends() {
        let t = "2020-01-31".parse::<TimePoint>().unwrap();
        assert_eq!(t.add_units(1, TimeUnit::Month).to_string(), "2020-02-29");
        assert_eq!(t.add_units(13, TimeUnit::Month).to_string(), "2021-02-28");
        assert_eq!(t.add_units(2, TimeUnit::Day).to_string(), "2020-02-02");
    }

    #[test]
    fn duration_parse_and_steps() {
        let dt: TimeDuration = "P16D".parse().unwrap();
        assert_eq!(dt, TimeDuration::new(16, TimeUnit::Day));
        assert_eq!("PT6H".parse::<TimeDuration>().unwrap().unit, TimeUnit::Hour);
        assert!("P16".parse::<TimeDuration>().is_err());
        assert!("16D".parse::<TimeDuration>().is_err());

        let t0 = "2020-01-01".parse::<TimePoint>().unwrap();
        let t1 = "2020-02-02".parse::<TimePoint>().unwrap();
        assert_eq!(dt.steps_between(&t0, &t1), 2);
        // finer instants are floored into the step grid
        let late = "2020-01-16T23:59:59".parse::<TimePoint>().unwrap();
        assert_eq!(dt.steps_between(&t0, &late), 0);
        let before = "2019-12-31".parse::<TimePoint>().unwrap();
        assert_eq!(dt.steps_between(&t0, &before), -1);
    }

    #[test]
    fn span_between_is_at_least_one_unit() {
        let t0 = "2020-01-01".parse::<TimePoint>().unwrap();
        let t1 = "2020-01-01".parse::<TimePoint>().unwrap();
        assert_eq!(TimeDuration::between(&t0, &t1).count, 1);
        let t2 = "2020-04-01".parse::<TimePoint>().unwrap();
        assert_eq!(
            TimeDuration::between(&t0, &t2),
            TimeDuration::new(91, TimeUnit::Day)
        );
    }
}

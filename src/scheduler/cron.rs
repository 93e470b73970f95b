use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::errors::LanternError;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Give up searching after this many years without a match (e.g. `30 2 *`).
const SEARCH_YEARS: i32 = 5;

/// A parsed five-field cron expression (`minute hour day-of-month month day-of-week`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minutes: u64,
    hours: u32,
    days_of_month: u32,
    months: u16,
    days_of_week: u8,
    /// Both day fields restricted: a day matches when either does.
    day_or: bool,
    dom_any: bool,
    dow_any: bool,
}

#[derive(Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Index of `names[0]`.
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], name_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], name_base: 0 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], name_base: 0 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES, name_base: 1 };
// 7 is accepted as a second spelling of Sunday
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7, names: &DAY_NAMES, name_base: 0 };

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, LanternError> {
        let trimmed = expr.trim();
        let expanded = match trimmed.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other if other.starts_with('@') => {
                return Err(LanternError::Cron(format!("unknown macro '{}'", trimmed)));
            }
            _ => trimmed,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(LanternError::Cron(format!(
                "expected 5 fields, got {} in '{}'",
                fields.len(),
                trimmed
            )));
        };

        let mut days_of_week = parse_field(dow, DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }
        let dom_any = dom.starts_with('*');
        let dow_any = dow.starts_with('*');

        Ok(Self {
            minutes: parse_field(minute, MINUTE)?,
            hours: parse_field(hour, HOUR)? as u32,
            days_of_month: parse_field(dom, DAY_OF_MONTH)? as u32,
            months: parse_field(month, MONTH)? as u16,
            days_of_week: days_of_week as u8,
            day_or: !dom_any && !dow_any,
            dom_any,
            dow_any,
        })
    }

    /// First instant strictly after `after` matching the expression, at
    /// minute resolution. `None` if nothing matches within a few years.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let give_up = start.year() + SEARCH_YEARS;
        let mut t = start;

        while t.year() <= give_up {
            if !self.month_matches(t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = (t.date() + Duration::days(1)).and_hms_opt(0, 0, 0)?;
                continue;
            }
            if self.hours & (1 << t.hour()) == 0 {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if self.minutes & (1 << t.minute()) == 0 {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
        None
    }

    /// Latest matching instant in `(after, until]`, if any.
    pub fn latest_between(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut latest = None;
        let mut cursor = after;
        while let Some(due) = self.next_after(cursor) {
            if due > until {
                break;
            }
            latest = Some(due);
            cursor = due;
        }
        latest
    }

    fn month_matches(&self, month: u32) -> bool {
        self.months & (1 << month) != 0
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month & (1 << date.day()) != 0;
        let dow = self.days_of_week & (1 << date.weekday().num_days_from_sunday()) != 0;
        if self.day_or {
            dom || dow
        } else if self.dom_any {
            dow
        } else if self.dow_any {
            dom
        } else {
            dom && dow
        }
    }
}

impl std::str::FromStr for CronExpr {
    type Err = LanternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronExpr::parse(s)
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Parse one field into a bitmask where bit N means value N matches.
fn parse_field(field: &str, spec: FieldSpec) -> Result<u64, LanternError> {
    let mut mask = 0u64;
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid(spec, item))?;
                if step == 0 {
                    return Err(invalid(spec, item));
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (lo, hi) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (value(a, spec)?, value(b, spec)?)
        } else {
            let start = value(range, spec)?;
            // `5/15` runs from 5 to the end of the range
            (start, if item.contains('/') { spec.max } else { start })
        };
        if lo > hi {
            return Err(invalid(spec, item));
        }
        mask |= (lo..=hi).step_by(step as usize).fold(0u64, |m, v| m | (1 << v));
    }
    Ok(mask)
}

fn value(token: &str, spec: FieldSpec) -> Result<u32, LanternError> {
    let parsed = match token.parse::<u32>() {
        Ok(n) => n,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .map(|i| i as u32 + spec.name_base)
            .ok_or_else(|| invalid(spec, token))?,
    };
    if parsed < spec.min || parsed > spec.max {
        return Err(LanternError::Cron(format!(
            "{} value {} outside {}-{}",
            spec.name, parsed, spec.min, spec.max
        )));
    }
    Ok(parsed)
}

fn invalid(spec: FieldSpec, token: &str) -> LanternError {
    LanternError::Cron(format!("invalid {} field '{}'", spec.name, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_every_minute_is_strictly_after() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        assert_eq!(expr.next_after(at(2024, 3, 1, 10, 0, 0)), Some(at(2024, 3, 1, 10, 1, 0)));
        assert_eq!(expr.next_after(at(2024, 3, 1, 10, 0, 59)), Some(at(2024, 3, 1, 10, 1, 0)));
    }

    #[test]
    fn test_steps_and_ranges() {
        let expr = CronExpr::parse("*/15 9-17 * * 1-5").unwrap();
        // Friday 17:50 rolls to Monday 09:00
        assert_eq!(expr.next_after(at(2024, 3, 1, 17, 50, 0)), Some(at(2024, 3, 4, 9, 0, 0)));
        assert_eq!(expr.next_after(at(2024, 3, 4, 9, 0, 0)), Some(at(2024, 3, 4, 9, 15, 0)));

        let offset = CronExpr::parse("5/20 * * * *").unwrap();
        assert_eq!(offset.next_after(at(2024, 3, 1, 10, 26, 0)), Some(at(2024, 3, 1, 10, 45, 0)));
    }

    #[test]
    fn test_names_and_sunday_seven() {
        let by_name = CronExpr::parse("0 0 1 jan,Jul *").unwrap();
        assert_eq!(by_name.next_after(at(2024, 2, 1, 0, 0, 0)), Some(at(2024, 7, 1, 0, 0, 0)));
        assert_eq!(CronExpr::parse("0 6 * * 7").unwrap(), CronExpr::parse("0 6 * * SUN").unwrap());
    }

    #[test]
    fn test_day_fields_combine_with_or() {
        // the 13th, or any Friday
        let expr = CronExpr::parse("0 0 13 * FRI").unwrap();
        assert_eq!(expr.next_after(at(2024, 9, 1, 0, 0, 0)), Some(at(2024, 9, 6, 0, 0, 0)));
        assert_eq!(expr.next_after(at(2024, 9, 6, 0, 0, 0)), Some(at(2024, 9, 13, 0, 0, 0)));
    }

    #[test]
    fn test_macros() {
        assert_eq!(CronExpr::parse("@daily").unwrap(), CronExpr::parse("0 0 * * *").unwrap());
        let hourly = CronExpr::parse("@hourly").unwrap();
        assert_eq!(hourly.next_after(at(2024, 12, 31, 23, 5, 0)), Some(at(2025, 1, 1, 0, 0, 0)));
        assert!(CronExpr::parse("@fortnightly").is_err());
    }

    #[test]
    fn test_leap_day() {
        let expr = CronExpr::parse("0 12 29 2 *").unwrap();
        assert_eq!(expr.next_after(at(2025, 1, 1, 0, 0, 0)), Some(at(2028, 2, 29, 12, 0, 0)));
        assert_eq!(CronExpr::parse("0 0 31 2 *").unwrap().next_after(at(2025, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "* * * *", "60 * * * *", "* 24 * * *", "* * 0 * *", "*/0 * * * *", "5-1 * * * *", "* * * FOO *"] {
            assert!(matches!(CronExpr::parse(bad), Err(LanternError::Cron(_))), "{bad}");
        }
    }

    #[test]
    fn test_latest_between() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        let latest = expr.latest_between(at(2024, 3, 1, 10, 0, 0), at(2024, 3, 1, 10, 10, 30));
        assert_eq!(latest, Some(at(2024, 3, 1, 10, 10, 0)));
        assert_eq!(expr.latest_between(at(2024, 3, 1, 10, 0, 0), at(2024, 3, 1, 10, 0, 59)), None);
    }
}

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

/// Time zone used to decide which calendar day an activity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarZone {
    /// The machine's local zone, DST included.
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl CalendarZone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Local calendar date of `instant`.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// Wall-clock time of `instant` in this zone.
    pub fn time_of(&self, instant: DateTime<Utc>) -> NaiveTime {
        match self {
            Self::Local => instant.with_timezone(&Local).time(),
            Self::Fixed(offset) => instant.with_timezone(offset).time(),
        }
    }

    /// First instant of `date` in this zone.
    ///
    /// When local midnight does not exist (a DST gap), the earliest valid
    /// instant after the gap is used.
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self {
            Self::Local => Local
                .from_local_datetime(&midnight)
                .earliest()
                .or_else(|| {
                    Local
                        .from_local_datetime(&(midnight + chrono::Duration::hours(1)))
                        .earliest()
                })
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
            Self::Fixed(offset) => offset
                .from_local_datetime(&midnight)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)),
        }
    }

    /// Half-open UTC range `[start, end)` covering the inclusive local date range.
    pub fn range_bounds(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start = from.map(|d| self.day_start(d));
        let end = to
            .and_then(|d| d.succ_opt())
            .map(|next| self.day_start(next));
        (start, end)
    }
}

impl fmt::Display for CalendarZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid calendar zone {0:?}: expected \"local\", \"utc\" or an offset like \"+09:00\"")]
pub struct CalendarZoneError(pub String);

impl FromStr for CalendarZone {
    type Err = CalendarZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "local" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::utc()),
            _ => {}
        }
        parse_offset(trimmed)
            .map(Self::Fixed)
            .ok_or_else(|| CalendarZoneError(trimmed.to_string()))
    }
}

/// Parse `+HH:MM`, `-HH:MM` or `+HHMM`.
fn parse_offset(input: &str) -> Option<FixedOffset> {
    let (sign, rest) = match input.as_bytes().first()? {
        b'+' => (1, &input[1..]),
        b'-' => (-1, &input[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_zone_moves_late_utc_into_next_day() {
        let zone: CalendarZone = "+09:00".parse().unwrap();
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 20, 30, 0).unwrap();
        assert_eq!(
            zone.date_of(instant),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );
        assert_eq!(
            CalendarZone::utc().date_of(instant),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn range_bounds_cover_whole_days() {
        let zone: CalendarZone = "-05:00".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (start, end) = zone.range_bounds(Some(day), Some(day));
        assert_eq!(start, Some(Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap()));
        assert_eq!(end, Some(Utc.with_ymd_and_hms(2024, 6, 2, 5, 0, 0).unwrap()));
    }

    #[test]
    fn parse_accepts_local_and_utc_and_rejects_garbage() {
        assert_eq!("local".parse::<CalendarZone>(), Ok(CalendarZone::Local));
        assert_eq!("UTC".parse::<CalendarZone>(), Ok(CalendarZone::utc()));
        assert!("mars/olympus".parse::<CalendarZone>().is_err());
    }
}

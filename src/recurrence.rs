use crate::errors::{AppError, AppResult};
use crate::models::{CalendarZone, Repetition};
use chrono::{DateTime, Days, Local, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};

// Steps taken one at a time before catch-up jumps in bulk. Four years always
// include a 28-day February, so a clamped month-end has settled by then.
const SINGLE_STEP_WARMUP: u64 = 48;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn advance(due: DateTime<Utc>, kind: Repetition) -> AppResult<DateTime<Utc>> {
    advance_in(due, kind, &Utc)
}

/// Monthly steps clamp to the last day of the target month. A shifted wall time
/// that does not exist in `tz` is stepped in UTC instead.
pub fn advance_in<Tz: TimeZone>(due: DateTime<Utc>, kind: Repetition, tz: &Tz) -> AppResult<DateTime<Utc>> {
    advance_by(due, kind, 1, tz)
}

pub fn advance_for_zone(due: DateTime<Utc>, kind: Repetition, zone: CalendarZone) -> AppResult<DateTime<Utc>> {
    advance_by_for_zone(due, kind, 1, zone)
}

/// Advances `due` until it lies strictly after `now`. Also returns how many
/// occurrences were passed over without being announced.
pub fn advance_past(
    due: DateTime<Utc>,
    kind: Repetition,
    now: DateTime<Utc>,
    zone: CalendarZone,
) -> AppResult<(DateTime<Utc>, u32)> {
    let mut next = advance_for_zone(due, kind, zone)?;
    let mut skipped = 0u64;
    while next <= now {
        let stride = if skipped < SINGLE_STEP_WARMUP {
            1
        } else {
            catch_up_stride(next, kind, now)
        };
        next = advance_by_for_zone(next, kind, stride, zone)?;
        skipped += stride;
    }
    Ok((next, u32::try_from(skipped).unwrap_or(u32::MAX)))
}

// Whole periods that certainly fit between `from` and `now`, with one period
// of slack so a DST shift or a short month never carries past `now`.
fn catch_up_stride(from: DateTime<Utc>, kind: Repetition, now: DateTime<Utc>) -> u64 {
    let gap_days = u64::try_from((now - from).num_days()).unwrap_or(0);
    let period_days = match kind {
        Repetition::Daily => 1,
        Repetition::Weekly => 7,
        Repetition::Monthly => 31,
        Repetition::None => return 1,
    };
    (gap_days / period_days).saturating_sub(1).max(1)
}

fn advance_by_for_zone(due: DateTime<Utc>, kind: Repetition, count: u64, zone: CalendarZone) -> AppResult<DateTime<Utc>> {
    match zone {
        CalendarZone::Local => advance_by(due, kind, count, &Local),
        CalendarZone::Utc => advance_by(due, kind, count, &Utc),
    }
}

fn advance_by<Tz: TimeZone>(due: DateTime<Utc>, kind: Repetition, count: u64, tz: &Tz) -> AppResult<DateTime<Utc>> {
    if !kind.is_recurring() {
        return Err(AppError::NotApplicable(
            "Repetition 'none' has no next occurrence".to_string(),
        ));
    }

    let next = shift_wall_clock(due, kind, count, tz)
        .or_else(|| shift_wall_clock(due, kind, count, &Utc))
        .ok_or_else(|| AppError::Internal(format!("Due date {} cannot be advanced {}", due, kind.as_str())))?;

    if next <= due {
        return Err(AppError::Internal(format!(
            "Advancing {} {} did not move forward",
            due,
            kind.as_str()
        )));
    }
    Ok(next)
}

fn shift_wall_clock<Tz: TimeZone>(due: DateTime<Utc>, kind: Repetition, count: u64, tz: &Tz) -> Option<DateTime<Utc>> {
    let wall = due.with_timezone(tz).naive_local();
    let shifted = match kind {
        Repetition::Daily => wall.checked_add_days(Days::new(count)),
        Repetition::Weekly => wall.checked_add_days(Days::new(count.checked_mul(7)?)),
        Repetition::Monthly => wall.checked_add_months(Months::new(u32::try_from(count).ok()?)),
        Repetition::None => None,
    }?;
    tz.from_local_datetime(&shifted)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
}

/// Accepts RFC 3339 instants, `YYYY-MM-DDTHH:MM[:SS]` wall-clock values and bare
/// `YYYY-MM-DD` dates (midnight). Values without an offset are read in `zone`.
pub fn parse_due_date(raw: &str, zone: CalendarZone) -> AppResult<DateTime<Utc>> {
    match zone {
        CalendarZone::Local => parse_due_date_in(raw, &Local),
        CalendarZone::Utc => parse_due_date_in(raw, &Utc),
    }
}

pub fn parse_due_date_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> AppResult<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::Validation("Due date is required".to_string()));
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| AppError::Validation(format!("Due date '{}' is not a valid date", value)))?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| AppError::Validation(format!("Due date '{}' does not exist on the local calendar", value)))
}

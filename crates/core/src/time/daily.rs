use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone};

/// `date` at `hour:00` in the timezone of `tz`. Falls forward one hour when the wall-clock
/// time does not exist (DST gap).
fn at_hour<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32) -> anyhow::Result<DateTime<Tz>> {
    let naive = date
        .and_hms_opt(hour, 0, 0)
        .with_context(|| format!("invalid schedule hour {hour}"))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .with_context(|| format!("{naive} does not exist in the local timezone"))
}

/// Today at `hour` if that is still ahead of `now`, otherwise tomorrow at `hour`.
pub fn next_fire_time<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> anyhow::Result<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let candidate = at_hour(&tz, today, hour)?;
    if candidate > *now {
        return Ok(candidate);
    }
    let tomorrow = today
        .succ_opt()
        .context("no day after today in calendar range")?;
    at_hour(&tz, tomorrow, hour)
}

/// True when `now` is at or up to `grace` past today's `hour`.
pub fn within_grace_window<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: u32,
    grace: Duration,
) -> anyhow::Result<bool> {
    let target = at_hour(&now.timezone(), now.date_naive(), hour)?;
    Ok(*now >= target && *now <= target + grace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn taipei(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    #[test]
    fn fires_today_when_hour_is_ahead() {
        let now = taipei(2026, 10, 19, 8, 30);
        assert_eq!(next_fire_time(&now, 10).unwrap(), taipei(2026, 10, 19, 10, 0));
    }

    #[test]
    fn fires_tomorrow_at_or_after_the_hour() {
        let at = taipei(2026, 10, 19, 10, 0);
        assert_eq!(next_fire_time(&at, 10).unwrap(), taipei(2026, 10, 20, 10, 0));

        let late = taipei(2026, 12, 31, 23, 59);
        assert_eq!(next_fire_time(&late, 10).unwrap(), taipei(2027, 1, 1, 10, 0));
    }

    #[test]
    fn grace_window_covers_the_first_minutes_after_the_hour() {
        let grace = Duration::minutes(5);
        assert!(within_grace_window(&taipei(2026, 10, 19, 10, 0), 10, grace).unwrap());
        assert!(within_grace_window(&taipei(2026, 10, 19, 10, 5), 10, grace).unwrap());
        assert!(!within_grace_window(&taipei(2026, 10, 19, 10, 6), 10, grace).unwrap());
        assert!(!within_grace_window(&taipei(2026, 10, 19, 9, 59), 10, grace).unwrap());
    }

    #[test]
    fn rejects_invalid_hour() {
        assert!(next_fire_time(&taipei(2026, 10, 19, 8, 0), 24).is_err());
    }
}

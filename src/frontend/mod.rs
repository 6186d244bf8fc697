use chrono::NaiveDateTime;

/// Compact relative timestamp for feed chrome: "just now", "5m", "3h", "2d",
/// then the calendar date once a week has passed.
pub fn relative_time(then: NaiveDateTime, now: NaiveDateTime) -> String {
    let delta = now - then;

    if delta < chrono::Duration::minutes(1) {
        return "just now".to_owned();
    }
    if delta < chrono::Duration::hours(1) {
        return format!("{}m", delta.num_minutes());
    }
    if delta < chrono::Duration::days(1) {
        return format!("{}h", delta.num_hours());
    }
    if delta < chrono::Duration::days(7) {
        return format!("{}d", delta.num_days());
    }

    then.format("%b %e, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd(2024, 3, 15).and_hms(12, 0, 0)
    }

    #[test]
    fn buckets_scale_with_age() {
        let now = base();
        assert_eq!(relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5m");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3h");
        assert_eq!(relative_time(now - Duration::days(2), now), "2d");
    }

    #[test]
    fn old_timestamps_render_the_date() {
        let now = base();
        let formatted = relative_time(now - Duration::days(30), now);
        assert!(formatted.contains("2024"), "got {}", formatted);
    }

    #[test]
    fn future_timestamps_clamp_to_just_now() {
        let now = base();
        assert_eq!(relative_time(now + Duration::minutes(2), now), "just now");
    }
}

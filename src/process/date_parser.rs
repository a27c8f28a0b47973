use chrono::NaiveDate;

/// Parse a `M/D/YY` column header (e.g. `1/22/20`) into a calendar date.
pub fn parse_column_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.trim().split('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year = parts.next()?;
    if parts.next().is_some() || year.len() != 2 {
        return None;
    }
    let yy: i32 = year.parse().ok()?;
    // %y pivot: 69-99 → 19xx, 00-68 → 20xx
    let year = if yy >= 69 { 1900 + yy } else { 2000 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}

//! Timestamp wire formats.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use mockstack_core::TimestampFormat;

/// Renders `time` in the given format.
#[must_use]
pub fn format(time: &DateTime<Utc>, format: TimestampFormat) -> String {
    match format {
        TimestampFormat::Iso8601 => time.to_rfc3339_opts(SecondsFormat::Millis, true),
        TimestampFormat::Rfc822 => time.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        TimestampFormat::UnixTimestamp => {
            let millis = time.timestamp_subsec_millis();
            if millis == 0 {
                time.timestamp().to_string()
            } else {
                format!("{}.{millis:03}", time.timestamp())
            }
        }
    }
}

/// Epoch seconds as a JSON number, fractional when sub-second.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn epoch_seconds(time: &DateTime<Utc>) -> serde_json::Number {
    let millis = time.timestamp_subsec_millis();
    if millis == 0 {
        serde_json::Number::from(time.timestamp())
    } else {
        let seconds = time.timestamp() as f64 + f64::from(millis) / 1000.0;
        serde_json::Number::from_f64(seconds).unwrap_or_else(|| time.timestamp().into())
    }
}

/// Parses `text`, trying the expected format first and then the others.
///
/// # Errors
///
/// Returns a description of the problem when no format matches.
pub fn parse(text: &str, expected: TimestampFormat) -> Result<DateTime<Utc>, String> {
    let order: [fn(&str) -> Option<DateTime<Utc>>; 3] = match expected {
        TimestampFormat::Iso8601 => [parse_iso8601, parse_epoch, parse_rfc822],
        TimestampFormat::Rfc822 => [parse_rfc822, parse_iso8601, parse_epoch],
        TimestampFormat::UnixTimestamp => [parse_epoch, parse_iso8601, parse_rfc822],
    };
    order
        .iter()
        .find_map(|parse| parse(text))
        .ok_or_else(|| format!("'{text}' is not a recognised timestamp"))
}

/// Converts fractional epoch seconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_rfc822(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_epoch(text: &str) -> Option<DateTime<Utc>> {
    text.parse::<f64>().ok().and_then(from_epoch)
}

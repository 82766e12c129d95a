use crate::error::{Result, ShortformError};

/// Format seconds as an `HH:MM:SS,mmm` caption timestamp.
///
/// Milliseconds are rounded, and a rounded value of 1000 carries into the
/// seconds field. Hours are at least two digits wide but otherwise unbounded.
pub fn encode(seconds: f64) -> Result<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ShortformError::InvalidTimestamp { seconds });
    }

    let total_ms = (seconds * 1000.0).round() as u64;
    let millis = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    Ok(format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis))
}

/// Parse an `HH:MM:SS,mmm` caption timestamp back into seconds.
pub fn decode(value: &str) -> Result<f64> {
    let malformed = || ShortformError::MalformedTimestamp {
        value: value.to_string(),
    };

    let (clock, millis) = value.trim().split_once(',').ok_or_else(malformed)?;
    let mut fields = clock.split(':');
    let (Some(hours), Some(mins), Some(secs), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };

    let parse = |field: &str, min_width: usize, max_width: usize| -> Result<u64> {
        let digits_only = !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit());
        if !digits_only || field.len() < min_width || field.len() > max_width {
            return Err(malformed());
        }
        field.parse::<u64>().map_err(|_| malformed())
    };

    let hours = parse(hours, 2, usize::MAX)?;
    let mins = parse(mins, 2, 2)?;
    let secs = parse(secs, 2, 2)?;
    let millis = parse(millis, 3, 3)?;
    if mins >= 60 || secs >= 60 {
        return Err(malformed());
    }

    let total_ms = hours
        .checked_mul(3_600_000)
        .and_then(|ms| ms.checked_add((mins * 60 + secs) * 1000 + millis))
        .ok_or_else(malformed)?;
    Ok(total_ms as f64 / 1000.0)
}

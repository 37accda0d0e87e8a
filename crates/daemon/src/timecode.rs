use crate::error::PlanError;

/// Parse a clip boundary written as `HH:MM:SS` into whole seconds.
///
/// Minutes and seconds must be below 60; hours are unbounded.
pub fn parse_hms(value: &str) -> Result<u32, PlanError> {
    let invalid = || PlanError::InvalidTimestamp {
        value: value.to_string(),
    };

    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let mut fields = [0u32; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = part.parse::<u32>().map_err(|_| invalid())?;
    }

    let [hours, minutes, seconds] = fields;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)
}

/// Parse an engine timemark into fractional seconds.
///
/// Accepts `HH:MM:SS(.frac)`, `MM:SS(.frac)` and bare seconds. A leading `-`
/// (ffmpeg reports negative times before the first frame) yields a negative
/// value.
pub fn parse_timemark(value: &str) -> Option<f64> {
    let value = value.trim();
    let (negative, body) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let mut total = 0.0f64;
    let parts: Vec<&str> = body.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    for part in &parts {
        let field = part.parse::<f64>().ok()?;
        if !field.is_finite() || field < 0.0 {
            return None;
        }
        total = total * 60.0 + field;
    }

    Some(if negative { -total } else { total })
}

/// Render whole seconds back into `HH:MM:SS`.
pub fn format_hms(total: u32) -> String {
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

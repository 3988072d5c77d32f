use std::{fmt, str::FromStr, time::Duration};

/// Polling interval written as `500ms`, `2s`, `1m`, `1h` or plain seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval(pub Duration);

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let (value, unit) = s.split_at(split);

        let value: f64 = value
            .parse()
            .map_err(|_| format!("invalid interval: {s}"))?;
        let seconds = match unit.trim() {
            "ms" => value / 1000.,
            "" | "s" => value,
            "m" => value * 60.,
            "h" => value * 3600.,
            unit => return Err(format!("unknown interval unit: {unit}")),
        };
        if seconds <= 0. || !seconds.is_finite() {
            return Err(format!("interval must be positive: {s}"));
        }

        Duration::try_from_secs_f64(seconds)
            .map(Self)
            .map_err(|e| format!("invalid interval {s}: {e}"))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        if millis % 1000 == 0 {
            write!(f, "{}s", millis / 1000)
        } else {
            write!(f, "{millis}ms")
        }
    }
}

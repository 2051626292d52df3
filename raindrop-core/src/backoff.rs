use std::time::{Duration, SystemTime};

use reqwest::header::HeaderMap;

/// Exponential retry schedule: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub(crate) fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        Duration::from_millis(base_ms.saturating_mul(1u64 << shift).min(max_ms))
    }
}

/// Server-provided throttling hint, either delta-seconds or an HTTP-date.
pub(crate) fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(value).ok()?;
    date.duration_since(SystemTime::now()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    #[test]
    fn delay_doubles_per_attempt_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(1000), Duration::from_secs(4));
        assert_eq!(backoff.delay(0), Duration::from_millis(1000));
        assert_eq!(backoff.delay(1), Duration::from_millis(2000));
        assert_eq!(backoff.delay(2), Duration::from_millis(4000));
        assert_eq!(backoff.delay(3), Duration::from_millis(4000));
    }

    #[test]
    fn retry_after_hint_parses_delta_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_after_hint(&headers), Some(Duration::from_secs(2)));
    }

    #[test]
    fn retry_after_hint_parses_http_dates() {
        let mut headers = HeaderMap::new();
        let date = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(60));
        headers.insert(RETRY_AFTER, HeaderValue::from_str(&date).unwrap());
        let hint = retry_after_hint(&headers).expect("expected a parsed hint");
        assert!(hint > Duration::from_secs(50));
        assert!(hint <= Duration::from_secs(60));
    }

    #[test]
    fn retry_after_hint_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after_hint(&headers), None);
    }

    #[test]
    fn retry_after_hint_absent_header_is_none() {
        assert_eq!(retry_after_hint(&HeaderMap::new()), None);
    }
}

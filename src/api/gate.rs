//! Process-wide request spacing for outbound catalog traffic.
//!
//! Every request, from any concurrent caller, passes through one
//! [`RequestGate`]. The gate keeps a single "next allowed send time"
//! watermark: a caller reserves its slot under the lock, then sleeps outside
//! it. This spaces requests at least `min_interval` apart even when a burst
//! of tasks arrives at once, and the per-reservation jitter keeps retries
//! from re-synchronizing into a thundering herd.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Maximum Retry-After value honored (1 hour) to prevent absurd sleeps.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Shared minimum-interval-plus-jitter throttle.
///
/// Designed to be wrapped in `Arc` and shared by every component that talks
/// to the upstream API. The mutex is held only to compute and reserve the
/// send slot; the sleep happens outside the critical section.
#[derive(Debug)]
pub struct RequestGate {
    min_interval: Duration,
    jitter_max: Duration,
    next_send: Mutex<Instant>,
}

impl RequestGate {
    /// Creates a gate enforcing `min_interval` between sends, with up to
    /// `jitter_max` of extra random spacing per reservation.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = min_interval.as_millis()))]
    pub fn new(min_interval: Duration, jitter_max: Duration) -> Self {
        debug!("creating request gate");
        Self {
            min_interval,
            jitter_max,
            next_send: Mutex::new(Instant::now()),
        }
    }

    /// Creates a gate that applies no spacing. For tests.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Returns the configured minimum spacing.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until this caller's reserved send slot arrives.
    ///
    /// The reservation (watermark update) is atomic with respect to other
    /// callers; the wait itself happens after the lock is released, so a
    /// slow sleeper never blocks other reservations.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() && self.jitter_max.is_zero() {
            return;
        }

        let send_at = {
            let mut watermark = self
                .next_send
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = Instant::now();
            let send_at = (*watermark).max(now);
            *watermark = send_at + self.min_interval + self.jitter();
            send_at
        };

        let wait = send_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis(), "throttling request");
        }
        tokio::time::sleep_until(send_at).await;
    }

    /// Uniform random jitter in `0..=jitter_max`.
    #[allow(clippy::cast_possible_truncation)]
    fn jitter(&self) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports both RFC 7231 formats: integer seconds and HTTP-date. Returns
/// `None` for unparseable or negative values; caps the result at 1 hour.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        return match datetime.duration_since(now) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            // Date in the past: no wait required.
            Err(_) => Some(Duration::ZERO),
        };
    }

    debug!(header_value, "unparseable Retry-After value");
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn disabled_gate_applies_no_delay() {
        tokio::time::pause();

        let gate = RequestGate::disabled();
        let start = Instant::now();

        gate.acquire().await;
        gate.acquire().await;
        gate.acquire().await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        tokio::time::pause();

        let gate = RequestGate::new(Duration::from_secs(1), Duration::ZERO);
        let start = Instant::now();
        gate.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn sequential_acquires_are_spaced() {
        tokio::time::pause();

        let gate = RequestGate::new(Duration::from_secs(1), Duration::ZERO);
        let start = Instant::now();

        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn concurrent_burst_never_violates_min_interval() {
        tokio::time::pause();

        let interval = Duration::from_millis(100);
        let gate = Arc::new(RequestGate::new(interval, Duration::from_millis(30)));
        let send_times = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let gate = Arc::clone(&gate);
            let send_times = Arc::clone(&send_times);
            handles.push(tokio::spawn(async move {
                gate.acquire().await;
                send_times.lock().unwrap().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = send_times.lock().unwrap().clone();
        times.sort();
        assert_eq!(times.len(), 100);
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(
                gap >= interval,
                "requests spaced only {:?} apart (minimum {:?})",
                gap,
                interval
            );
        }
    }

    #[test]
    fn parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("  15  "), Some(Duration::from_secs(15)));
    }

    #[test]
    fn parse_retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn parse_retry_after_http_date_in_past_is_zero() {
        let past = "Wed, 01 Jan 2020 00:00:00 GMT";
        assert_eq!(parse_retry_after(past), Some(Duration::ZERO));
    }

    #[test]
    fn parse_retry_after_http_date_in_future() {
        let future = std::time::SystemTime::now() + Duration::from_secs(60);
        let formatted = httpdate::fmt_http_date(future);
        let parsed = parse_retry_after(&formatted).unwrap();
        assert!(parsed >= Duration::from_secs(55) && parsed <= Duration::from_secs(65));
    }
}

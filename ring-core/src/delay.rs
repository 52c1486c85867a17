//! Delay & timeout policy: `effective_timeout = base_timeout +
//! max(delay * k, 1.0)`. `k` is wider on the peer channel than on
//! HTTP, since peer calls carry multi-hop operations.

use std::time::Duration;

pub const HTTP_DELAY_FACTOR: f64 = 2.0;
pub const PEER_DELAY_FACTOR: f64 = 4.0;

pub fn effective_timeout(base: Duration, delay_secs: f64, factor: f64) -> Duration {
    let inflate = (delay_secs * factor).max(1.0);
    base + Duration::from_secs_f64(inflate)
}

pub fn http_timeout(base: Duration, delay_secs: f64) -> Duration {
    effective_timeout(base, delay_secs, HTTP_DELAY_FACTOR)
}

pub fn peer_timeout(base: Duration, delay_secs: f64) -> Duration {
    effective_timeout(base, delay_secs, PEER_DELAY_FACTOR)
}

/// Sleeps for `delay_secs` before a send, if positive. A no-op at
/// `delay_secs <= 0.0`.
pub async fn apply_send_delay(delay_secs: f64) {
    if delay_secs > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_factor_is_two() {
        let t = http_timeout(Duration::from_secs(2), 0.5);
        assert_eq!(t, Duration::from_secs(3));
    }

    #[test]
    fn peer_factor_is_four() {
        let t = peer_timeout(Duration::from_secs(2), 0.5);
        assert_eq!(t, Duration::from_secs(4));
    }

    #[test]
    fn floor_of_one_second_applies_at_zero_delay() {
        let t = http_timeout(Duration::from_secs(2), 0.0);
        assert_eq!(t, Duration::from_secs(3));
    }
}

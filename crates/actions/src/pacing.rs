//! Spacing between private invite messages.
//!
//! Each send reserves the next free slot on a shared timeline, so concurrent
//! group-add runs through one workflow still go out one interval apart.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct InvitePacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl InvitePacer {
    /// A non-positive or non-finite rate disables pacing.
    pub fn per_second(rate: f64) -> Self {
        let interval = if rate.is_finite() && rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim a slot and return when it starts.
    async fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut next = self.next_slot.lock().await;
        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }

    /// Wait for this send's turn.
    pub async fn wait_turn(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = self.reserve().await;
        tokio::time::sleep_until(slot.into()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_to_interval() {
        assert_eq!(InvitePacer::per_second(4.0).interval(), Duration::from_millis(250));
        assert!(InvitePacer::per_second(0.0).interval().is_zero());
        assert!(InvitePacer::per_second(f64::NAN).interval().is_zero());
    }

    #[tokio::test]
    async fn test_slots_are_one_interval_apart() {
        let pacer = InvitePacer::per_second(10.0);
        let first = pacer.reserve().await;
        let second = pacer.reserve().await;
        let third = pacer.reserve().await;
        assert_eq!(second - first, Duration::from_millis(100));
        assert_eq!(third - second, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_first_send_is_immediate() {
        let pacer = InvitePacer::per_second(0.5);
        let start = Instant::now();
        pacer.wait_turn().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_second_send_waits() {
        let pacer = InvitePacer::per_second(20.0);
        let start = Instant::now();
        pacer.wait_turn().await;
        pacer.wait_turn().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}

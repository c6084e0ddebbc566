// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Fixed one-second window per client address.
#[derive(Debug)]
pub struct RateLimiter {
    per_second: AtomicU32,
    windows: Mutex<HashMap<IpAddr, (Instant, u32)>>,
}

impl RateLimiter {
    /// `per_second == 0` disables limiting.
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second: AtomicU32::new(per_second),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Applies a new limit; windows already open keep their counts.
    pub fn set_limit(&self, per_second: u32) {
        self.per_second.store(per_second, Ordering::Relaxed);
    }

    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        let per_second = self.per_second.load(Ordering::Relaxed);
        if per_second == 0 {
            return true;
        }

        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Keep the map from growing without bound
        if windows.len() > 10_000 {
            windows.retain(|_, (start, _)| now.duration_since(*start) < WINDOW);
        }

        let entry = windows.entry(client).or_insert((now, 0));
        if now.duration_since(entry.0) >= WINDOW {
            *entry = (now, 0);
        }

        if entry.1 < per_second {
            entry.1 += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let now = Instant::now();

        assert!(limiter.check_at(ip, now));
        assert!(limiter.check_at(ip, now));
        assert!(!limiter.check_at(ip, now + Duration::from_millis(500)));
        assert!(limiter.check_at(ip, now + Duration::from_millis(1000)));
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();
        assert!(limiter.check_at("10.0.0.1".parse().unwrap(), now));
        assert!(limiter.check_at("10.0.0.2".parse().unwrap(), now));
        assert!(!limiter.check_at("10.0.0.1".parse().unwrap(), now));
    }

    #[test]
    fn new_limit_applies_to_next_check() {
        let limiter = RateLimiter::new(0);
        let ip: IpAddr = "10.0.0.3".parse().unwrap();
        let now = Instant::now();
        assert!(limiter.check_at(ip, now));

        limiter.set_limit(1);
        assert!(limiter.check_at(ip, now));
        assert!(!limiter.check_at(ip, now));

        limiter.set_limit(0);
        assert!(limiter.check_at(ip, now));
    }

    #[test]
    fn zero_disables() {
        let limiter = RateLimiter::new(0);
        let ip: IpAddr = "::1".parse().unwrap();
        assert!((0..100).all(|_| limiter.check(ip)));
    }
}

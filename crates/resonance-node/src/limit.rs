//! Write throttling: a fixed one-second window shared by all writers.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(1);

pub struct WriteLimiter {
    max_per_window: u32,
    window: Mutex<(Instant, u32)>,
}

impl WriteLimiter {
    /// Limiter admitting `max_per_second` writes per second. Zero disables
    /// the limit.
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_window: max_per_second,
            window: Mutex::new((Instant::now(), 0)),
        }
    }

    /// Take a slot if one is free in the current window.
    pub async fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now()).await
    }

    pub async fn try_acquire_at(&self, now: Instant) -> bool {
        if self.max_per_window == 0 {
            return true;
        }
        let mut window = self.window.lock().await;
        if now.saturating_duration_since(window.0) >= WINDOW {
            *window = (now, 0);
        }
        if window.1 >= self.max_per_window {
            return false;
        }
        window.1 += 1;
        true
    }
}

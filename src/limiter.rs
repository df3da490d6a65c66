use crate::observability::metrics::Metrics;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

struct WindowState {
    count: u32,
    window_start: Instant,
}

/// Fixed-window limiter with carried backlog: when a window elapses the
/// backlog shrinks by one window's worth instead of resetting, and a refused
/// call keeps its place in the backlog. The returned `retry_after` points at
/// the window the caller's slot lands in, so a refusal doubles as a
/// reservation.
pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max: max.max(1),
            window: window.max(Duration::from_millis(1)),
            state: Mutex::new(WindowState {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    pub fn check(&self) -> Decision {
        let mut st = self.state.lock().unwrap();
        let now = Instant::now();

        let elapsed = now.duration_since(st.window_start);
        if elapsed >= self.window {
            let passed = (elapsed.as_nanos() / self.window.as_nanos()) as u32;
            st.count = st.count.saturating_sub(self.max.saturating_mul(passed));
            st.window_start += self.window.checked_mul(passed).unwrap_or(self.window);
        }

        if st.count < self.max {
            st.count += 1;
            return Decision::Allowed;
        }

        // The refused slot lands count/max windows after the window start.
        let windows_ahead = st.count / self.max;
        let retry_at = st.window_start + self.window.checked_mul(windows_ahead).unwrap_or(self.window);
        st.count = st.count.saturating_add(1);
        Decision::Limited {
            retry_after: retry_at.saturating_duration_since(now),
        }
    }

    /// Reserve a slot and wait until it opens. A single `check` both refuses
    /// and reserves, so this never re-checks after the sleep.
    pub async fn acquire(&self) -> Decision {
        let decision = self.check();
        if let Decision::Limited { retry_after } = decision {
            sleep(retry_after.max(Duration::from_millis(1))).await;
        }
        decision
    }
}

/// HTTP client that funnels every request through the limiter.
#[derive(Clone)]
pub struct ThrottledClient {
    client: reqwest::Client,
    limiter: Arc<FixedWindowLimiter>,
    metrics: Arc<Metrics>,
}

impl ThrottledClient {
    pub fn new(limiter: FixedWindowLimiter, metrics: Arc<Metrics>) -> Self {
        Self {
            client: reqwest::Client::new(),
            limiter: Arc::new(limiter),
            metrics,
        }
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        if let Decision::Limited { .. } = self.limiter.acquire().await {
            self.metrics.rate_limited_total.inc();
        }
        self.client.get(url).send().await
    }
}

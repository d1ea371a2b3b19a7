//! Endpoint rotation and reconnect backoff

use std::time::Duration;

/// Index of the `attempt`-th candidate when starting from `cursor`
pub fn endpoint_index(len: usize, cursor: usize, attempt: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (cursor + attempt) % len
}

/// Ordered, cyclic list of RPC endpoints with a cursor
#[derive(Debug, Clone)]
pub struct EndpointRing {
    endpoints: Vec<String>,
    cursor: usize,
}

impl EndpointRing {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints, cursor: 0 }
    }

    /// One full pass starting at the cursor, each endpoint exactly once
    pub fn pass(&self) -> Vec<(usize, String)> {
        (0..self.endpoints.len())
            .map(|attempt| {
                let index = endpoint_index(self.endpoints.len(), self.cursor, attempt);
                (index, self.endpoints[index].clone())
            })
            .collect()
    }

    /// Park the cursor on the endpoint that worked
    pub fn settle(&mut self, index: usize) {
        if index < self.endpoints.len() {
            self.cursor = index;
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&str> {
        self.endpoints.get(self.cursor).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Linear backoff: attempt `n` waits `base_delay * n`, up to `max_attempts`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self { base_delay, max_attempts }
    }

    /// Delay before the 1-based `attempt`, `None` once the cap is passed
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }

    /// Every delay the policy will ever schedule, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (1..).map_while(|attempt| self.delay_for(attempt)).collect()
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(5000), 5)
    }
}

use std::time::Instant;

/// A simple token bucket, one per channel, with a configurable
/// refill rate and burst capacity instead of a single hardcoded limit.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        Self {
            capacity: burst as f64,
            tokens: burst as f64,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&mut self) {
        loop {
            self.refill();
            if self.tokens >= 1.0 {
                self.tokens -= 1.0;
                return;
            }
            let deficit = 1.0 - self.tokens;
            let wait_secs = deficit / self.refill_per_sec;
            tokio::time::sleep(std::time::Duration::from_secs_f64(wait_secs.max(0.001))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_allows_immediate_consumption_up_to_capacity() {
        let mut bucket = TokenBucket::new(1.0, 5);
        for _ in 0..5 {
            tokio::time::timeout(std::time::Duration::from_millis(50), bucket.acquire())
                .await
                .expect("burst tokens should be immediately available");
        }
    }
}

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::LimitsConfig;
use crate::error::AuthError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct UsageLimitConfig {
    pub limits: HashMap<String, u32>,
}

impl UsageLimitConfig {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        let mut map = HashMap::new();
        map.insert("free".to_string(), limits.free_daily_messages);
        map.insert("premium".to_string(), limits.premium_daily_messages);
        Self { limits: map }
    }

    fn limit_for(&self, tier: &str) -> u32 {
        self.limits
            .get(tier)
            .or_else(|| self.limits.get("free"))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for UsageLimitConfig {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert("free".to_string(), 50); // messages per UTC day
        limits.insert("premium".to_string(), 1000);
        Self { limits }
    }
}

#[derive(Debug)]
struct DailyCounter {
    day: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn new(day: NaiveDate) -> Self {
        Self { day, count: 0 }
    }

    fn roll_over(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.count = 0;
        }
    }
}

/// Per-user daily message counters.
pub struct UsageLimiter {
    counters: Arc<RwLock<HashMap<String, DailyCounter>>>,
    config: UsageLimitConfig,
}

impl UsageLimiter {
    pub fn new(config: UsageLimitConfig) -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Fails once the user has used up today's allowance for `tier`.
    /// Returns the messages left otherwise.
    pub async fn check(&self, user_id: &str, tier: &str) -> Result<u32> {
        self.check_on(user_id, tier, Utc::now().date_naive()).await
    }

    pub async fn record(&self, user_id: &str) -> u32 {
        self.record_on(user_id, Utc::now().date_naive()).await
    }

    async fn check_on(&self, user_id: &str, tier: &str, today: NaiveDate) -> Result<u32> {
        let limit = self.config.limit_for(tier);
        let mut counters = self.counters.write().await;
        let counter = counters
            .entry(user_id.to_string())
            .or_insert_with(|| DailyCounter::new(today));
        counter.roll_over(today);

        if counter.count >= limit {
            warn!("User {} reached the {} limit of {}", user_id, tier, limit);
            let hint = if tier == "premium" {
                "Please try again tomorrow."
            } else {
                "Upgrade to premium for more messages!"
            };
            return Err(AuthError::UsageLimitReached { limit, hint }.into());
        }
        Ok(limit - counter.count)
    }

    async fn record_on(&self, user_id: &str, today: NaiveDate) -> u32 {
        let mut counters = self.counters.write().await;
        let counter = counters
            .entry(user_id.to_string())
            .or_insert_with(|| DailyCounter::new(today));
        counter.roll_over(today);
        counter.count += 1;
        debug!("User {} has sent {} messages today", user_id, counter.count);
        counter.count
    }

    /// Drops counters from previous days.
    pub async fn cleanup(&self) {
        let today = Utc::now().date_naive();
        self.counters.write().await.retain(|_, c| c.day == today);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_free_tier_limit() {
        let limiter = UsageLimiter::new(UsageLimitConfig::default());

        for used in 0..50 {
            let remaining = limiter.check_on("u1", "free", day(1)).await.unwrap();
            assert_eq!(remaining, 50 - used);
            limiter.record_on("u1", day(1)).await;
        }

        let err = limiter.check_on("u1", "free", day(1)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::AuthError(AuthError::UsageLimitReached { limit: 50, .. })
        ));
        assert!(err.to_string().contains("Upgrade to premium"));

        // a new day starts from zero
        assert_eq!(limiter.check_on("u1", "free", day(2)).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_premium_and_unknown_tiers() {
        let mut config = UsageLimitConfig::default();
        config.limits.insert("premium".to_string(), 1);
        let limiter = UsageLimiter::new(config);

        limiter.record_on("p1", day(1)).await;
        let err = limiter.check_on("p1", "premium", day(1)).await.unwrap_err();
        assert!(err.to_string().contains("try again tomorrow"));

        // unknown tiers get the free allowance
        assert_eq!(limiter.check_on("x", "gold", day(1)).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_today() {
        let limiter = UsageLimiter::new(UsageLimitConfig::default());
        limiter.record_on("old", day(1)).await;
        limiter.record("fresh").await;
        limiter.cleanup().await;

        let counters = limiter.counters.read().await;
        assert!(counters.contains_key("fresh"));
        assert!(!counters.contains_key("old"));
    }
}

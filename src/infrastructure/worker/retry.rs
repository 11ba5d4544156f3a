//! 瞬态失败退避策略
//!
//! 网络/超时/5xx 类失败在重试前的冷却时长。
//! 与种子扰动策略相互独立：这里只决定"等多久"，
//! 尝试次数与种子序列由合成尝试循环决定。

use std::time::Duration;

/// 单段合成的最大尝试次数（首次 + 3 次种子扰动重试）
pub const MAX_SYNTHESIS_ATTEMPTS: u32 = 4;

/// 指数退避策略
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// 首次冷却时长
    pub initial_delay: Duration,
    /// 每次冷却的倍增系数
    pub multiplier: u32,
    /// 冷却时长上限
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// 第 n 次瞬态失败后的冷却时长（n 从 0 起）
    pub fn delay_for(&self, transient_failures: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(transient_failures);
        let delay = self.initial_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_shape() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }

    #[test]
    fn test_capped_at_max_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_custom_policy() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_millis(100),
            multiplier: 3,
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(300));
        assert_eq!(policy.delay_for(2), Duration::from_millis(900));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1));
    }
}

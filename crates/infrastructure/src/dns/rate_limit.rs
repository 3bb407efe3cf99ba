/// Transmit budget over fixed one-second windows. A budget of 0 is unlimited.
#[derive(Debug, Clone)]
pub struct TxBudget {
    per_second: u32,
    window: u64,
    used: u32,
}

impl TxBudget {
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second,
            window: 0,
            used: 0,
        }
    }

    /// Takes one unit from the window containing `now_secs`.
    pub fn try_acquire(&mut self, now_secs: u64) -> bool {
        if self.per_second == 0 {
            return true;
        }
        if now_secs != self.window {
            self.window = now_secs;
            self.used = 0;
        }
        if self.used < self.per_second {
            self.used += 1;
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
    fn test_zero_is_unlimited() {
        let mut budget = TxBudget::new(0);
        assert!((0..10_000).all(|_| budget.try_acquire(7)));
    }

    #[test]
    fn test_budget_exhausts_within_window() {
        let mut budget = TxBudget::new(3);
        assert!(budget.try_acquire(100));
        assert!(budget.try_acquire(100));
        assert!(budget.try_acquire(100));
        assert!(!budget.try_acquire(100));
    }

    #[test]
    fn test_new_window_resets_budget() {
        let mut budget = TxBudget::new(1);
        assert!(budget.try_acquire(100));
        assert!(!budget.try_acquire(100));
        assert!(budget.try_acquire(101));
    }
}

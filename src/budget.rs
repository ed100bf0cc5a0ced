//! Consumption ceiling shared by every reasoning round of a run

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::SynergosError;

/// Default consumption budget for one run
pub const DEFAULT_TOKEN_BUDGET: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counters {
    used: u64,
    budget: u64,
}

/// Monotonic used/budget pair
///
/// `used` only ever grows. Once it reaches the budget every admission check
/// fails until the run ends.
#[derive(Debug)]
pub struct ConsumptionMeter {
    counters: Mutex<Counters>,
}

impl ConsumptionMeter {
    pub fn new(budget: u64) -> Self {
        Self {
            counters: Mutex::new(Counters { used: 0, budget }),
        }
    }

    pub fn used(&self) -> u64 {
        self.counters.lock().used
    }

    pub fn budget(&self) -> u64 {
        self.counters.lock().budget
    }

    pub fn remaining(&self) -> u64 {
        let c = self.counters.lock();
        c.budget.saturating_sub(c.used)
    }

    /// Fail with `BudgetExceeded` once the ceiling has been reached
    pub fn ensure_available(&self) -> Result<(), SynergosError> {
        let c = *self.counters.lock();
        if c.used >= c.budget {
            warn!(used = c.used, budget = c.budget, "Consumption budget exhausted");
            return Err(SynergosError::BudgetExceeded {
                used: c.used,
                budget: c.budget,
            });
        }
        Ok(())
    }

    /// Add consumption; returns the new total
    pub fn charge(&self, amount: u64) -> u64 {
        let mut c = self.counters.lock();
        c.used = c.used.saturating_add(amount);
        debug!(charged = amount, used = c.used, budget = c.budget, "Consumption charged");
        c.used
    }
}

impl Default for ConsumptionMeter {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BUDGET)
    }
}

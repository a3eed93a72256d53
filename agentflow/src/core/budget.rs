//! Budget for nested delegation chains.
//!
//! Every nested workflow run consumes one level of depth and shares the
//! wall-clock deadline of the top-level run.

use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("delegation depth limit of {max_depth} reached")]
    DepthExhausted { max_depth: u32 },
    #[error("delegation time budget exhausted")]
    DeadlinePassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationBudget {
    max_depth: u32,
    depth: u32,
    deadline: Option<Instant>,
}

impl DelegationBudget {
    /// Budget for a top-level run. `timeout` of `None` disables the deadline.
    pub fn new(max_depth: u32, timeout: Option<Duration>) -> Self {
        Self {
            max_depth,
            depth: 0,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Nesting level of the run holding this budget (0 for the top level).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Budget for a nested run one level deeper.
    pub fn descend(&self) -> Result<Self, BudgetError> {
        if self.depth >= self.max_depth {
            return Err(BudgetError::DepthExhausted {
                max_depth: self.max_depth,
            });
        }
        if let Some(deadline) = self.deadline {
            remaining_budget(deadline)?;
        }
        Ok(Self {
            depth: self.depth + 1,
            ..*self
        })
    }
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration, BudgetError> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(BudgetError::DeadlinePassed);
    }
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descend_stops_at_max_depth() {
        let top = DelegationBudget::new(2, None);
        let first = top.descend().expect("first");
        let second = first.descend().expect("second");
        assert_eq!(second.depth(), 2);
        assert_eq!(
            second.descend().unwrap_err(),
            BudgetError::DepthExhausted { max_depth: 2 }
        );
    }

    #[test]
    fn zero_depth_refuses_any_delegation() {
        let top = DelegationBudget::new(0, None);
        assert!(top.descend().is_err());
    }

    #[test]
    fn expired_deadline_refuses_delegation() {
        let top = DelegationBudget::new(8, Some(Duration::ZERO));
        assert_eq!(top.descend().unwrap_err(), BudgetError::DeadlinePassed);
    }

    #[test]
    fn remaining_budget_is_positive_before_deadline() {
        let remaining =
            remaining_budget(Instant::now() + Duration::from_secs(60)).expect("budget");
        assert!(remaining > Duration::from_secs(0));
    }
}

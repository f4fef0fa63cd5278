//! Per-category limits on how many violations get reported.

use serde::Serialize;

use crate::harness::report::Category;

/// A violation that is reported only while its budget lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MalformedPayload,
    OutOfBounds,
    /// Two messages inside one tick carried different bytes.
    TickMismatch,
    /// Two messages from different ticks carried the same bytes.
    StalePayload,
}

impl ViolationKind {
    #[must_use]
    pub const fn category(self) -> Category {
        match self {
            ViolationKind::MalformedPayload => Category::MalformedPayload,
            ViolationKind::OutOfBounds => Category::OutOfBounds,
            ViolationKind::TickMismatch | ViolationKind::StalePayload => Category::Synchrony,
        }
    }
}

/// Remaining report allowance per [`ViolationKind`].
///
/// A value type: [`ViolationBudget::spend`] hands back the decremented
/// budget rather than mutating shared counters. Once a category reaches
/// zero its violations are tolerated silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViolationBudget {
    pub malformed_payload: u32,
    pub out_of_bounds: u32,
    pub tick_mismatch: u32,
    pub stale_payload: u32,
}

impl Default for ViolationBudget {
    fn default() -> Self {
        Self::new(2, 1, 2, 3)
    }
}

impl ViolationBudget {
    #[must_use]
    pub const fn new(
        malformed_payload: u32,
        out_of_bounds: u32,
        tick_mismatch: u32,
        stale_payload: u32,
    ) -> Self {
        Self {
            malformed_payload,
            out_of_bounds,
            tick_mismatch,
            stale_payload,
        }
    }

    #[must_use]
    pub const fn remaining(&self, kind: ViolationKind) -> u32 {
        match kind {
            ViolationKind::MalformedPayload => self.malformed_payload,
            ViolationKind::OutOfBounds => self.out_of_bounds,
            ViolationKind::TickMismatch => self.tick_mismatch,
            ViolationKind::StalePayload => self.stale_payload,
        }
    }

    /// Take one report from `kind`'s allowance.
    ///
    /// Returns `None` once that category is exhausted.
    #[must_use]
    pub fn spend(&self, kind: ViolationKind) -> Option<Self> {
        let mut next = *self;
        let slot = match kind {
            ViolationKind::MalformedPayload => &mut next.malformed_payload,
            ViolationKind::OutOfBounds => &mut next.out_of_bounds,
            ViolationKind::TickMismatch => &mut next.tick_mismatch,
            ViolationKind::StalePayload => &mut next.stale_payload,
        };
        *slot = slot.checked_sub(1)?;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allowances() {
        let budget = ViolationBudget::default();
        assert_eq!(budget.remaining(ViolationKind::MalformedPayload), 2);
        assert_eq!(budget.remaining(ViolationKind::OutOfBounds), 1);
        assert_eq!(budget.remaining(ViolationKind::TickMismatch), 2);
        assert_eq!(budget.remaining(ViolationKind::StalePayload), 3);
    }

    #[test]
    fn test_spend_is_per_category() {
        let budget = ViolationBudget::default();
        let after = budget.spend(ViolationKind::OutOfBounds).unwrap();

        assert_eq!(after.remaining(ViolationKind::OutOfBounds), 0);
        assert_eq!(after.remaining(ViolationKind::StalePayload), 3);
        assert_eq!(after.spend(ViolationKind::OutOfBounds), None);
        // Spending leaves the source budget untouched.
        assert_eq!(budget.remaining(ViolationKind::OutOfBounds), 1);
    }

    #[test]
    fn test_zero_budget_never_spends() {
        let budget = ViolationBudget::new(0, 0, 0, 0);
        assert!(budget.spend(ViolationKind::MalformedPayload).is_none());
        assert!(budget.spend(ViolationKind::TickMismatch).is_none());
    }

    #[test]
    fn test_synchrony_kinds_share_a_category() {
        assert_eq!(ViolationKind::TickMismatch.category(), Category::Synchrony);
        assert_eq!(ViolationKind::StalePayload.category(), Category::Synchrony);
        assert_eq!(ViolationKind::OutOfBounds.category(), Category::OutOfBounds);
    }
}

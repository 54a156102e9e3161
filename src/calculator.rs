// ➗ Split Calculator - Turn a proposed split into per-participant allocations
//
// Policies:
//   equal       each participant owes total / n
//   exact       amounts are taken as given, and must add up to the total
//   percentage  each participant owes (percentage / 100) * total, and the
//               percentages must add up to 100
//
// The calculator is pure: it never touches the store. Callers persist the
// returned record themselves.

use crate::error::{SplitError, SplitResult};
use crate::model::{Allocation, ExpenseRecord, Shares, SplitInput, StoredId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Default epsilon for exact/percentage sum checks
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Default epsilon for `sum(allocations) == total` on a finished record
pub const DEFAULT_RECORD_TOLERANCE: f64 = 0.01;

// ============================================================================
// REMAINDER POLICY
// ============================================================================

/// What to do with the division remainder of an equal split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Plain `total / n` for everybody; the remainder drifts in the last digits
    #[default]
    None,
    /// Round shares to cents and give the leftover cents to the first participant
    FirstParticipant,
}

// ============================================================================
// SPLIT CALCULATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct SplitCalculator {
    /// Tolerance for the exact and percentage sum checks (default: 1e-9)
    pub tolerance: f64,

    /// Tolerance for the record invariant (default: $0.01)
    pub record_tolerance: f64,

    pub remainder: RemainderPolicy,
}

impl SplitCalculator {
    pub fn new() -> Self {
        SplitCalculator {
            tolerance: DEFAULT_TOLERANCE,
            record_tolerance: DEFAULT_RECORD_TOLERANCE,
            remainder: RemainderPolicy::None,
        }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        SplitCalculator {
            tolerance,
            ..Self::new()
        }
    }

    pub fn with_remainder(mut self, remainder: RemainderPolicy) -> Self {
        self.remainder = remainder;
        self
    }

    /// Validate `input` and compute its allocations.
    ///
    /// Returns a fresh, not yet persisted `ExpenseRecord`.
    pub fn compute(&self, input: &SplitInput) -> SplitResult<ExpenseRecord> {
        self.validate_common(input)?;

        let total = input.total_amount;
        let participants = match &input.shares {
            Shares::Equal(ids) => self.split_equal(total, ids),
            Shares::Exact(shares) => {
                if let Some(bad) = shares.iter().find(|s| !s.amount.is_finite() || s.amount < 0.0) {
                    return Err(SplitError::InvalidInput(format!(
                        "amount for \"{}\" must be a non-negative number",
                        bad.participant_id
                    )));
                }

                let specified: f64 = shares.iter().map(|s| s.amount).sum();
                if (specified - total).abs() > self.tolerance {
                    return Err(SplitError::AmountMismatch { specified, total });
                }

                shares
                    .iter()
                    .map(|s| Allocation {
                        participant_id: s.participant_id.clone(),
                        amount: s.amount,
                    })
                    .collect()
            }
            Shares::Percentage(shares) => {
                if let Some(bad) = shares
                    .iter()
                    .find(|s| !s.percentage.is_finite() || s.percentage < 0.0)
                {
                    return Err(SplitError::InvalidInput(format!(
                        "percentage for \"{}\" must be a non-negative number",
                        bad.participant_id
                    )));
                }

                let total_percentage: f64 = shares.iter().map(|s| s.percentage).sum();
                if (total_percentage - 100.0).abs() > self.tolerance {
                    return Err(SplitError::PercentageMismatch {
                        total: total_percentage,
                    });
                }

                shares
                    .iter()
                    .map(|s| Allocation {
                        participant_id: s.participant_id.clone(),
                        amount: (s.percentage / 100.0) * total,
                    })
                    .collect()
            }
        };

        let record = ExpenseRecord {
            id: StoredId::new(),
            total_amount: total,
            split_method: input.method(),
            participants,
            created_at: Utc::now(),
        };

        if !record.is_balanced(self.record_tolerance) {
            return Err(SplitError::InvalidInput(format!(
                "allocations sum to {}, expected {}",
                record.allocated_total(),
                total
            )));
        }

        debug!(
            method = %record.split_method,
            total = record.total_amount,
            participants = record.participants.len(),
            "split computed"
        );

        Ok(record)
    }

    fn validate_common(&self, input: &SplitInput) -> SplitResult<()> {
        if !input.total_amount.is_finite() || input.total_amount <= 0.0 {
            return Err(SplitError::InvalidInput(format!(
                "total amount must be positive, got {}",
                input.total_amount
            )));
        }

        if input.shares.is_empty() {
            return Err(SplitError::InvalidInput(
                "at least one participant is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for id in input.shares.participant_ids() {
            if id.trim().is_empty() {
                return Err(SplitError::InvalidInput(
                    "participant id must not be empty".to_string(),
                ));
            }
            if !seen.insert(id) {
                return Err(SplitError::InvalidInput(format!(
                    "participant \"{}\" appears more than once",
                    id
                )));
            }
        }

        Ok(())
    }

    fn split_equal(&self, total: f64, ids: &[String]) -> Vec<Allocation> {
        let n = ids.len();

        match self.remainder {
            RemainderPolicy::None => {
                let share = total / n as f64;
                ids.iter()
                    .map(|id| Allocation {
                        participant_id: id.clone(),
                        amount: share,
                    })
                    .collect()
            }
            RemainderPolicy::FirstParticipant => {
                let cents = (total * 100.0).round() as i64;
                let base = cents / n as i64;
                let leftover = cents - base * n as i64;

                ids.iter()
                    .enumerate()
                    .map(|(i, id)| {
                        let owed = if i == 0 { base + leftover } else { base };
                        Allocation {
                            participant_id: id.clone(),
                            amount: owed as f64 / 100.0,
                        }
                    })
                    .collect()
            }
        }
    }
}

impl Default for SplitCalculator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

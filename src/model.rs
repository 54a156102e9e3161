// Split Ledger - Data Model
// Expense records, split inputs and the loosely-typed request payload they come from

use crate::error::{SplitError, SplitResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SPLIT METHOD
// ============================================================================

/// Closed set of splitting policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    Equal,
    Exact,
    Percentage,
}

impl SplitMethod {
    pub const ALL: [SplitMethod; 3] = [SplitMethod::Equal, SplitMethod::Exact, SplitMethod::Percentage];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Exact => "exact",
            SplitMethod::Percentage => "percentage",
        }
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitMethod {
    type Err = SplitError;

    fn from_str(s: &str) -> SplitResult<Self> {
        let normalized = s.trim().to_lowercase();
        SplitMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == normalized)
            .ok_or_else(|| SplitError::InvalidMethod(s.to_string()))
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Stable identity of a persisted expense record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredId(String);

impl StoredId {
    pub fn new() -> Self {
        StoredId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StoredId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for StoredId {
    fn from(value: String) -> Self {
        StoredId(value)
    }
}

impl fmt::Display for StoredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SPLIT INPUT (transient, tagged per method)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactShare {
    pub participant_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageShare {
    pub participant_id: String,
    pub percentage: f64,
}

/// Method-specific participant entries. Each variant carries only the
/// fields its policy needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Shares {
    Equal(Vec<String>),
    Exact(Vec<ExactShare>),
    Percentage(Vec<PercentageShare>),
}

impl Shares {
    pub fn method(&self) -> SplitMethod {
        match self {
            Shares::Equal(_) => SplitMethod::Equal,
            Shares::Exact(_) => SplitMethod::Exact,
            Shares::Percentage(_) => SplitMethod::Percentage,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Shares::Equal(ids) => ids.len(),
            Shares::Exact(shares) => shares.len(),
            Shares::Percentage(shares) => shares.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Participant ids in input order
    pub fn participant_ids(&self) -> Vec<&str> {
        match self {
            Shares::Equal(ids) => ids.iter().map(String::as_str).collect(),
            Shares::Exact(shares) => shares.iter().map(|s| s.participant_id.as_str()).collect(),
            Shares::Percentage(shares) => shares.iter().map(|s| s.participant_id.as_str()).collect(),
        }
    }
}

/// A proposed split, owned by the calling request
#[derive(Debug, Clone, PartialEq)]
pub struct SplitInput {
    pub total_amount: f64,
    pub shares: Shares,
}

impl SplitInput {
    pub fn equal(total_amount: f64, participants: &[&str]) -> Self {
        SplitInput {
            total_amount,
            shares: Shares::Equal(participants.iter().map(|p| p.to_string()).collect()),
        }
    }

    pub fn exact(total_amount: f64, shares: &[(&str, f64)]) -> Self {
        SplitInput {
            total_amount,
            shares: Shares::Exact(
                shares
                    .iter()
                    .map(|(id, amount)| ExactShare {
                        participant_id: id.to_string(),
                        amount: *amount,
                    })
                    .collect(),
            ),
        }
    }

    pub fn percentage(total_amount: f64, shares: &[(&str, f64)]) -> Self {
        SplitInput {
            total_amount,
            shares: Shares::Percentage(
                shares
                    .iter()
                    .map(|(id, percentage)| PercentageShare {
                        participant_id: id.to_string(),
                        percentage: *percentage,
                    })
                    .collect(),
            ),
        }
    }

    pub fn method(&self) -> SplitMethod {
        self.shares.method()
    }
}

// ============================================================================
// REQUEST PAYLOAD (wire format, loosely typed)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParticipant {
    #[serde(alias = "userId")]
    pub participant_id: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub percentage: Option<f64>,
}

/// Expense submission as it arrives on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub total_amount: f64,
    pub split_method: String,
    #[serde(default)]
    pub participants: Vec<RequestParticipant>,
}

impl SplitRequest {
    /// Convert the payload into a tagged `SplitInput`.
    ///
    /// The method is checked first, so an unknown method is reported as
    /// `InvalidMethod` whatever the participant entries look like.
    pub fn into_input(self) -> SplitResult<SplitInput> {
        let method: SplitMethod = self.split_method.parse()?;

        let shares = match method {
            SplitMethod::Equal => Shares::Equal(
                self.participants
                    .into_iter()
                    .map(|p| p.participant_id)
                    .collect(),
            ),
            SplitMethod::Exact => Shares::Exact(
                self.participants
                    .into_iter()
                    .map(|p| match p.amount {
                        Some(amount) => Ok(ExactShare {
                            participant_id: p.participant_id,
                            amount,
                        }),
                        None => Err(SplitError::InvalidInput(format!(
                            "participant \"{}\" is missing an amount",
                            p.participant_id
                        ))),
                    })
                    .collect::<SplitResult<Vec<_>>>()?,
            ),
            SplitMethod::Percentage => Shares::Percentage(
                self.participants
                    .into_iter()
                    .map(|p| match p.percentage {
                        Some(percentage) => Ok(PercentageShare {
                            participant_id: p.participant_id,
                            percentage,
                        }),
                        None => Err(SplitError::InvalidInput(format!(
                            "participant \"{}\" is missing a percentage",
                            p.participant_id
                        ))),
                    })
                    .collect::<SplitResult<Vec<_>>>()?,
            ),
        };

        Ok(SplitInput {
            total_amount: self.total_amount,
            shares,
        })
    }
}

// ============================================================================
// EXPENSE RECORD (persisted, immutable)
// ============================================================================

/// One participant's owed share of an expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub participant_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    pub id: StoredId,
    pub total_amount: f64,
    pub split_method: SplitMethod,
    pub participants: Vec<Allocation>,
    pub created_at: DateTime<Utc>,
}

impl ExpenseRecord {
    /// Sum of every participant's allocation
    pub fn allocated_total(&self) -> f64 {
        self.participants.iter().map(|a| a.amount).sum()
    }

    /// Check `sum(allocations) == total_amount` within `tolerance`.
    ///
    /// The bound also grows with the rounding error that summing
    /// `participants.len()` floats of this magnitude can accumulate.
    pub fn is_balanced(&self, tolerance: f64) -> bool {
        let terms = self.participants.len().max(1) as f64;
        let rounding = f64::EPSILON * self.total_amount.abs().max(1.0) * terms;
        (self.allocated_total() - self.total_amount).abs() <= tolerance + rounding
    }

    pub fn involves(&self, participant_id: &str) -> bool {
        self.participants
            .iter()
            .any(|a| a.participant_id == participant_id)
    }

    pub fn allocation_for(&self, participant_id: &str) -> Option<f64> {
        self.participants
            .iter()
            .find(|a| a.participant_id == participant_id)
            .map(|a| a.amount)
    }
}

// ============================================================================
// PARTICIPANT (identity)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(participant_id: &str, name: &str, email: Option<&str>) -> Self {
        Participant {
            participant_id: participant_id.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}

// 📊 Balance Aggregator - Denormalize expense records into a balance sheet
//
// Every record with N participants becomes N export rows. Rows keep record
// order, then participant order inside the record. Participant ids are
// resolved to display names once per distinct id.

use crate::error::{SplitError, SplitResult};
use crate::model::{ExpenseRecord, SplitMethod};
use crate::store::{ExpenseStore, ParticipantDirectory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Header of the CSV balance sheet, in column order
pub const CSV_HEADER: [&str; 4] = [
    "TotalAmount",
    "SplitMethod",
    "Participants.Name",
    "Participants.Amount",
];

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BalanceEntry {
    pub name: String,
    pub amount: f64,
}

/// One expense record with participant names resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BalanceRow {
    pub total_amount: f64,
    pub split_method: SplitMethod,
    pub participants: Vec<BalanceEntry>,
}

/// What one participant owes across all records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantBalance {
    pub participant_id: String,
    pub name: String,
    pub expense_count: usize,
    pub total_owed: f64,
}

#[derive(Serialize)]
struct CsvLine<'a> {
    total_amount: f64,
    split_method: &'a str,
    name: &'a str,
    amount: f64,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct BalanceAggregator<'a> {
    store: &'a dyn ExpenseStore,
    directory: &'a dyn ParticipantDirectory,
}

impl<'a> BalanceAggregator<'a> {
    pub fn new(store: &'a dyn ExpenseStore, directory: &'a dyn ParticipantDirectory) -> Self {
        BalanceAggregator { store, directory }
    }

    /// Fetch every record and resolve its participants' names.
    ///
    /// A participant that cannot be resolved fails the whole report with
    /// `Aggregation`; no partial report is produced.
    pub fn build_report(&self) -> SplitResult<Vec<BalanceRow>> {
        let records = self.store.find_all()?;
        let mut names = NameCache::new(self.directory);

        let rows = records
            .iter()
            .map(|record| {
                let participants = record
                    .participants
                    .iter()
                    .map(|allocation| {
                        Ok(BalanceEntry {
                            name: names.resolve(&allocation.participant_id)?,
                            amount: allocation.amount,
                        })
                    })
                    .collect::<SplitResult<Vec<_>>>()?;

                Ok(BalanceRow {
                    total_amount: record.total_amount,
                    split_method: record.split_method,
                    participants,
                })
            })
            .collect::<SplitResult<Vec<_>>>()?;

        info!(
            records = rows.len(),
            lookups = names.len(),
            "balance report built"
        );

        Ok(rows)
    }

    /// Build the report and render it as CSV
    pub fn export_csv(&self) -> SplitResult<String> {
        let rows = self.build_report()?;
        to_csv(&rows)
    }

    /// Per-participant totals, in order of first appearance across records
    pub fn summarize(&self) -> SplitResult<Vec<ParticipantBalance>> {
        let records = self.store.find_all()?;
        let mut names = NameCache::new(self.directory);
        summarize_records(&records, &mut names)
    }
}

fn summarize_records(
    records: &[ExpenseRecord],
    names: &mut NameCache<'_>,
) -> SplitResult<Vec<ParticipantBalance>> {
    let mut balances: Vec<ParticipantBalance> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        for allocation in &record.participants {
            match index.get(&allocation.participant_id) {
                Some(&i) => {
                    balances[i].expense_count += 1;
                    balances[i].total_owed += allocation.amount;
                }
                None => {
                    index.insert(allocation.participant_id.clone(), balances.len());
                    balances.push(ParticipantBalance {
                        participant_id: allocation.participant_id.clone(),
                        name: names.resolve(&allocation.participant_id)?,
                        expense_count: 1,
                        total_owed: allocation.amount,
                    });
                }
            }
        }
    }

    Ok(balances)
}

// ============================================================================
// NAME CACHE
// ============================================================================

/// One directory lookup per distinct participant
struct NameCache<'a> {
    directory: &'a dyn ParticipantDirectory,
    resolved: HashMap<String, String>,
}

impl<'a> NameCache<'a> {
    fn new(directory: &'a dyn ParticipantDirectory) -> Self {
        NameCache {
            directory,
            resolved: HashMap::new(),
        }
    }

    fn resolve(&mut self, participant_id: &str) -> SplitResult<String> {
        if let Some(name) = self.resolved.get(participant_id) {
            return Ok(name.clone());
        }

        let name = self.directory.resolve_name(participant_id).map_err(|err| {
            warn!(participant = participant_id, error = %err, "participant lookup failed");
            SplitError::Aggregation(format!(
                "cannot resolve participant \"{}\": {}",
                participant_id, err
            ))
        })?;

        self.resolved.insert(participant_id.to_string(), name.clone());
        Ok(name)
    }

    fn len(&self) -> usize {
        self.resolved.len()
    }
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Render rows as comma-separated text with a header row.
///
/// One line per participant per record; the record's total and method are
/// repeated on each of its lines. Numbers use the csv serializer's default
/// formatting.
pub fn to_csv(rows: &[BalanceRow]) -> SplitResult<String> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    wtr.write_record(CSV_HEADER)?;

    for row in rows {
        for entry in &row.participants {
            wtr.serialize(CsvLine {
                total_amount: row.total_amount,
                split_method: row.split_method.as_str(),
                name: &entry.name,
                amount: entry.amount,
            })?;
        }
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| SplitError::Aggregation(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| SplitError::Aggregation(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================

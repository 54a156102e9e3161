// Split Ledger - Expense Service
// The inbound operations, wired over explicitly constructed store handles

use crate::balance::{BalanceAggregator, ParticipantBalance};
use crate::calculator::SplitCalculator;
use crate::error::SplitResult;
use crate::model::{ExpenseRecord, Participant, SplitInput, SplitRequest};
use crate::store::{ExpenseStore, ParticipantDirectory};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ExpenseService {
    store: Arc<dyn ExpenseStore>,
    directory: Arc<dyn ParticipantDirectory>,
    calculator: SplitCalculator,
}

impl ExpenseService {
    pub fn new(
        store: Arc<dyn ExpenseStore>,
        directory: Arc<dyn ParticipantDirectory>,
        calculator: SplitCalculator,
    ) -> Self {
        ExpenseService {
            store,
            directory,
            calculator,
        }
    }

    /// Validate a wire request, compute its split and persist the record.
    /// Nothing is written when validation fails.
    pub fn submit_expense(&self, request: SplitRequest) -> SplitResult<ExpenseRecord> {
        let method = request.split_method.clone();
        let input = request.into_input().map_err(|err| {
            warn!(method = %method, error = %err, "expense rejected");
            err
        })?;
        self.submit_input(&input)
    }

    pub fn submit_input(&self, input: &SplitInput) -> SplitResult<ExpenseRecord> {
        let record = self.calculator.compute(input).map_err(|err| {
            warn!(method = %input.method(), error = %err, "expense rejected");
            err
        })?;

        self.store.save(&record)?;

        info!(
            id = %record.id,
            method = %record.split_method,
            total = record.total_amount,
            participants = record.participants.len(),
            "expense recorded"
        );

        Ok(record)
    }

    pub fn list_expenses_for(&self, participant_id: &str) -> SplitResult<Vec<ExpenseRecord>> {
        self.store.find_by_participant(participant_id)
    }

    pub fn list_all_expenses(&self) -> SplitResult<Vec<ExpenseRecord>> {
        self.store.find_all()
    }

    /// CSV balance sheet over every stored record
    pub fn export_balance_sheet(&self) -> SplitResult<String> {
        self.aggregator().export_csv()
    }

    pub fn balance_summary(&self) -> SplitResult<Vec<ParticipantBalance>> {
        self.aggregator().summarize()
    }

    pub fn register_participant(
        &self,
        participant_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> SplitResult<Participant> {
        let participant = Participant::new(participant_id, name, email);
        self.directory.register(&participant)?;
        info!(participant = participant_id, "participant registered");
        Ok(participant)
    }

    pub fn resolve_participant_name(&self, participant_id: &str) -> SplitResult<String> {
        self.directory.resolve_name(participant_id)
    }

    pub fn list_participants(&self) -> SplitResult<Vec<Participant>> {
        self.directory.list()
    }

    fn aggregator(&self) -> BalanceAggregator<'_> {
        BalanceAggregator::new(self.store.as_ref(), self.directory.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SplitError;
    use crate::model::{RequestParticipant, StoredId};
    use crate::store::{MemoryStore, SqliteStore};

    struct BrokenStore;

    impl ExpenseStore for BrokenStore {
        fn save(&self, _record: &ExpenseRecord) -> SplitResult<StoredId> {
            Err(SplitError::Persistence("disk full".to_string()))
        }

        fn find_by_participant(&self, _participant_id: &str) -> SplitResult<Vec<ExpenseRecord>> {
            Err(SplitError::Persistence("disk full".to_string()))
        }

        fn find_all(&self) -> SplitResult<Vec<ExpenseRecord>> {
            Err(SplitError::Persistence("disk full".to_string()))
        }
    }

    fn sqlite_service() -> ExpenseService {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        ExpenseService::new(store.clone(), store, SplitCalculator::new())
    }

    fn request(method: &str, participants: Vec<(&str, Option<f64>, Option<f64>)>, total: f64) -> SplitRequest {
        SplitRequest {
            total_amount: total,
            split_method: method.to_string(),
            participants: participants
                .into_iter()
                .map(|(id, amount, percentage)| RequestParticipant {
                    participant_id: id.to_string(),
                    amount,
                    percentage,
                })
                .collect(),
        }
    }

    #[test]
    fn test_submit_persists_record() {
        let service = sqlite_service();
        let record = service
            .submit_expense(request("equal", vec![("a", None, None), ("b", None, None)], 100.0))
            .unwrap();

        let for_a = service.list_expenses_for("a").unwrap();
        assert_eq!(for_a, vec![record.clone()]);
        assert_eq!(service.list_all_expenses().unwrap(), vec![record]);
    }

    #[test]
    fn test_invalid_requests_never_reach_store() {
        let service = sqlite_service();

        let err = service
            .submit_expense(request("shares", vec![("a", None, None)], 10.0))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_method");

        let err = service
            .submit_expense(request("exact", vec![("a", Some(30.0), None), ("b", Some(61.0), None)], 90.0))
            .unwrap_err();
        assert_eq!(err.kind(), "amount_mismatch");

        let err = service
            .submit_expense(request("percentage", vec![("a", None, Some(50.0))], 90.0))
            .unwrap_err();
        assert_eq!(err.kind(), "percentage_mismatch");

        assert!(service.list_all_expenses().unwrap().is_empty());
    }

    #[test]
    fn test_persistence_errors_propagate_unchanged() {
        let service = ExpenseService::new(
            Arc::new(BrokenStore),
            Arc::new(MemoryStore::new()),
            SplitCalculator::new(),
        );

        let err = service
            .submit_input(&SplitInput::equal(10.0, &["a"]))
            .unwrap_err();
        assert_eq!(err, SplitError::Persistence("disk full".to_string()));

        let err = service.export_balance_sheet().unwrap_err();
        assert_eq!(err, SplitError::Persistence("disk full".to_string()));
    }

    #[test]
    fn test_participants_and_balance_sheet() {
        let service = sqlite_service();
        service.register_participant("a", "Alice", None).unwrap();
        service
            .register_participant("b", "Bob", Some("bob@example.com"))
            .unwrap();

        service.submit_input(&SplitInput::equal(100.0, &["a", "b"])).unwrap();

        assert_eq!(service.resolve_participant_name("b").unwrap(), "Bob");
        assert_eq!(service.list_participants().unwrap().len(), 2);

        let sheet = service.export_balance_sheet().unwrap();
        assert_eq!(sheet.lines().count(), 3);

        let summary = service.balance_summary().unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].name, "Bob");
    }
}

// 🗄️ Expense Store - Append-only persistence for expense records
// Plus the participant directory used to resolve display names
//
// Two implementations share the same traits:
//   SqliteStore  rusqlite + WAL, one SQLite transaction per saved record
//   MemoryStore  RwLock'd vectors, for tests and embedding

use crate::error::{SplitError, SplitResult};
use crate::model::{Allocation, ExpenseRecord, Participant, SplitMethod, StoredId};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

// ============================================================================
// TRAITS
// ============================================================================

/// Append-only record store. Reads return records in insertion order.
pub trait ExpenseStore: Send + Sync {
    fn save(&self, record: &ExpenseRecord) -> SplitResult<StoredId>;

    /// Every record where any allocation belongs to `participant_id`
    fn find_by_participant(&self, participant_id: &str) -> SplitResult<Vec<ExpenseRecord>>;

    fn find_all(&self) -> SplitResult<Vec<ExpenseRecord>>;
}

/// Identity lookup for participants
pub trait ParticipantDirectory: Send + Sync {
    fn register(&self, participant: &Participant) -> SplitResult<()>;

    /// Display name for `participant_id`, or `ParticipantNotFound`
    fn resolve_name(&self, participant_id: &str) -> SplitResult<String>;

    fn list(&self) -> SplitResult<Vec<Participant>>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub fn setup_database(conn: &Connection) -> SplitResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS participants (
            participant_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            expense_uuid TEXT UNIQUE NOT NULL,
            total_amount REAL NOT NULL,
            split_method TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // One row per allocation; position keeps the input order
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expense_participants (
            expense_id INTEGER NOT NULL REFERENCES expenses(id),
            position INTEGER NOT NULL,
            participant_id TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY (expense_id, position)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expense_participants_participant
         ON expense_participants(participant_id)",
        [],
    )?;

    Ok(())
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema exists
    pub fn open<P: AsRef<Path>>(path: P) -> SplitResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        setup_database(&conn)?;
        info!(path = ?path.as_ref(), "expense database opened");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> SplitResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap a connection whose schema was already set up
    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> SplitResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SplitError::Persistence("database connection lock poisoned".to_string()))
    }

    pub fn count_expenses(&self) -> SplitResult<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn load_allocations(conn: &Connection, expense_id: i64) -> rusqlite::Result<Vec<Allocation>> {
    let mut stmt = conn.prepare_cached(
        "SELECT participant_id, amount
         FROM expense_participants
         WHERE expense_id = ?1
         ORDER BY position",
    )?;

    let allocations = stmt
        .query_map([expense_id], |row| {
            Ok(Allocation {
                participant_id: row.get(0)?,
                amount: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(allocations)
}

/// Run an expense query (columns: id, expense_uuid, total_amount, split_method,
/// created_at) and attach each row's allocations
fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<ExpenseRecord>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, |row| {
            let row_id: i64 = row.get(0)?;
            let uuid: String = row.get(1)?;
            let method_str: String = row.get(3)?;
            let created_str: String = row.get(4)?;

            let split_method = method_str
                .parse::<SplitMethod>()
                .map_err(|e| conversion_error(3, e))?;

            Ok((
                row_id,
                ExpenseRecord {
                    id: StoredId::from(uuid),
                    total_amount: row.get(2)?,
                    split_method,
                    participants: Vec::new(),
                    created_at: parse_timestamp(4, &created_str)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(row_id, mut record)| -> rusqlite::Result<ExpenseRecord> {
            record.participants = load_allocations(conn, row_id)?;
            Ok(record)
        })
        .collect()
}

impl ExpenseStore for SqliteStore {
    fn save(&self, record: &ExpenseRecord) -> SplitResult<StoredId> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let result = tx.execute(
            "INSERT INTO expenses (expense_uuid, total_amount, split_method, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.as_str(),
                record.total_amount,
                record.split_method.as_str(),
                record.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(SplitError::Persistence(format!(
                    "expense {} is already stored",
                    record.id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let expense_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO expense_participants (expense_id, position, participant_id, amount)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for (position, allocation) in record.participants.iter().enumerate() {
                stmt.execute(params![
                    expense_id,
                    position as i64,
                    allocation.participant_id,
                    allocation.amount,
                ])?;
            }
        }

        tx.commit()?;

        debug!(id = %record.id, row = expense_id, "expense saved");
        Ok(record.id.clone())
    }

    fn find_by_participant(&self, participant_id: &str) -> SplitResult<Vec<ExpenseRecord>> {
        let conn = self.lock()?;
        let records = query_records(
            &conn,
            "SELECT id, expense_uuid, total_amount, split_method, created_at
             FROM expenses
             WHERE id IN (
                SELECT expense_id FROM expense_participants WHERE participant_id = ?1
             )
             ORDER BY id",
            [participant_id],
        )?;
        Ok(records)
    }

    fn find_all(&self) -> SplitResult<Vec<ExpenseRecord>> {
        let conn = self.lock()?;
        let records = query_records(
            &conn,
            "SELECT id, expense_uuid, total_amount, split_method, created_at
             FROM expenses
             ORDER BY id",
            [],
        )?;
        Ok(records)
    }
}

impl ParticipantDirectory for SqliteStore {
    fn register(&self, participant: &Participant) -> SplitResult<()> {
        let conn = self.lock()?;

        let result = conn.execute(
            "INSERT INTO participants (participant_id, name, email, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                participant.participant_id,
                participant.name,
                participant.email,
                participant.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(SplitError::InvalidInput(format!(
                    "participant \"{}\" is already registered",
                    participant.participant_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_name(&self, participant_id: &str) -> SplitResult<String> {
        let conn = self.lock()?;
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM participants WHERE participant_id = ?1",
                [participant_id],
                |row| row.get(0),
            )
            .optional()?;

        name.ok_or_else(|| SplitError::ParticipantNotFound(participant_id.to_string()))
    }

    fn list(&self) -> SplitResult<Vec<Participant>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT participant_id, name, email, created_at
             FROM participants
             ORDER BY participant_id",
        )?;

        let participants = stmt
            .query_map([], |row| {
                let created_str: String = row.get(3)?;
                Ok(Participant {
                    participant_id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    created_at: parse_timestamp(3, &created_str)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(participants)
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<ExpenseRecord>>,
    participants: RwLock<Vec<Participant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> SplitError {
    SplitError::Persistence("in-memory store lock poisoned".to_string())
}

impl ExpenseStore for MemoryStore {
    fn save(&self, record: &ExpenseRecord) -> SplitResult<StoredId> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(SplitError::Persistence(format!(
                "expense {} is already stored",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(record.id.clone())
    }

    fn find_by_participant(&self, participant_id: &str) -> SplitResult<Vec<ExpenseRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .iter()
            .filter(|r| r.involves(participant_id))
            .cloned()
            .collect())
    }

    fn find_all(&self) -> SplitResult<Vec<ExpenseRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.clone())
    }
}

impl ParticipantDirectory for MemoryStore {
    fn register(&self, participant: &Participant) -> SplitResult<()> {
        let mut participants = self.participants.write().map_err(|_| poisoned())?;
        if participants
            .iter()
            .any(|p| p.participant_id == participant.participant_id)
        {
            return Err(SplitError::InvalidInput(format!(
                "participant \"{}\" is already registered",
                participant.participant_id
            )));
        }
        participants.push(participant.clone());
        Ok(())
    }

    fn resolve_name(&self, participant_id: &str) -> SplitResult<String> {
        let participants = self.participants.read().map_err(|_| poisoned())?;
        participants
            .iter()
            .find(|p| p.participant_id == participant_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| SplitError::ParticipantNotFound(participant_id.to_string()))
    }

    fn list(&self) -> SplitResult<Vec<Participant>> {
        let participants = self.participants.read().map_err(|_| poisoned())?;
        let mut all = participants.clone();
        all.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        Ok(all)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::SplitCalculator;
    use crate::model::SplitInput;
    use std::sync::Arc;
    use std::thread;

    fn record(input: SplitInput) -> ExpenseRecord {
        SplitCalculator::new().compute(&input).unwrap()
    }

    fn check_round_trip(store: &dyn ExpenseStore) {
        let first = record(SplitInput::equal(100.0, &["alice", "bob"]));
        let second = record(SplitInput::exact(90.0, &[("bob", 30.0), ("carol", 60.0)]));
        let third = record(SplitInput::percentage(200.0, &[("alice", 25.0), ("carol", 75.0)]));

        for r in [&first, &second, &third] {
            let id = store.save(r).unwrap();
            assert_eq!(&id, &r.id);
        }

        let all = store.find_all().unwrap();
        assert_eq!(all, vec![first.clone(), second.clone(), third.clone()]);

        let for_alice = store.find_by_participant("alice").unwrap();
        assert_eq!(for_alice, vec![first.clone(), third.clone()]);

        let for_bob = store.find_by_participant("bob").unwrap();
        assert_eq!(for_bob, vec![first, second]);

        assert!(store.find_by_participant("dave").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_round_trip_preserves_order_and_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        check_round_trip(&store);
        assert_eq!(store.count_expenses().unwrap(), 3);
    }

    #[test]
    fn test_memory_round_trip_preserves_order_and_fields() {
        let store = MemoryStore::new();
        check_round_trip(&store);
    }

    #[test]
    fn test_sqlite_rejects_duplicate_save() {
        let store = SqliteStore::open_in_memory().unwrap();
        let r = record(SplitInput::equal(10.0, &["alice"]));

        store.save(&r).unwrap();
        let err = store.save(&r).unwrap_err();

        assert_eq!(err.kind(), "persistence");
        assert_eq!(store.count_expenses().unwrap(), 1);
        // The failed save must not leave stray allocations behind
        assert_eq!(store.find_by_participant("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_participant_directory() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .register(&Participant::new("u1", "Alice", Some("alice@example.com")))
            .unwrap();
        store.register(&Participant::new("u0", "Bob", None)).unwrap();

        assert_eq!(store.resolve_name("u1").unwrap(), "Alice");
        assert_eq!(
            store.resolve_name("missing").unwrap_err(),
            SplitError::ParticipantNotFound("missing".to_string())
        );

        let err = store.register(&Participant::new("u1", "Again", None)).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].participant_id, "u0");
        assert_eq!(listed[1].email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_memory_participant_directory() {
        let store = MemoryStore::new();
        store.register(&Participant::new("u1", "Alice", None)).unwrap();

        assert_eq!(store.resolve_name("u1").unwrap(), "Alice");
        assert_eq!(store.resolve_name("u2").unwrap_err().kind(), "participant_not_found");
    }

    #[test]
    fn test_sqlite_concurrent_saves_are_all_visible() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let id = format!("p{}", i);
                    let r = record(SplitInput::equal(10.0, &[id.as_str(), "shared"]));
                    store.save(&r).unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let all = store.find_all().unwrap();
        assert_eq!(all.len(), 8);
        assert!(all.iter().all(|r| r.participants.len() == 2));
        assert_eq!(store.find_by_participant("shared").unwrap().len(), 8);
    }
}

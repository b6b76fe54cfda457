use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

use crate::{
    directory::PartyRef,
    error::{AchError, Result},
    money::Amount,
    storage::{
        models::{Depository, DepositoryStatus, MicroDeposit, Transfer, TransferStatus},
        DepositoryRepository, MicroDepositRepository, TransferRepository,
    },
};

const TRANSFER_COLUMNS: &str = "id, amount_cents, currency, source_customer_id, source_account_id,
    destination_customer_id, destination_account_id, description, status, same_day,
    return_code, created_at, updated_at";

const DEPOSITORY_COLUMNS: &str =
    "id, customer_id, routing_number, account_hash, holder_name, status, created_at, updated_at";

const MICRO_DEPOSIT_COLUMNS: &str = "id, destination_customer_id, destination_account_id, amounts,
    transfer_ids, status, return_code, created_at";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AchError::Other(anyhow::anyhow!("database mutex poisoned")))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transfers (
                id TEXT PRIMARY KEY,
                amount_cents INTEGER NOT NULL,
                currency TEXT NOT NULL,
                source_customer_id TEXT NOT NULL,
                source_account_id TEXT NOT NULL,
                destination_customer_id TEXT NOT NULL,
                destination_account_id TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                same_day INTEGER NOT NULL,
                return_code TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transfer_traces (
                trace_number TEXT NOT NULL,
                transfer_id TEXT NOT NULL,
                PRIMARY KEY (trace_number, transfer_id),
                FOREIGN KEY (transfer_id) REFERENCES transfers(id)
            );

            CREATE TABLE IF NOT EXISTS depositories (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                routing_number TEXT NOT NULL,
                account_hash TEXT NOT NULL,
                holder_name TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS micro_deposits (
                id TEXT PRIMARY KEY,
                destination_customer_id TEXT NOT NULL,
                destination_account_id TEXT NOT NULL,
                amounts TEXT NOT NULL,
                transfer_ids TEXT NOT NULL,
                status TEXT NOT NULL,
                return_code TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS micro_deposit_transfers (
                transfer_id TEXT PRIMARY KEY,
                micro_deposit_id TEXT NOT NULL,
                FOREIGN KEY (micro_deposit_id) REFERENCES micro_deposits(id)
            );

            CREATE TABLE IF NOT EXISTS micro_deposit_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                depository_id TEXT NOT NULL,
                attempted_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transfer_status ON transfers(status);
            CREATE INDEX IF NOT EXISTS idx_trace_number ON transfer_traces(trace_number);
            CREATE INDEX IF NOT EXISTS idx_md_destination
                ON micro_deposits(destination_customer_id, destination_account_id);
            CREATE INDEX IF NOT EXISTS idx_attempts ON micro_deposit_attempts(depository_id, attempted_at);",
        )?;
        Ok(())
    }

    /// Records one micro-deposit confirmation attempt.
    pub fn record_attempt(&self, depository_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO micro_deposit_attempts (depository_id, attempted_at) VALUES (?1, ?2)",
            params![depository_id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Attempts recorded for the depository at or after `since`.
    pub fn count_attempts_since(&self, depository_id: &str, since: DateTime<Utc>) -> Result<u32> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM micro_deposit_attempts
             WHERE depository_id = ?1 AND attempted_at >= ?2",
            params![depository_id, since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DatabaseStats {
            total_transfers: count("SELECT COUNT(*) FROM transfers")?,
            pending_transfers: count("SELECT COUNT(*) FROM transfers WHERE status = 'pending'")?,
            processed_transfers: count(
                "SELECT COUNT(*) FROM transfers WHERE status = 'processed'",
            )?,
            failed_transfers: count("SELECT COUNT(*) FROM transfers WHERE status = 'failed'")?,
            total_depositories: count("SELECT COUNT(*) FROM depositories")?,
            verified_depositories: count(
                "SELECT COUNT(*) FROM depositories WHERE status = 'verified'",
            )?,
            rejected_depositories: count(
                "SELECT COUNT(*) FROM depositories WHERE status = 'rejected'",
            )?,
            micro_deposits: count("SELECT COUNT(*) FROM micro_deposits")?,
        })
    }
}

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn text_err(idx: usize, message: String) -> rusqlite::Error {
    conversion_err(idx, std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn transfer_status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<TransferStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| text_err(idx, e))
}

fn transfer_from_row(row: &Row<'_>) -> rusqlite::Result<Transfer> {
    let cents: i64 = row.get(1)?;
    let currency: String = row.get(2)?;
    let amount = Amount::from_minor_units(&currency, cents).map_err(|e| conversion_err(1, e))?;
    let same_day: i64 = row.get(9)?;

    Ok(Transfer {
        id: row.get(0)?,
        amount,
        source: PartyRef::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?),
        destination: PartyRef::new(row.get::<_, String>(5)?, row.get::<_, String>(6)?),
        description: row.get(7)?,
        status: transfer_status_at(row, 8)?,
        same_day: same_day != 0,
        return_code: row.get(10)?,
        created: time_at(row, 11)?,
        updated: time_at(row, 12)?,
    })
}

fn depository_from_row(row: &Row<'_>) -> rusqlite::Result<Depository> {
    let status: String = row.get(5)?;
    Ok(Depository {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        routing_number: row.get(2)?,
        account_hash: row.get(3)?,
        holder_name: row.get(4)?,
        status: status.parse().map_err(|e| text_err(5, e))?,
        created: time_at(row, 6)?,
        updated: time_at(row, 7)?,
    })
}

fn micro_deposit_from_row(row: &Row<'_>) -> rusqlite::Result<MicroDeposit> {
    let amounts: String = row.get(3)?;
    let transfer_ids: String = row.get(4)?;
    Ok(MicroDeposit {
        id: row.get(0)?,
        destination: PartyRef::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        amounts: serde_json::from_str(&amounts).map_err(|e| conversion_err(3, e))?,
        transfer_ids: serde_json::from_str(&transfer_ids).map_err(|e| conversion_err(4, e))?,
        status: transfer_status_at(row, 5)?,
        return_code: row.get(6)?,
        created: time_at(row, 7)?,
    })
}

fn insert_transfer(conn: &Connection, transfer: &Transfer) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO transfers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            TRANSFER_COLUMNS
        ),
        params![
            transfer.id,
            transfer.amount.minor_units(),
            transfer.amount.currency(),
            transfer.source.customer_id,
            transfer.source.account_id,
            transfer.destination.customer_id,
            transfer.destination.account_id,
            transfer.description,
            transfer.status.to_string(),
            transfer.same_day as i64,
            transfer.return_code,
            transfer.created.to_rfc3339(),
            transfer.updated.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_traces(conn: &Connection, transfer_id: &str, traces: &[String]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO transfer_traces (trace_number, transfer_id) VALUES (?1, ?2)",
    )?;
    for trace in traces {
        stmt.execute(params![trace, transfer_id])?;
    }
    Ok(())
}

impl TransferRepository for Database {
    fn create_transfer(&self, transfer: &Transfer) -> Result<()> {
        let conn = self.conn()?;
        insert_transfer(&conn, transfer)?;
        Ok(())
    }

    fn get_transfer(&self, id: &str) -> Result<Option<Transfer>> {
        let conn = self.conn()?;
        let transfer = conn
            .query_row(
                &format!("SELECT {} FROM transfers WHERE id = ?1", TRANSFER_COLUMNS),
                [id],
                transfer_from_row,
            )
            .optional()?;
        Ok(transfer)
    }

    fn update_transfer_status(
        &self,
        id: &str,
        status: TransferStatus,
        return_code: Option<&str>,
    ) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE transfers
             SET status = ?1, return_code = COALESCE(?2, return_code), updated_at = ?3
             WHERE id = ?4",
            params![status.to_string(), return_code, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(AchError::NotFound(format!("transfer {}", id)));
        }
        Ok(())
    }

    fn list_transfers(&self, customer_id: &str) -> Result<Vec<Transfer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transfers
             WHERE source_customer_id = ?1 OR destination_customer_id = ?1
             ORDER BY created_at DESC",
            TRANSFER_COLUMNS
        ))?;
        let transfers = stmt
            .query_map([customer_id], transfer_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transfers)
    }

    fn save_trace_numbers(&self, transfer_id: &str, traces: &[String]) -> Result<()> {
        let conn = self.conn()?;
        insert_traces(&conn, transfer_id, traces)?;
        Ok(())
    }

    fn find_transfer_by_trace(&self, trace_number: &str) -> Result<Option<Transfer>> {
        let conn = self.conn()?;
        let columns: Vec<String> = TRANSFER_COLUMNS
            .split(',')
            .map(|c| format!("t.{}", c.trim()))
            .collect();
        let transfer = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transfers t
                     JOIN transfer_traces tt ON tt.transfer_id = t.id
                     WHERE tt.trace_number = ?1
                     ORDER BY t.created_at DESC
                     LIMIT 1",
                    columns.join(", ")
                ),
                [trace_number],
                transfer_from_row,
            )
            .optional()?;
        Ok(transfer)
    }
}

impl DepositoryRepository for Database {
    fn upsert_depository(&self, depository: &Depository) -> Result<()> {
        // a rejected depository keeps its status through re-registration
        self.conn()?.execute(
            &format!(
                "INSERT INTO depositories ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    customer_id = excluded.customer_id,
                    routing_number = excluded.routing_number,
                    account_hash = excluded.account_hash,
                    holder_name = excluded.holder_name,
                    status = CASE WHEN depositories.status = ?9 THEN depositories.status
                                  ELSE excluded.status END,
                    updated_at = excluded.updated_at",
                DEPOSITORY_COLUMNS
            ),
            params![
                depository.id,
                depository.customer_id,
                depository.routing_number,
                depository.account_hash,
                depository.holder_name,
                depository.status.to_string(),
                depository.created.to_rfc3339(),
                depository.updated.to_rfc3339(),
                DepositoryStatus::Rejected.to_string(),
            ],
        )?;
        Ok(())
    }

    fn get_depository(&self, id: &str) -> Result<Option<Depository>> {
        let conn = self.conn()?;
        let depository = conn
            .query_row(
                &format!("SELECT {} FROM depositories WHERE id = ?1", DEPOSITORY_COLUMNS),
                [id],
                depository_from_row,
            )
            .optional()?;
        Ok(depository)
    }

    fn update_depository_status(&self, id: &str, status: DepositoryStatus) -> Result<()> {
        let conn = self.conn()?;
        let current: Option<String> = conn
            .query_row("SELECT status FROM depositories WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        let current = current.ok_or_else(|| AchError::NotFound(format!("depository {}", id)))?;
        let rejected = DepositoryStatus::Rejected.to_string();
        if current == rejected && status != DepositoryStatus::Rejected {
            return Err(AchError::policy(format!(
                "depository {} is rejected and cannot become {}",
                id, status
            )));
        }
        conn.execute(
            "UPDATE depositories SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_string(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn list_depositories(&self, customer_id: &str) -> Result<Vec<Depository>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM depositories WHERE customer_id = ?1 ORDER BY created_at",
            DEPOSITORY_COLUMNS
        ))?;
        let depositories = stmt
            .query_map([customer_id], depository_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(depositories)
    }
}

impl MicroDepositRepository for Database {
    fn create_micro_deposit(
        &self,
        micro_deposit: &MicroDeposit,
        transfers: &[(Transfer, Vec<String>)],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for (transfer, traces) in transfers {
            insert_transfer(&tx, transfer)?;
            insert_traces(&tx, &transfer.id, traces)?;
        }

        tx.execute(
            &format!(
                "INSERT INTO micro_deposits ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                MICRO_DEPOSIT_COLUMNS
            ),
            params![
                micro_deposit.id,
                micro_deposit.destination.customer_id,
                micro_deposit.destination.account_id,
                serde_json::to_string(&micro_deposit.amounts)?,
                serde_json::to_string(&micro_deposit.transfer_ids)?,
                micro_deposit.status.to_string(),
                micro_deposit.return_code,
                micro_deposit.created.to_rfc3339(),
            ],
        )?;
        for transfer_id in &micro_deposit.transfer_ids {
            tx.execute(
                "INSERT INTO micro_deposit_transfers (transfer_id, micro_deposit_id) VALUES (?1, ?2)",
                params![transfer_id, micro_deposit.id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn latest_micro_deposit(&self, destination: &PartyRef) -> Result<Option<MicroDeposit>> {
        let conn = self.conn()?;
        let micro_deposit = conn
            .query_row(
                &format!(
                    "SELECT {} FROM micro_deposits
                     WHERE destination_customer_id = ?1 AND destination_account_id = ?2
                     ORDER BY created_at DESC
                     LIMIT 1",
                    MICRO_DEPOSIT_COLUMNS
                ),
                params![destination.customer_id, destination.account_id],
                micro_deposit_from_row,
            )
            .optional()?;
        Ok(micro_deposit)
    }

    fn find_micro_deposit_by_transfer(&self, transfer_id: &str) -> Result<Option<MicroDeposit>> {
        let conn = self.conn()?;
        let micro_deposit = conn
            .query_row(
                &format!(
                    "SELECT {} FROM micro_deposits
                     WHERE id = (SELECT micro_deposit_id FROM micro_deposit_transfers WHERE transfer_id = ?1)",
                    MICRO_DEPOSIT_COLUMNS
                ),
                [transfer_id],
                micro_deposit_from_row,
            )
            .optional()?;
        Ok(micro_deposit)
    }

    fn update_micro_deposit(
        &self,
        id: &str,
        status: TransferStatus,
        return_code: Option<&str>,
    ) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE micro_deposits SET status = ?1, return_code = COALESCE(?2, return_code)
             WHERE id = ?3",
            params![status.to_string(), return_code, id],
        )?;
        if updated == 0 {
            return Err(AchError::NotFound(format!("micro-deposit {}", id)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_transfers: usize,
    pub pending_transfers: usize,
    pub processed_transfers: usize,
    pub failed_transfers: usize,
    pub total_depositories: usize,
    pub verified_depositories: usize,
    pub rejected_depositories: usize,
    pub micro_deposits: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn transfer(amount: &str) -> Transfer {
        Transfer::new(
            amount.parse().unwrap(),
            PartyRef::new("cust-a", "acct-a"),
            PartyRef::new("cust-b", "acct-b"),
            "rent",
        )
    }

    #[test]
    fn test_transfer_round_trip_and_status() {
        let db = Database::in_memory().unwrap();
        let t = transfer("USD 12.47");
        db.create_transfer(&t).unwrap();

        let loaded = db.get_transfer(&t.id).unwrap().unwrap();
        assert_eq!(loaded.amount, t.amount);
        assert_eq!(loaded.source, t.source);
        assert_eq!(loaded.status, TransferStatus::Pending);

        db.update_transfer_status(&t.id, TransferStatus::Failed, Some("R01"))
            .unwrap();
        let loaded = db.get_transfer(&t.id).unwrap().unwrap();
        assert_eq!(loaded.status, TransferStatus::Failed);
        assert_eq!(loaded.return_code.as_deref(), Some("R01"));

        assert_eq!(db.list_transfers("cust-b").unwrap().len(), 1);
        assert!(db.list_transfers("cust-z").unwrap().is_empty());
        assert!(matches!(
            db.update_transfer_status("missing", TransferStatus::Failed, None),
            Err(AchError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_transfer_by_trace() {
        let db = Database::in_memory().unwrap();
        let t = transfer("USD 1.00");
        db.create_transfer(&t).unwrap();
        db.save_trace_numbers(&t.id, &["231380100000001".to_string()])
            .unwrap();

        let found = db.find_transfer_by_trace("231380100000001").unwrap().unwrap();
        assert_eq!(found.id, t.id);
        assert!(db.find_transfer_by_trace("231380100000002").unwrap().is_none());
    }

    #[test]
    fn test_depository_status() {
        let db = Database::in_memory().unwrap();
        let dep = Depository::new("cust-a", "acct-a", "231380104", "123456789", "Jane");
        db.upsert_depository(&dep).unwrap();
        db.update_depository_status("acct-a", DepositoryStatus::Verified)
            .unwrap();
        let loaded = db.get_depository("acct-a").unwrap().unwrap();
        assert_eq!(loaded.status, DepositoryStatus::Verified);
        assert_eq!(db.list_depositories("cust-a").unwrap().len(), 1);
    }

    #[test]
    fn test_rejected_depository_stays_rejected() {
        let db = Database::in_memory().unwrap();
        let dep = Depository::new("cust-a", "acct-a", "231380104", "123456789", "Jane");
        db.upsert_depository(&dep).unwrap();
        db.update_depository_status("acct-a", DepositoryStatus::Rejected)
            .unwrap();

        let err = db
            .update_depository_status("acct-a", DepositoryStatus::Verified)
            .unwrap_err();
        assert!(matches!(err, AchError::Policy(_)));
        db.update_depository_status("acct-a", DepositoryStatus::Rejected)
            .unwrap();

        // re-registering the account does not reset it either
        db.upsert_depository(&dep).unwrap();
        let loaded = db.get_depository("acct-a").unwrap().unwrap();
        assert_eq!(loaded.status, DepositoryStatus::Rejected);
        assert!(matches!(
            db.update_depository_status("acct-b", DepositoryStatus::Verified),
            Err(AchError::NotFound(_))
        ));
    }

    #[test]
    fn test_micro_deposit_is_written_with_transfers() {
        let db = Database::in_memory().unwrap();
        let credit = transfer("USD 0.10");
        let debit = transfer("USD 0.10");
        let md = MicroDeposit {
            id: "md-1".to_string(),
            destination: PartyRef::new("cust-b", "acct-b"),
            amounts: vec!["USD 0.10".parse().unwrap()],
            transfer_ids: vec![credit.id.clone(), debit.id.clone()],
            status: TransferStatus::Pending,
            return_code: None,
            created: Utc::now(),
        };
        db.create_micro_deposit(
            &md,
            &[
                (credit.clone(), vec!["231380100000001".to_string()]),
                (debit.clone(), vec![]),
            ],
        )
        .unwrap();

        let latest = db
            .latest_micro_deposit(&PartyRef::new("cust-b", "acct-b"))
            .unwrap()
            .unwrap();
        assert_eq!(latest, md);
        assert_eq!(
            db.find_micro_deposit_by_transfer(&debit.id).unwrap().unwrap().id,
            "md-1"
        );
        assert!(db.get_transfer(&credit.id).unwrap().is_some());
        assert!(db.find_transfer_by_trace("231380100000001").unwrap().is_some());
    }

    #[test]
    fn test_failed_micro_deposit_insert_rolls_back() {
        let db = Database::in_memory().unwrap();
        let t = transfer("USD 0.10");
        db.create_transfer(&t).unwrap();

        let other = transfer("USD 0.05");
        let md = MicroDeposit {
            id: "md-2".to_string(),
            destination: PartyRef::new("cust-b", "acct-b"),
            amounts: vec![],
            transfer_ids: vec![other.id.clone()],
            status: TransferStatus::Pending,
            return_code: None,
            created: Utc::now(),
        };
        // duplicate primary key on the second transfer aborts the transaction
        assert!(db
            .create_micro_deposit(&md, &[(other.clone(), vec![]), (t, vec![])])
            .is_err());
        assert!(db.get_transfer(&other.id).unwrap().is_none());
        assert!(db
            .latest_micro_deposit(&PartyRef::new("cust-b", "acct-b"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_attempt_counting() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        db.record_attempt("acct-a", now - Duration::days(2)).unwrap();
        db.record_attempt("acct-a", now).unwrap();
        db.record_attempt("acct-b", now).unwrap();
        assert_eq!(
            db.count_attempts_since("acct-a", now - Duration::hours(1)).unwrap(),
            1
        );
    }

    #[test]
    fn test_stats() {
        let db = Database::in_memory().unwrap();
        db.create_transfer(&transfer("USD 1.00")).unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_transfers, 1);
        assert_eq!(stats.pending_transfers, 1);
        assert_eq!(stats.micro_deposits, 0);
    }
}

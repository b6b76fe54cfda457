pub mod db;
pub mod models;

pub use db::{Database, DatabaseStats};
pub use models::{Depository, DepositoryStatus, MicroDeposit, Transfer, TransferStatus};

use crate::{directory::PartyRef, error::Result};

pub trait TransferRepository: Send + Sync {
    fn create_transfer(&self, transfer: &Transfer) -> Result<()>;

    fn get_transfer(&self, id: &str) -> Result<Option<Transfer>>;

    fn update_transfer_status(
        &self,
        id: &str,
        status: TransferStatus,
        return_code: Option<&str>,
    ) -> Result<()>;

    /// Transfers where the customer is either side.
    fn list_transfers(&self, customer_id: &str) -> Result<Vec<Transfer>>;

    fn save_trace_numbers(&self, transfer_id: &str, traces: &[String]) -> Result<()>;

    fn find_transfer_by_trace(&self, trace_number: &str) -> Result<Option<Transfer>>;
}

pub trait DepositoryRepository: Send + Sync {
    fn upsert_depository(&self, depository: &Depository) -> Result<()>;

    fn get_depository(&self, id: &str) -> Result<Option<Depository>>;

    fn update_depository_status(&self, id: &str, status: DepositoryStatus) -> Result<()>;

    fn list_depositories(&self, customer_id: &str) -> Result<Vec<Depository>>;
}

/// Micro-deposits own their transfers, so the store for one is the store for both.
pub trait MicroDepositRepository: TransferRepository {
    /// Writes the micro-deposit, its transfers and their trace numbers in one
    /// transaction.
    fn create_micro_deposit(
        &self,
        micro_deposit: &MicroDeposit,
        transfers: &[(Transfer, Vec<String>)],
    ) -> Result<()>;

    /// Most recent micro-deposit sent to `destination`.
    fn latest_micro_deposit(&self, destination: &PartyRef) -> Result<Option<MicroDeposit>>;

    fn find_micro_deposit_by_transfer(&self, transfer_id: &str) -> Result<Option<MicroDeposit>>;

    fn update_micro_deposit(
        &self,
        id: &str,
        status: TransferStatus,
        return_code: Option<&str>,
    ) -> Result<()>;
}

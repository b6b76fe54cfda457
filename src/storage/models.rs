use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{directory::PartyRef, money::Amount};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Reviewable,
    Processed,
    Canceled,
    Failed,
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Reviewable => write!(f, "reviewable"),
            TransferStatus::Processed => write!(f, "processed"),
            TransferStatus::Canceled => write!(f, "canceled"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "reviewable" => Ok(TransferStatus::Reviewable),
            "processed" => Ok(TransferStatus::Processed),
            "canceled" => Ok(TransferStatus::Canceled),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(format!("unknown transfer status {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    pub id: String,
    pub amount: Amount,
    pub source: PartyRef,
    pub destination: PartyRef,
    pub description: String,
    pub status: TransferStatus,
    pub same_day: bool,
    pub return_code: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Transfer {
    pub fn new(amount: Amount, source: PartyRef, destination: PartyRef, description: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            source,
            destination,
            description: description.to_string(),
            status: TransferStatus::Pending,
            same_day: false,
            return_code: None,
            created: now,
            updated: now,
        }
    }

    pub fn same_day(mut self, same_day: bool) -> Self {
        self.same_day = same_day;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DepositoryStatus {
    Unverified,
    Verified,
    Rejected,
    Suspended,
}

impl std::fmt::Display for DepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepositoryStatus::Unverified => write!(f, "unverified"),
            DepositoryStatus::Verified => write!(f, "verified"),
            DepositoryStatus::Rejected => write!(f, "rejected"),
            DepositoryStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl std::str::FromStr for DepositoryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(DepositoryStatus::Unverified),
            "verified" => Ok(DepositoryStatus::Verified),
            "rejected" => Ok(DepositoryStatus::Rejected),
            "suspended" => Ok(DepositoryStatus::Suspended),
            other => Err(format!("unknown depository status {:?}", other)),
        }
    }
}

/// This core's verification record for an external account.
///
/// `id` is the external account id; the account number itself is only kept as
/// a hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Depository {
    pub id: String,
    pub customer_id: String,
    pub routing_number: String,
    pub account_hash: String,
    pub holder_name: String,
    pub status: DepositoryStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Depository {
    pub fn new(
        customer_id: &str,
        account_id: &str,
        routing_number: &str,
        account_number: &str,
        holder_name: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: account_id.to_string(),
            customer_id: customer_id.to_string(),
            routing_number: routing_number.to_string(),
            account_hash: hash_account_number(routing_number, account_number),
            holder_name: holder_name.to_string(),
            status: DepositoryStatus::Unverified,
            created: now,
            updated: now,
        }
    }
}

pub fn hash_account_number(routing_number: &str, account_number: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(routing_number.as_bytes());
    hasher.update(b":");
    hasher.update(account_number.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MicroDeposit {
    pub id: String,
    pub destination: PartyRef,
    pub amounts: Vec<Amount>,
    pub transfer_ids: Vec<String>,
    pub status: TransferStatus,
    pub return_code: Option<String>,
    pub created: DateTime<Utc>,
}

impl MicroDeposit {
    /// Status of the least settled linked transfer.
    pub fn status_from(transfers: &[TransferStatus]) -> TransferStatus {
        fn rank(status: &TransferStatus) -> u8 {
            match status {
                TransferStatus::Failed => 4,
                TransferStatus::Canceled => 3,
                TransferStatus::Pending => 2,
                TransferStatus::Reviewable => 2,
                TransferStatus::Processed => 1,
            }
        }
        transfers
            .iter()
            .max_by_key(|s| rank(s))
            .copied()
            .unwrap_or(TransferStatus::Pending)
    }
}

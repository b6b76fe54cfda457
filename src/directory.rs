use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::RwLock;

use crate::{
    error::{AchError, Result},
    nacha::TransactionCode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
}

impl AccountType {
    pub fn credit_code(&self) -> TransactionCode {
        match self {
            AccountType::Checking => TransactionCode::CHECKING_CREDIT,
            AccountType::Savings => TransactionCode::SAVINGS_CREDIT,
        }
    }

    pub fn debit_code(&self) -> TransactionCode {
        match self {
            AccountType::Checking => TransactionCode::CHECKING_DEBIT,
            AccountType::Savings => TransactionCode::SAVINGS_DEBIT,
        }
    }
}

/// Live status of an external account as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartyStatus {
    Unverified,
    Verified,
    ReceiveOnly,
    Rejected,
    Suspended,
}

impl PartyStatus {
    pub fn can_debit(&self) -> bool {
        matches!(self, PartyStatus::Unverified | PartyStatus::Verified)
    }
}

/// Reference to an external customer's account, as stored on transfers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyRef {
    pub customer_id: String,
    pub account_id: String,
}

impl PartyRef {
    pub fn new(customer_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            account_id: account_id.into(),
        }
    }
}

impl fmt::Display for PartyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.customer_id, self.account_id)
    }
}

impl std::str::FromStr for PartyRef {
    type Err = AchError;

    /// Parses the `customer/account` form written by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((customer, account))
                if !customer.is_empty() && !account.is_empty() && !account.contains('/') =>
            {
                Ok(PartyRef::new(customer, account))
            }
            _ => Err(AchError::validation(format!(
                "party {:?} must be written as customer/account",
                s
            ))),
        }
    }
}

/// An account holder with the details needed to build entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub customer_id: String,
    pub account_id: String,
    pub holder_name: String,
    pub routing_number: String,
    pub account_type: AccountType,
    pub masked_account_number: String,
    pub status: PartyStatus,
}

impl Party {
    pub fn reference(&self) -> PartyRef {
        PartyRef::new(&self.customer_id, &self.account_id)
    }
}

/// Plaintext account number. Formatting always masks it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountNumber(String);

impl AccountNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        crate::utils::mask_account_number(&self.0)
    }
}

impl fmt::Debug for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountNumber({})", self.masked())
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// A party together with its decrypted account number, ready for entry building.
#[derive(Debug, Clone)]
pub struct ResolvedParty {
    pub party: Party,
    pub account_number: AccountNumber,
}

/// Remote customer/account lookup and account-number decryption.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn party(&self, customer_id: &str, account_id: &str) -> Result<Party>;

    async fn account_number(&self, customer_id: &str, account_id: &str) -> Result<AccountNumber>;
}

/// Fetches both halves of a party in one call.
pub async fn resolve(directory: &dyn AccountDirectory, party: &PartyRef) -> Result<ResolvedParty> {
    let found = directory.party(&party.customer_id, &party.account_id).await?;
    let account_number = directory
        .account_number(&party.customer_id, &party.account_id)
        .await?;
    Ok(ResolvedParty {
        party: found,
        account_number,
    })
}

#[derive(Debug, Clone, Deserialize)]
struct DirectoryRecord {
    #[serde(flatten)]
    party: Party,
    account_number: String,
}

/// Directory held in memory, optionally seeded from a JSON array of accounts.
#[derive(Default)]
pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<(String, String), (Party, AccountNumber)>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<DirectoryRecord> = serde_json::from_str(&raw)?;
        let directory = Self::new();
        for record in records {
            directory.insert(record.party, AccountNumber::new(record.account_number));
        }
        Ok(directory)
    }

    pub fn insert(&self, party: Party, account_number: AccountNumber) {
        let key = (party.customer_id.clone(), party.account_id.clone());
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(key, (party, account_number));
        }
    }

    pub fn set_status(&self, customer_id: &str, account_id: &str, status: PartyStatus) {
        if let Ok(mut accounts) = self.accounts.write() {
            if let Some((party, _)) =
                accounts.get_mut(&(customer_id.to_string(), account_id.to_string()))
            {
                party.status = status;
            }
        }
    }

    fn lookup(&self, customer_id: &str, account_id: &str) -> Result<(Party, AccountNumber)> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| AchError::Other(anyhow::anyhow!("account directory lock poisoned")))?;
        accounts
            .get(&(customer_id.to_string(), account_id.to_string()))
            .cloned()
            .ok_or_else(|| AchError::NotFound(format!("account {}/{}", customer_id, account_id)))
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn party(&self, customer_id: &str, account_id: &str) -> Result<Party> {
        Ok(self.lookup(customer_id, account_id)?.0)
    }

    async fn account_number(&self, customer_id: &str, account_id: &str) -> Result<AccountNumber> {
        Ok(self.lookup(customer_id, account_id)?.1)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub fn party(customer: &str, account: &str, routing: &str, kind: AccountType) -> Party {
        Party {
            customer_id: customer.to_string(),
            account_id: account.to_string(),
            holder_name: format!("{} holder", customer),
            routing_number: routing.to_string(),
            account_type: kind,
            masked_account_number: "****6789".to_string(),
            status: PartyStatus::Verified,
        }
    }

    pub fn resolved(customer: &str, account: &str, routing: &str, kind: AccountType) -> ResolvedParty {
        ResolvedParty {
            party: party(customer, account, routing, kind),
            account_number: AccountNumber::new(format!("{}6789", account.len())),
        }
    }
}

use serde::Deserialize;

use crate::{
    directory::{AccountType, PartyRef},
    error::{AchError, Result},
    outbound::schedule::CutoffSchedule,
    routing,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub odfi: OdfiConfig,
    #[serde(default)]
    pub cutoffs: Vec<CutoffConfig>,
    pub inbound: InboundConfig,
    pub transport: TransportConfig,
    pub staging: StagingConfig,
    pub fund_flow: FundFlowConfig,
    pub micro_deposits: Option<MicroDepositConfig>,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// The originating bank and the company this service originates for.
#[derive(Debug, Deserialize, Clone)]
pub struct OdfiConfig {
    pub routing_number: String,
    /// Immediate origin written into file headers. Defaults to the routing number.
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub origin_name: String,
    #[serde(default)]
    pub destination_name: String,
    pub company_id: String,
    pub company_name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_sec")]
    pub standard_entry_class: String,
    #[serde(default = "default_entry_description")]
    pub entry_description: String,
    #[serde(default = "default_true")]
    pub include_addenda: bool,
    #[serde(default)]
    pub offset: Option<OffsetConfig>,
}

impl OdfiConfig {
    pub fn origin(&self) -> &str {
        self.origin.as_deref().unwrap_or(&self.routing_number)
    }
}

/// ODFI account used to balance batches.
#[derive(Debug, Deserialize, Clone)]
pub struct OffsetConfig {
    pub account_number: String,
    pub account_type: AccountType,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CutoffConfig {
    pub routing_number: String,
    pub timezone: String,
    /// `HH:MM` local times.
    pub windows: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InboundConfig {
    /// Zero disables the inbound pipeline.
    pub interval_secs: u64,
    #[serde(default)]
    pub keep_local_files: bool,
    #[serde(default)]
    pub local_dir: Option<String>,
    #[serde(default)]
    pub retain_remote_files: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Mailbox root for the directory connector.
    pub root: String,
    /// Address the mailbox host is reached through; checked against `allowed_ips`.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_inbound_path")]
    pub inbound_path: String,
    #[serde(default = "default_outbound_path")]
    pub outbound_path: String,
    #[serde(default = "default_return_path")]
    pub return_path: String,
    /// Single IPs or CIDR blocks. Empty allows every address.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    pub dir: String,
    #[serde(default = "default_trigger_timeout")]
    pub trigger_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FundFlowKind {
    FirstParty,
    ThirdParty,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementPosture {
    Hold,
    PreFund,
    CreditLine,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FundFlowConfig {
    pub kind: FundFlowKind,
    #[serde(default = "default_posture")]
    pub posture: SettlementPosture,
    #[serde(default = "default_hold_days")]
    pub hold_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MicroDepositConfig {
    /// Account the challenge credits are sent from.
    pub source_customer_id: String,
    pub source_account_id: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl MicroDepositConfig {
    pub fn source(&self) -> PartyRef {
        PartyRef::new(&self.source_customer_id, &self.source_account_id)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DirectoryConfig {
    /// JSON array of accounts loaded into the in-memory directory.
    #[serde(default)]
    pub seed_file: Option<String>,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_sec() -> String {
    "PPD".to_string()
}

fn default_entry_description() -> String {
    "TRANSFER".to_string()
}

fn default_true() -> bool {
    true
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_inbound_path() -> String {
    "inbound".to_string()
}

fn default_outbound_path() -> String {
    "outbound".to_string()
}

fn default_return_path() -> String {
    "returned".to_string()
}

fn default_trigger_timeout() -> u64 {
    30
}

fn default_posture() -> SettlementPosture {
    SettlementPosture::Hold
}

fn default_hold_days() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(
                config::Environment::with_prefix("ACH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Startup checks that would otherwise surface as failed cutoffs or files.
    pub fn validate(&self) -> Result<()> {
        if !routing::is_valid_routing_number(&self.odfi.routing_number) {
            return Err(AchError::Config(format!(
                "odfi.routing_number {:?} is not a valid routing number",
                self.odfi.routing_number
            )));
        }
        if self.odfi.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AchError::Config(format!(
                "odfi.timezone {:?} is not an IANA timezone",
                self.odfi.timezone
            )));
        }
        if crate::nacha::StandardEntryClass::parse(&self.odfi.standard_entry_class).is_none() {
            return Err(AchError::Config(format!(
                "odfi.standard_entry_class {:?} is not supported",
                self.odfi.standard_entry_class
            )));
        }
        for cutoff in &self.cutoffs {
            if !routing::is_valid_routing_number(&cutoff.routing_number) {
                return Err(AchError::Config(format!(
                    "cutoff routing number {:?} is invalid",
                    cutoff.routing_number
                )));
            }
        }
        CutoffSchedule::from_config(&self.cutoffs)?;
        if let Some(md) = &self.micro_deposits {
            if md.max_attempts == 0 {
                return Err(AchError::Config(
                    "micro_deposits.max_attempts must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

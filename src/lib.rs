pub mod builder;
pub mod config;
pub mod depository;
pub mod directory;
pub mod error;
pub mod events;
pub mod fundflow;
pub mod inbound;
pub mod metrics;
pub mod microdeposit;
pub mod money;
pub mod nacha;
pub mod outbound;
pub mod routing;
pub mod storage;
pub mod transport;
pub mod utils;

pub use config::Config;
pub use error::{AchError, Result};
pub use money::Amount;

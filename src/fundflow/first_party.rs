use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::{
    builder::FileBuilder,
    directory::ResolvedParty,
    error::Result,
    fundflow::{LegFile, LegKind, ReturnedEntry, Strategy},
    storage::Transfer,
};

/// The ODFI holds one side of every transfer, so a single entry moves the money.
pub struct FirstParty {
    builder: Arc<FileBuilder>,
}

impl FirstParty {
    pub fn new(builder: Arc<FileBuilder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Strategy for FirstParty {
    async fn originate(
        &self,
        company_id: &str,
        transfer: &Transfer,
        source: &ResolvedParty,
        destination: &ResolvedParty,
    ) -> Result<Vec<LegFile>> {
        let file = self
            .builder
            .build_for(company_id, transfer, source, destination)?;
        Ok(vec![LegFile {
            kind: LegKind::Single,
            file,
        }])
    }

    async fn handle_return(
        &self,
        returned: &ReturnedEntry,
        transfer: &Transfer,
    ) -> Result<Vec<LegFile>> {
        info!(
            "Transfer {} returned with {}, nothing to reverse",
            transfer.id, returned.return_code
        );
        Ok(Vec::new())
    }
}

pub mod codes;

pub use codes::{lookup, ReturnCode, ReturnEffect, RETURN_CODES};

use tracing::{debug, info};

use crate::{
    error::Result,
    storage::{DepositoryRepository, DepositoryStatus},
};

/// New `(originator, receiver)` statuses after a return with `code`.
///
/// Unknown codes change nothing, and a rejected depository stays rejected.
pub fn apply_return_code(
    code: &str,
    originator: DepositoryStatus,
    receiver: DepositoryStatus,
) -> (DepositoryStatus, DepositoryStatus) {
    match lookup(code).map(|rc| rc.effect) {
        Some(ReturnEffect::RejectReceiver) => (originator, DepositoryStatus::Rejected),
        Some(ReturnEffect::RejectOriginator) => (DepositoryStatus::Rejected, receiver),
        Some(ReturnEffect::None) | None => (originator, receiver),
    }
}

/// Applies a return to the stored depositories of both parties.
///
/// A party with no depository record is left alone.
pub fn record_return(
    repo: &dyn DepositoryRepository,
    code: &str,
    originator_id: &str,
    receiver_id: &str,
) -> Result<()> {
    let originator = repo.get_depository(originator_id)?;
    let receiver = repo.get_depository(receiver_id)?;

    let before = (
        originator.as_ref().map(|d| d.status),
        receiver.as_ref().map(|d| d.status),
    );
    let (new_originator, new_receiver) = apply_return_code(
        code,
        before.0.unwrap_or(DepositoryStatus::Unverified),
        before.1.unwrap_or(DepositoryStatus::Unverified),
    );

    for (id, old, new) in [
        (originator_id, before.0, new_originator),
        (receiver_id, before.1, new_receiver),
    ] {
        match old {
            Some(old) if old != new => {
                info!("Depository {} moved {} -> {} after {}", id, old, new, code);
                repo.update_depository_status(id, new)?;
            }
            Some(_) => {}
            None => debug!("No depository record for {}, skipping {}", id, code),
        }
    }
    Ok(())
}

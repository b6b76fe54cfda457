use serde::Serialize;

/// Which party a return code blames, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnEffect {
    /// The receiving account is unusable.
    RejectReceiver,
    /// The originating account is unusable.
    RejectOriginator,
    /// Operational; account statuses stay as they are.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReturnCode {
    pub code: &'static str,
    pub reason: &'static str,
    pub description: &'static str,
    pub effect: ReturnEffect,
}

macro_rules! code {
    ($code:literal, $effect:ident, $reason:literal, $description:literal) => {
        ReturnCode {
            code: $code,
            reason: $reason,
            description: $description,
            effect: ReturnEffect::$effect,
        }
    };
}

pub const RETURN_CODES: &[ReturnCode] = &[
    code!("R01", None, "Insufficient Funds", "Available balance is not sufficient to cover the dollar value of the debit entry"),
    code!("R02", RejectReceiver, "Account Closed", "Previously active account has been closed by customer or RDFI"),
    code!("R03", RejectReceiver, "No Account/Unable to Locate Account", "Account number structure is valid and passes editing process, but does not correspond to individual or is not an open account"),
    code!("R04", RejectReceiver, "Invalid Account Number", "Account number structure not valid; entry may fail check digit validation or may contain an incorrect number of digits"),
    code!("R05", RejectReceiver, "Improper Debit to Consumer Account", "A CCD, CTX, or CBR debit entry was transmitted to a Consumer Account of the Receiver and was not authorized by the Receiver"),
    code!("R06", None, "Returned per ODFI's Request", "ODFI has requested RDFI to return the ACH entry"),
    code!("R07", RejectReceiver, "Authorization Revoked by Customer", "Consumer, who previously authorized ACH payment, has revoked authorization from Originator"),
    code!("R08", None, "Payment Stopped", "Receiver of a recurring debit transaction has stopped payment on a specific ACH debit"),
    code!("R09", None, "Uncollected Funds", "Sufficient book or ledger balance exists to satisfy dollar value of the transaction, but the dollar value of transaction is in process of collection"),
    code!("R10", RejectReceiver, "Customer Advises Not Authorized", "Consumer has advised RDFI that Originator of transaction is not authorized to debit account"),
    code!("R11", None, "Customer Advises Entry Not in Accordance with the Terms of the Authorization", "The Originator and Receiver have a relationship and an authorization to debit exists, but there is an error or defect in the payment"),
    code!("R12", RejectReceiver, "Branch Sold to Another DFI", "Financial institution receives entry destined for an account at a branch that has been sold to another financial institution"),
    code!("R13", RejectReceiver, "Invalid ACH Routing Number", "Entry contains a Receiving DFI Identification or Gateway Identification that is not a valid ACH routing number"),
    code!("R14", RejectOriginator, "Representative Payee Deceased or Unable to Continue in That Capacity", "The representative payee authorized to accept entries on behalf of a beneficiary is either deceased or unable to continue in that capacity"),
    code!("R15", RejectOriginator, "Beneficiary or Account Holder Deceased", "The beneficiary entitled to payments is deceased, or the account holder other than a representative payee is deceased"),
    code!("R16", RejectReceiver, "Account Frozen", "Funds in the account are unavailable due to action by the RDFI or legal order"),
    code!("R17", None, "File Record Edit Criteria", "Fields rejected by RDFI processing (identified in return addenda)"),
    code!("R18", None, "Improper Effective Entry Date", "Entries have been presented prior to the first available processing window for the effective date"),
    code!("R19", None, "Amount Field Error", "Improper formatting of the amount field"),
    code!("R20", RejectReceiver, "Non-Payment Bearing Account", "Entry destined for non-payment bearing account"),
    code!("R21", None, "Invalid Company Identification", "The company ID information not valid (normally CIE entries)"),
    code!("R22", None, "Invalid Individual ID Number", "Individual id used by receiver is incorrect (CIE entries)"),
    code!("R23", None, "Credit Entry Refused by Receiver", "Receiver returned entry because minimum or exact amount not remitted, bank account is subject to litigation, or payment represents an overpayment"),
    code!("R24", None, "Duplicate Entry", "RDFI has received a duplicate entry"),
    code!("R25", None, "Addenda Error", "Improper formatting of the addenda record information"),
    code!("R26", None, "Mandatory Field Error", "Improper information in one of the mandatory fields"),
    code!("R27", None, "Trace Number Error", "Original entry trace number is not valid for return entry; or addenda trace numbers do not correspond with entry detail record"),
    code!("R28", RejectReceiver, "Routing Number Check Digit Error", "Check digit for the transit routing number is incorrect"),
    code!("R29", RejectReceiver, "Corporate Customer Advises Not Authorized", "RDFI has been notified by corporate receiver that debit entry of originator is not authorized"),
    code!("R30", RejectReceiver, "RDFI Not Participant in Check Truncation Program", "Financial institution not participating in automated check safekeeping application"),
    code!("R31", None, "Permissible Return Entry (CCD and CTX only)", "RDFI has been notified by the ODFI that it agrees to accept a CCD or CTX return entry"),
    code!("R32", RejectReceiver, "RDFI Non-Settlement", "RDFI is not able to settle the entry"),
    code!("R33", None, "Return of XCK Entry", "RDFI determines at its sole discretion to return an XCK entry"),
    code!("R34", RejectReceiver, "Limited Participation DFI", "RDFI participation has been limited by a federal or state supervisor"),
    code!("R35", None, "Return of Improper Debit Entry", "ACH debit not permitted for use with the CIE standard entry class code"),
    code!("R36", None, "Return of Improper Credit Entry", "ACH credit entries not permitted for use with the ARC, BOC, POP, RCK, TEL, XCK standard entry class codes"),
    code!("R37", RejectReceiver, "Source Document Presented for Payment", "The source document to which an ARC, BOC or POP entry relates has been presented for payment"),
    code!("R38", RejectReceiver, "Stop Payment on Source Document", "Receiver has placed a stop payment order on the source document of an ARC or BOC entry"),
    code!("R39", RejectReceiver, "Improper Source Document", "The Receiver's source document has been presented for payment"),
];

/// Looks up a return code, ignoring surrounding whitespace and case.
pub fn lookup(code: &str) -> Option<&'static ReturnCode> {
    let code = code.trim();
    RETURN_CODES
        .iter()
        .find(|rc| rc.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_complete_and_ordered() {
        assert_eq!(RETURN_CODES.len(), 39);
        for (i, rc) in RETURN_CODES.iter().enumerate() {
            assert_eq!(rc.code, format!("R{:02}", i + 1));
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("R01").unwrap().reason, "Insufficient Funds");
        assert_eq!(lookup(" r02 ").unwrap().effect, ReturnEffect::RejectReceiver);
        assert!(lookup("R99").is_none());
    }
}

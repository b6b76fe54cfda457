use serde::{Deserialize, Serialize};
use std::fmt;

/// Batch-level indicator of which directions a batch may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceClass {
    Mixed,
    CreditsOnly,
    DebitsOnly,
}

impl ServiceClass {
    pub fn code(&self) -> u16 {
        match self {
            ServiceClass::Mixed => 200,
            ServiceClass::CreditsOnly => 220,
            ServiceClass::DebitsOnly => 225,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(ServiceClass::Mixed),
            220 => Some(ServiceClass::CreditsOnly),
            225 => Some(ServiceClass::DebitsOnly),
            _ => None,
        }
    }

    /// Narrowest class able to carry the given mix of entries.
    pub fn for_entries(has_credits: bool, has_debits: bool) -> Self {
        match (has_credits, has_debits) {
            (true, false) => ServiceClass::CreditsOnly,
            (false, true) => ServiceClass::DebitsOnly,
            _ => ServiceClass::Mixed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardEntryClass {
    Ppd,
    Ccd,
    Web,
    Tel,
    Cor,
}

impl StandardEntryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardEntryClass::Ppd => "PPD",
            StandardEntryClass::Ccd => "CCD",
            StandardEntryClass::Web => "WEB",
            StandardEntryClass::Tel => "TEL",
            StandardEntryClass::Cor => "COR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PPD" => Some(StandardEntryClass::Ppd),
            "CCD" => Some(StandardEntryClass::Ccd),
            "WEB" => Some(StandardEntryClass::Web),
            "TEL" => Some(StandardEntryClass::Tel),
            "COR" => Some(StandardEntryClass::Cor),
            _ => None,
        }
    }
}

impl fmt::Display for StandardEntryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-digit entry transaction code.
///
/// The tens digit selects the account kind (2 checking, 3 savings, 4 general
/// ledger, 5 loan) and the units digit the direction and purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionCode(pub u8);

impl TransactionCode {
    pub const CHECKING_RETURN_CREDIT: Self = Self(21);
    pub const CHECKING_CREDIT: Self = Self(22);
    pub const CHECKING_PRENOTE_CREDIT: Self = Self(23);
    pub const CHECKING_ZERO_DOLLAR_CREDIT: Self = Self(24);
    pub const CHECKING_RETURN_DEBIT: Self = Self(26);
    pub const CHECKING_DEBIT: Self = Self(27);
    pub const CHECKING_PRENOTE_DEBIT: Self = Self(28);
    pub const CHECKING_ZERO_DOLLAR_DEBIT: Self = Self(29);
    pub const SAVINGS_RETURN_CREDIT: Self = Self(31);
    pub const SAVINGS_CREDIT: Self = Self(32);
    pub const SAVINGS_PRENOTE_CREDIT: Self = Self(33);
    pub const SAVINGS_ZERO_DOLLAR_CREDIT: Self = Self(34);
    pub const SAVINGS_RETURN_DEBIT: Self = Self(36);
    pub const SAVINGS_DEBIT: Self = Self(37);
    pub const SAVINGS_PRENOTE_DEBIT: Self = Self(38);
    pub const SAVINGS_ZERO_DOLLAR_DEBIT: Self = Self(39);
    pub const GL_CREDIT: Self = Self(42);
    pub const GL_PRENOTE_CREDIT: Self = Self(43);
    pub const GL_DEBIT: Self = Self(47);
    pub const GL_PRENOTE_DEBIT: Self = Self(48);
    pub const LOAN_CREDIT: Self = Self(52);
    pub const LOAN_PRENOTE_CREDIT: Self = Self(53);
    pub const LOAN_DEBIT: Self = Self(55);

    pub fn is_known(&self) -> bool {
        matches!(self.0 / 10, 2..=5) && matches!(self.0 % 10, 1..=9)
    }

    pub fn is_credit(&self) -> bool {
        matches!(self.0 % 10, 1..=4)
    }

    pub fn is_debit(&self) -> bool {
        matches!(self.0 % 10, 5..=9)
    }

    pub fn is_prenote(&self) -> bool {
        matches!(self.0, 23 | 28 | 33 | 38 | 43 | 48 | 53)
    }

    /// The code moving money the other way on the same account kind.
    pub fn opposite(&self) -> Self {
        match self.0 {
            22 => Self(27),
            27 => Self(22),
            23 => Self(28),
            28 => Self(23),
            32 => Self(37),
            37 => Self(32),
            33 => Self(38),
            38 => Self(33),
            42 => Self(47),
            47 => Self(42),
            43 => Self(48),
            48 => Self(43),
            52 => Self(55),
            55 => Self(52),
            other => Self(other),
        }
    }
}

impl fmt::Display for TransactionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions() {
        assert!(TransactionCode::CHECKING_CREDIT.is_credit());
        assert!(TransactionCode::SAVINGS_DEBIT.is_debit());
        assert!(TransactionCode::CHECKING_RETURN_DEBIT.is_debit());
        assert!(!TransactionCode::CHECKING_CREDIT.is_prenote());
        assert!(TransactionCode::SAVINGS_PRENOTE_DEBIT.is_prenote());
    }

    #[test]
    fn test_opposite() {
        assert_eq!(TransactionCode::CHECKING_CREDIT.opposite(), TransactionCode::CHECKING_DEBIT);
        assert_eq!(TransactionCode::SAVINGS_DEBIT.opposite(), TransactionCode::SAVINGS_CREDIT);
        assert_eq!(TransactionCode::LOAN_CREDIT.opposite(), TransactionCode::LOAN_DEBIT);
    }

    #[test]
    fn test_service_class_for_entries() {
        assert_eq!(ServiceClass::for_entries(true, false), ServiceClass::CreditsOnly);
        assert_eq!(ServiceClass::for_entries(false, true), ServiceClass::DebitsOnly);
        assert_eq!(ServiceClass::for_entries(true, true), ServiceClass::Mixed);
        assert_eq!(ServiceClass::from_code(225), Some(ServiceClass::DebitsOnly));
    }
}

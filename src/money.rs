use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{AchError, Result};

/// Active ISO-4217 alphabetic codes.
const ISO_4217: &[&str] = &[
    "AED", "AFN", "ALL", "AMD", "ANG", "AOA", "ARS", "AUD", "AWG", "AZN", "BAM", "BBD", "BDT",
    "BGN", "BHD", "BIF", "BMD", "BND", "BOB", "BOV", "BRL", "BSD", "BTN", "BWP", "BYN", "BZD",
    "CAD", "CDF", "CHE", "CHF", "CHW", "CLF", "CLP", "CNY", "COP", "COU", "CRC", "CUC", "CUP",
    "CVE", "CZK", "DJF", "DKK", "DOP", "DZD", "EGP", "ERN", "ETB", "EUR", "FJD", "FKP", "GBP",
    "GEL", "GHS", "GIP", "GMD", "GNF", "GTQ", "GYD", "HKD", "HNL", "HTG", "HUF", "IDR",
    "ILS", "INR", "IQD", "IRR", "ISK", "JMD", "JOD", "JPY", "KES", "KGS", "KHR", "KMF", "KPW",
    "KRW", "KWD", "KYD", "KZT", "LAK", "LBP", "LKR", "LRD", "LSL", "LYD", "MAD", "MDL", "MGA",
    "MKD", "MMK", "MNT", "MOP", "MRU", "MUR", "MVR", "MWK", "MXN", "MXV", "MYR", "MZN", "NAD",
    "NGN", "NIO", "NOK", "NPR", "NZD", "OMR", "PAB", "PEN", "PGK", "PHP", "PKR", "PLN", "PYG",
    "QAR", "RON", "RSD", "RUB", "RWF", "SAR", "SBD", "SCR", "SDG", "SEK", "SGD", "SHP", "SLE",
    "SLL", "SOS", "SRD", "SSP", "STN", "SVC", "SYP", "SZL", "THB", "TJS", "TMT", "TND", "TOP",
    "TRY", "TTD", "TWD", "TZS", "UAH", "UGX", "USD", "USN", "UYI", "UYU", "UYW", "UZS", "VED",
    "VES", "VND", "VUV", "WST", "XAF", "XAG", "XAU", "XBA", "XBB", "XBC", "XBD", "XCD", "XDR",
    "XOF", "XPD", "XPF", "XPT", "XSU", "XTS", "XUA", "XXX", "YER", "ZAR", "ZMW", "ZWL",
];

pub fn is_iso4217(symbol: &str) -> bool {
    ISO_4217.binary_search(&symbol).is_ok()
}

/// Fixed-point money: an integer count of minor units (cents) plus a currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount {
    number: i64,
    currency: String,
}

impl Amount {
    pub fn from_minor_units(currency: &str, number: i64) -> Result<Self> {
        if !is_iso4217(currency) {
            return Err(AchError::InvalidAmount(format!(
                "unknown currency symbol {:?}",
                currency
            )));
        }
        if number < 0 {
            return Err(AchError::InvalidAmount(format!(
                "negative amount {} {}",
                currency, number
            )));
        }
        Ok(Self {
            number,
            currency: currency.to_string(),
        })
    }

    pub fn zero(currency: &str) -> Result<Self> {
        Self::from_minor_units(currency, 0)
    }

    pub fn minor_units(&self) -> i64 {
        self.number
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.number == 0
    }

    pub fn plus(&self, other: &Amount) -> Result<Amount> {
        if self.currency != other.currency {
            return Err(AchError::DifferentCurrencies {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        let number = self.number.checked_add(other.number).ok_or_else(|| {
            AchError::InvalidAmount(format!("{} + {} overflows", self, other))
        })?;
        Ok(Amount {
            number,
            currency: self.currency.clone(),
        })
    }
}

impl FromStr for Amount {
    type Err = AchError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (symbol, literal) = match (parts.next(), parts.next(), parts.next()) {
            (Some(symbol), Some(literal), None) => (symbol, literal),
            _ => {
                return Err(AchError::InvalidAmount(format!(
                    "{:?} is not of the form \"<SYM> <value>\"",
                    s
                )))
            }
        };

        if !is_iso4217(symbol) {
            return Err(AchError::InvalidAmount(format!(
                "unknown currency symbol {:?}",
                symbol
            )));
        }

        let value = Decimal::from_str(literal)
            .map_err(|e| AchError::InvalidAmount(format!("{:?}: {}", literal, e)))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AchError::InvalidAmount(format!("negative amount {:?}", s)));
        }

        let cents = (value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or_else(|| AchError::InvalidAmount(format!("{:?} is out of range", literal)))?;

        Amount::from_minor_units(symbol, cents)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{:02}",
            self.currency,
            self.number / 100,
            self.number % 100
        )
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

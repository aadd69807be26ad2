//! Currency enumeration and rate value types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// ISO 4217 currency codes handled by the synchronization service.
///
/// The set covers the currencies published by the supported upstream rate
/// tables. There is deliberately no "unknown" variant; codes outside this set
/// are rejected at the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    AED,
    ARS,
    AUD,
    BGN,
    BRL,
    BYN,
    CAD,
    CHF,
    CLP,
    CNY,
    CZK,
    DKK,
    EGP,
    EUR,
    GBP,
    GEL,
    HKD,
    HUF,
    IDR,
    ILS,
    INR,
    ISK,
    JPY,
    KRW,
    KZT,
    MXN,
    MYR,
    NOK,
    NZD,
    PHP,
    PLN,
    RON,
    RSD,
    SAR,
    SEK,
    SGD,
    THB,
    TRY,
    TWD,
    UAH,
    USD,
    VND,
    XDR,
    ZAR,
}

impl Currency {
    /// All known currencies, in code order.
    pub const ALL: &'static [Currency] = &[
        Currency::AED,
        Currency::ARS,
        Currency::AUD,
        Currency::BGN,
        Currency::BRL,
        Currency::BYN,
        Currency::CAD,
        Currency::CHF,
        Currency::CLP,
        Currency::CNY,
        Currency::CZK,
        Currency::DKK,
        Currency::EGP,
        Currency::EUR,
        Currency::GBP,
        Currency::GEL,
        Currency::HKD,
        Currency::HUF,
        Currency::IDR,
        Currency::ILS,
        Currency::INR,
        Currency::ISK,
        Currency::JPY,
        Currency::KRW,
        Currency::KZT,
        Currency::MXN,
        Currency::MYR,
        Currency::NOK,
        Currency::NZD,
        Currency::PHP,
        Currency::PLN,
        Currency::RON,
        Currency::RSD,
        Currency::SAR,
        Currency::SEK,
        Currency::SGD,
        Currency::THB,
        Currency::TRY,
        Currency::TWD,
        Currency::UAH,
        Currency::USD,
        Currency::VND,
        Currency::XDR,
        Currency::ZAR,
    ];

    /// Get the ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::AED => "AED",
            Currency::ARS => "ARS",
            Currency::AUD => "AUD",
            Currency::BGN => "BGN",
            Currency::BRL => "BRL",
            Currency::BYN => "BYN",
            Currency::CAD => "CAD",
            Currency::CHF => "CHF",
            Currency::CLP => "CLP",
            Currency::CNY => "CNY",
            Currency::CZK => "CZK",
            Currency::DKK => "DKK",
            Currency::EGP => "EGP",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::GEL => "GEL",
            Currency::HKD => "HKD",
            Currency::HUF => "HUF",
            Currency::IDR => "IDR",
            Currency::ILS => "ILS",
            Currency::INR => "INR",
            Currency::ISK => "ISK",
            Currency::JPY => "JPY",
            Currency::KRW => "KRW",
            Currency::KZT => "KZT",
            Currency::MXN => "MXN",
            Currency::MYR => "MYR",
            Currency::NOK => "NOK",
            Currency::NZD => "NZD",
            Currency::PHP => "PHP",
            Currency::PLN => "PLN",
            Currency::RON => "RON",
            Currency::RSD => "RSD",
            Currency::SAR => "SAR",
            Currency::SEK => "SEK",
            Currency::SGD => "SGD",
            Currency::THB => "THB",
            Currency::TRY => "TRY",
            Currency::TWD => "TWD",
            Currency::UAH => "UAH",
            Currency::USD => "USD",
            Currency::VND => "VND",
            Currency::XDR => "XDR",
            Currency::ZAR => "ZAR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error returned when a currency code is not in the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown currency code: {0}")]
pub struct UnknownCurrencyError(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or(UnknownCurrencyError(code))
    }
}

/// An amount of one currency, used on one side of an exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyValue {
    /// Currency of the value.
    pub currency: Currency,
    /// Numeric value (high precision decimal).
    pub value: Decimal,
}

impl CurrencyValue {
    /// Create a new currency value.
    pub fn new(currency: Currency, value: Decimal) -> Self {
        Self { currency, value }
    }

    /// One unit of the given currency.
    pub fn one(currency: Currency) -> Self {
        Self {
            currency,
            value: Decimal::ONE,
        }
    }
}

impl fmt::Display for CurrencyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// An exchange rate as contributed by a single provider.
///
/// Oriented as "one unit of the quoted currency equals `to.value` in the base
/// currency", which is how published mid rates read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// Quoted side: one unit of the foreign currency.
    pub from: CurrencyValue,
    /// Base side: the equivalent amount in the base currency.
    pub to: CurrencyValue,
}

impl Rate {
    /// Build a rate from a raw mid quote.
    pub fn from_mid(quoted: Currency, base: Currency, mid: Decimal) -> Self {
        Self {
            from: CurrencyValue::one(quoted),
            to: CurrencyValue::new(base, mid),
        }
    }

    /// The mid value of the quote.
    pub fn mid(&self) -> Decimal {
        self.to.value
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.from, self.to)
    }
}

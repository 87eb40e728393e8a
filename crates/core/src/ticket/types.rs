//! Core ticket data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a ticket.
///
/// `Active` is the only initial state. `Expired` and `Redeemed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    Expired,
    Redeemed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Expired => "expired",
            TicketStatus::Redeemed => "redeemed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TicketStatus::Active),
            "expired" => Ok(TicketStatus::Expired),
            "redeemed" => Ok(TicketStatus::Redeemed),
            other => Err(format!(
                "unknown status {:?} (expected active, expired or redeemed)",
                other
            )),
        }
    }
}

// ============================================================================
// Amount
// ============================================================================

/// Why an amount was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must be a decimal number with at most two fractional digits, got {0:?}")]
    Malformed(String),
    #[error("amount must be at least 0.01")]
    NotPositive,
    #[error("amount must not exceed 999999999999.99")]
    TooLarge,
}

/// A strictly positive monetary amount with two fractional digits,
/// held as integer minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    /// Largest representable amount (fits a DECIMAL(15,2) column).
    pub const MAX_MINOR: i64 = 99_999_999_999_999;

    pub fn from_minor(minor: i64) -> Result<Self, AmountError> {
        if minor <= 0 {
            return Err(AmountError::NotPositive);
        }
        if minor > Self::MAX_MINOR {
            return Err(AmountError::TooLarge);
        }
        Ok(Self(minor))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let malformed = || AmountError::Malformed(s.to_string());

        if raw.starts_with('-') {
            return Err(AmountError::NotPositive);
        }

        let (whole, frac) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(malformed());
        }
        if frac.len() > 2 {
            return Err(malformed());
        }

        let whole = whole.trim_start_matches('0');
        // 13 integer digits already exceed the maximum.
        if whole.len() > 13 {
            return Err(AmountError::TooLarge);
        }
        let whole_units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| malformed())?
        };
        let frac_units: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| malformed())? * 10,
            _ => frac.parse().map_err(|_| malformed())?,
        };

        let minor = whole_units
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac_units))
            .ok_or(AmountError::TooLarge)?;

        Amount::from_minor(minor)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            // f64's Display is the shortest exact representation, so 10.005
            // stays "10.005" and is rejected instead of silently rounded.
            Raw::Number(n) => n.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// A reservation voucher with a unique redemption code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Unique identifier (UUID).
    pub id: String,

    /// Human-presentable redemption code, e.g. `BRT-7KQ2M9XA`.
    pub code: String,

    /// Principal that owns the ticket.
    pub owner_id: String,

    pub amount: Amount,

    pub status: TicketStatus,

    /// None means the ticket never expires on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Set exactly when status is `Redeemed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// True when an expiry is set and has been reached.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

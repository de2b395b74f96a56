// =============================================================================
// Shared types used across the alert-distribution engine
// =============================================================================
//
// Plain enums plus a hand-written `Display` impl, the same pattern the rest
// of this codebase uses for its mode/status enums, rather than leaning on
// serde's string form for logging and formatting.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        };
        write!(f, "{s}")
    }
}

impl Timeframe {
    /// Interval length in milliseconds, used by the scheduler to compute
    /// `nextCheck` for alerts whose interval tracks a timeframe.
    pub fn as_millis(&self) -> i64 {
        match self {
            Timeframe::M1 => 60_000,
            Timeframe::M5 => 5 * 60_000,
            Timeframe::M15 => 15 * 60_000,
            Timeframe::M30 => 30 * 60_000,
            Timeframe::H1 => 60 * 60_000,
            Timeframe::H2 => 2 * 60 * 60_000,
            Timeframe::H4 => 4 * 60 * 60_000,
            Timeframe::H6 => 6 * 60 * 60_000,
            Timeframe::H12 => 12 * 60 * 60_000,
            Timeframe::D1 => 24 * 60 * 60_000,
            Timeframe::W1 => 7 * 24 * 60 * 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    TpHit,
    SlHit,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::TpHit => "TP_HIT",
            Signal::SlHit => "SL_HIT",
        };
        write!(f, "{s}")
    }
}

impl Signal {
    pub fn is_entry(&self) -> bool {
        matches!(self, Signal::Buy | Signal::Sell)
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Signal::TpHit | Signal::SlHit)
    }

    /// Parse case-insensitively, as the webhook contract requires.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "BUY" => Some(Signal::Buy),
            "SELL" => Some(Signal::Sell),
            "TP_HIT" => Some(Signal::TpHit),
            "SL_HIT" => Some(Signal::SlHit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigStatus {
    Active,
    Inactive,
    Testing,
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigStatus::Active => "active",
            ConfigStatus::Inactive => "inactive",
            ConfigStatus::Testing => "testing",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
    Replaced,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
            TradeStatus::Replaced => "replaced",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TpHit,
    SlHit,
    Replaced,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TpHit => "TP_HIT",
            ExitReason::SlHit => "SL_HIT",
            ExitReason::Replaced => "REPLACED",
            ExitReason::Manual => "MANUAL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomingAlertStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAlertType {
    Price,
    Volume,
    Technical,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Price,
    Volume,
    Change,
    ChangePercent,
    MarketCap,
    Sma,
    Ema,
    Rsi,
    Macd,
    Bollinger,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "crosses_above")]
    CrossesAbove,
    #[serde(rename = "crosses_below")]
    CrossesBelow,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "not_between")]
    NotBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Recurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Entry,
    Exit,
    Replace,
    UserAlert,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::Entry => "ENTRY",
            NotificationKind::Exit => "EXIT",
            NotificationKind::Replace => "REPLACE",
            NotificationKind::UserAlert => "USER_ALERT",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_parse_loose_is_case_insensitive() {
        assert_eq!(Signal::parse_loose("buy"), Some(Signal::Buy));
        assert_eq!(Signal::parse_loose("Sell"), Some(Signal::Sell));
        assert_eq!(Signal::parse_loose("tp_hit"), Some(Signal::TpHit));
        assert_eq!(Signal::parse_loose("nonsense"), None);
    }

    #[test]
    fn signal_entry_exit_classification() {
        assert!(Signal::Buy.is_entry());
        assert!(Signal::Sell.is_entry());
        assert!(!Signal::Buy.is_exit());
        assert!(Signal::TpHit.is_exit());
        assert!(Signal::SlHit.is_exit());
    }

    #[test]
    fn timeframe_display_roundtrips_through_parse() {
        for tf in [Timeframe::M1, Timeframe::H4, Timeframe::D1, Timeframe::W1] {
            let rendered = tf.to_string();
            let parsed: Timeframe = serde_json::from_str(&format!("\"{rendered}\"")).unwrap();
            assert_eq!(parsed.to_string(), rendered);
        }
    }

    #[test]
    fn timeframe_millis_ordering() {
        assert!(Timeframe::M1.as_millis() < Timeframe::M5.as_millis());
        assert!(Timeframe::D1.as_millis() < Timeframe::W1.as_millis());
    }
}

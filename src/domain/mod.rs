pub mod alert_configuration;
pub mod incoming_alert;
pub mod principal;
pub mod trade;
pub mod user_alert;

pub use alert_configuration::{AlertConfiguration, Filters, TradeMgmt, Validation};
pub use incoming_alert::{IncomingAlert, IncomingAlertData, Processing, TradeAction};
pub use principal::Principal;
pub use trade::{Pnl, Trade};
pub use user_alert::{Condition, ExecutionRecord, Performance, UserAlert};

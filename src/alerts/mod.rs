//! Rule-based alerting
//!
//! Rules pair a condition on sample data (or on a windowed metric average)
//! with notification actions. Firing is throttled per rule by a cooldown and
//! a lifetime trigger cap, and every fire is kept in an in-memory history
//! that operators acknowledge and resolve.

pub mod config;
pub mod defaults;
pub mod engine;
pub mod notifier;
pub mod record;
pub mod worker;

pub use config::{
    AlertCondition, AlertRule, NotificationAction, Operator, RuleError, RuleOptions, RuleUpdate,
};
pub use defaults::{default_rules, DefaultTargets};
pub use engine::{AlertEngine, EngineConfig, TestOutcome};
pub use notifier::{DispatchError, HttpNotifier, Notifier, NotifierConfig, NotifierError};
pub use record::{AlertRecord, AlertStats, AlertStatus, HistoryFilter, Severity};
pub use worker::AlertWorker;

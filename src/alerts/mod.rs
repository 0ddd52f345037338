//! Alert model, classification, storage and delivery
//!
//! Query results become [`NewAlert`] candidates with a severity picked by
//! the [`classifier`]. The [`AlertStore`] assigns ids, drops duplicates and
//! bounds memory; the [`RetentionWorker`] ages alerts out and the
//! [`Notifier`] forwards accepted alerts to external targets.

pub mod classifier;
pub mod model;
pub mod notifier;
pub mod retention;
pub mod store;

pub use model::{Alert, NewAlert, Severity, UnknownSeverity};
pub use notifier::{AlertTarget, Notifier, NotifierError};
pub use retention::{RetentionWorker, DEFAULT_MAX_ALERT_AGE};
pub use store::{AlertStore, AlertStoreConfig, AlertStoreStats};

pub mod models;
pub mod webhook;

pub use models::BillingEvent;
pub use webhook::{BillingStore, WebhookOutcome};

pub mod models;

pub use models::{AuditLog, AuditLogStore};

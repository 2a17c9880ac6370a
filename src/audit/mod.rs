//! Audit trail for the HRV sensor agent.
//!
//! Besides `tracing` output, these counters are the only record of what a
//! session did once the process has exited.

pub mod log;

pub use log::{
    create_shared_audit, create_shared_audit_with_persistence, AuditStats, PersistedStats,
    SessionAudit, SharedSessionAudit,
};

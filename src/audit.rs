//! Audit trail for membership changes
//!
//! Entries are queued on a bounded channel and written to `org_op_log` by a
//! background task, so handlers never wait on the insert.

use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;

use crate::entity::op_log::{self, OpType};

/// Log entry to be added
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub user_email: String,
    pub op_type: OpType,
    pub op_desc: String,
    pub result: String,
}

static LOG_TX: std::sync::OnceLock<mpsc::Sender<LogEntry>> = std::sync::OnceLock::new();

/// Start the writer task. Calling it more than once is a no-op.
pub fn init(db: sea_orm::DatabaseConnection) {
    if LOG_TX.get().is_some() {
        tracing::debug!("Audit log service already initialized, skipping");
        return;
    }

    let (tx, mut rx) = mpsc::channel::<LogEntry>(200);
    if LOG_TX.set(tx).is_err() {
        tracing::debug!("Audit log service initialized by another thread");
        return;
    }

    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            let log = op_log::ActiveModel {
                op_time: Set(chrono::Utc::now().timestamp()),
                user_email: Set(entry.user_email),
                op_type: Set(entry.op_type.as_str().to_string()),
                op_desc: Set(entry.op_desc),
                result: Set(entry.result),
                ..Default::default()
            };

            if let Err(e) = log.insert(&db).await {
                tracing::error!("Failed to log operation: {}", e);
            }
        }
    });
}

/// Queue an entry; dropped with a warning if the service is not running or
/// the channel is full
pub fn add_log(entry: LogEntry) {
    if let Some(tx) = LOG_TX.get() {
        if tx.try_send(entry).is_err() {
            tracing::warn!("Log channel is full, operation log dropped");
        }
    } else {
        tracing::warn!(
            "Audit log service not initialized, log dropped: {} - {}",
            entry.op_type.as_str(),
            entry.op_desc
        );
    }
}

pub fn log_operation(user_email: &str, op_type: OpType, op_desc: &str, result: &str) {
    add_log(LogEntry {
        user_email: user_email.to_string(),
        op_type,
        op_desc: op_desc.to_string(),
        result: result.to_string(),
    });
}

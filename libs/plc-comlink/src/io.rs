//! IO backends
//!
//! Two transport families, one contract:
//!
//! - [`PooledIo`] (S7) sends one batch per call over a connection borrowed
//!   from a per-device [`ConnectionPool`](crate::pool::ConnectionPool)
//! - [`DirectIo`] (S7-200 SMART) owns a single area client behind a mutex and
//!   executes items one at a time
//!
//! Neither backend lets an error escape `read_datas` / `write_datas`: a
//! failed read is an empty mapping, a failed write is `false`, and the cause
//! goes to the log. `try_read` and `write_outcome` expose the detail.

pub mod direct;
pub mod pooled;
pub mod request;

use errors::{PlcErrorTrait, PlcResult};
use plc_config::{Datagram, DeviceConfig};
use serde::Serialize;

use crate::value::ReadValues;

pub use direct::{AreaHandle, DirectIo};
pub use pooled::{PooledIo, TagConnection, TagPool};
pub use request::WriteValues;

/// Why one item of a write was not acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub code: String,
    pub reason: String,
}

/// Result of a batch write
///
/// `PartiallyApplied` means the request reached the transport but not every
/// item was acknowledged; `applied` lists the codes that were and may be
/// empty. No rollback is attempted for applied items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    #[default]
    NotAttempted,
    PartiallyApplied {
        applied: Vec<String>,
        failed: Vec<ItemFailure>,
    },
    Applied,
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }

    /// Whether anything may have reached the device
    pub fn was_attempted(&self) -> bool {
        !matches!(self, WriteOutcome::NotAttempted)
    }

    pub fn failures(&self) -> &[ItemFailure] {
        match self {
            WriteOutcome::PartiallyApplied { failed, .. } => failed,
            _ => &[],
        }
    }

    /// Build the outcome from per item results collected in order
    pub(crate) fn from_results(applied: Vec<String>, failed: Vec<ItemFailure>) -> Self {
        if failed.is_empty() {
            WriteOutcome::Applied
        } else {
            WriteOutcome::PartiallyApplied { applied, failed }
        }
    }
}

/// Batch read/write against one device
pub trait PlcIo: Send + Sync {
    fn device(&self) -> &DeviceConfig;

    /// Read every resolvable item; non-OK items are left out of the mapping
    fn try_read(&self, datagram: &Datagram, timeout_ms: u64) -> PlcResult<ReadValues>;

    /// Write every resolvable item, all values required up front
    fn write_outcome(
        &self,
        datagram: &Datagram,
        values: &WriteValues,
        timeout_ms: u64,
    ) -> WriteOutcome;

    fn read_datas(&self, datagram: &Datagram, timeout_ms: u64) -> ReadValues {
        match self.try_read(datagram, timeout_ms) {
            Ok(values) => values,
            Err(e) => {
                e.log(&format!(
                    "[READ] {}.{} failed:",
                    self.device().id,
                    datagram.id()
                ));
                ReadValues::new()
            },
        }
    }

    fn write_datas(&self, datagram: &Datagram, values: &WriteValues, timeout_ms: u64) -> bool {
        self.write_outcome(datagram, values, timeout_ms).is_applied()
    }

    /// Establish the connection (or pool) ahead of the first call
    fn connect(&self) -> PlcResult<()>;

    fn is_connected(&self) -> bool;

    /// Release every connection; the next call reconnects
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_outcome_states() {
        assert!(!WriteOutcome::NotAttempted.was_attempted());
        assert!(WriteOutcome::from_results(vec!["a".into()], vec![]).is_applied());

        let partial = WriteOutcome::from_results(
            vec![],
            vec![ItemFailure {
                code: "b".into(),
                reason: "ACCESS_DENIED".into(),
            }],
        );
        assert!(!partial.is_applied());
        assert!(partial.was_attempted());
        assert_eq!(partial.failures()[0].code, "b");
    }
}

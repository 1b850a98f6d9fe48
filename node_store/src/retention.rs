//! Retention sweep: deletes whole partitions whose date precedes a cutoff.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{client::DocumentStoreClient, naming::PartitionNaming, NodeStoreResult};

/// Outcome of one sweep, partition names in alias order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
    /// Eligible partitions that were gone by the time of deletion.
    pub already_gone: Vec<String>,
    /// Partitions whose name carries no parsable date; left in place.
    pub unparsable: Vec<String>,
}

pub struct RetentionSweep<'a> {
    client: &'a dyn DocumentStoreClient,
    alias: &'a str,
    naming: &'a PartitionNaming,
}

impl<'a> RetentionSweep<'a> {
    pub fn new(
        client: &'a dyn DocumentStoreClient,
        alias: &'a str,
        naming: &'a PartitionNaming,
    ) -> Self {
        Self {
            client,
            alias,
            naming,
        }
    }

    /// Delete every partition behind the alias dated strictly before
    /// `cutoff`. A partition's date is taken as midnight UTC of the day in
    /// its name.
    ///
    /// A name that does not parse is logged and skipped; the rest of the
    /// sweep proceeds. Safe to re-run after a partial sweep.
    pub async fn run(&self, cutoff: DateTime<Utc>) -> NodeStoreResult<SweepReport> {
        let mut report = SweepReport::default();

        let partitions = match self.client.get_alias(self.alias).await {
            Ok(partitions) => partitions,
            Err(e) if e.is_not_found() => {
                info!(alias = %self.alias, "alias has no partitions, nothing to clean up");
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        for partition in partitions {
            let date = match self.naming.parse_date(&partition) {
                Ok(date) => date,
                Err(e) => {
                    warn!(
                        index = %partition,
                        error = %e,
                        "skipping partition with unparsable name"
                    );
                    report.unparsable.push(partition);
                    continue;
                }
            };
            let partition_ts = date.and_time(NaiveTime::MIN).and_utc();
            if partition_ts >= cutoff {
                report.retained.push(partition);
                continue;
            }

            match self.client.delete_index(&partition).await {
                Ok(()) => {
                    info!(
                        index = %partition,
                        index_ts = partition_ts.timestamp(),
                        cutoff_ts = cutoff.timestamp(),
                        status = "deleted",
                        "index deleted"
                    );
                    report.deleted.push(partition);
                }
                Err(e) if e.is_not_found() => {
                    info!(index = %partition, error = "not found", "index already deleted");
                    report.already_gone.push(partition);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

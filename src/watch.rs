use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::risk::{self, RosterReport};
use crate::snapshot::Snapshot;
use crate::store::Store;

/// Remembers the last delivered snapshot and re-derives the roster only when
/// a delivery differs from it.
#[derive(Debug, Default)]
pub struct SnapshotFeed {
    last: Option<Snapshot>,
}

impl SnapshotFeed {
    pub fn accept(&mut self, snapshot: Snapshot) -> Option<RosterReport> {
        if self.last.as_ref() == Some(&snapshot) {
            return None;
        }
        let report = risk::roster_report(&snapshot);
        self.last = Some(snapshot);
        Some(report)
    }
}

/// Polls the store until Ctrl-C. A failed load keeps the previous results.
pub async fn watch(
    store: &Store,
    every: Duration,
    mut on_report: impl FnMut(&RosterReport),
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut feed = SnapshotFeed::default();
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                tracing::info!("stopping watch");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        match store.load_snapshot().await {
            Ok(snapshot) => {
                if let Some(report) = feed.accept(snapshot) {
                    tracing::info!(
                        good = report.good,
                        at_risk = report.at_risk,
                        threshold = report.threshold,
                        "recomputed attendance standing"
                    );
                    on_report(&report);
                }
            }
            Err(err) => tracing::warn!(error = %err, "snapshot load failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(status: &str) -> Snapshot {
        Snapshot::from_value(&json!({
            "students": { "S1": { "StudentName": "Avery Lee", "classes": { "MATH": {} } } },
            "classes": { "MATH": { "SubjectName": "Math" } },
            "attendance": { "2026-02-02": { "MATH": { "S1": status } } }
        }))
    }

    #[test]
    fn unchanged_snapshots_are_not_recomputed() {
        let mut feed = SnapshotFeed::default();

        let first = feed.accept(snapshot("Present")).unwrap();
        assert_eq!(first.good, 1);
        assert!(feed.accept(snapshot("Present")).is_none());

        let second = feed.accept(snapshot("Absent")).unwrap();
        assert_eq!(second.at_risk, 1);
    }
}

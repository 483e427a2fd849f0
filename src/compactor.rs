use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{Engine, EngineError};

pub const COMPACT_CHECK_PERIOD: Duration = Duration::from_secs(30);

/// Rewrite the WAL once more than `threshold` records were appended since
/// the last rewrite. Returns whether it compacted.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.appends_since_compact().await?;
    if appended <= threshold {
        return Ok(false);
    }
    debug!(appended, threshold, "compacting WAL");
    engine.compact_wal().await?;
    Ok(true)
}

/// Periodic per-tenant compaction. Runs until the task is dropped.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            warn!(error = %e, "WAL compaction failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::clock::SystemClock;
    use crate::config::EngineConfig;
    use crate::model::*;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("courtside_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(
            path.clone(),
            Arc::new(InMemoryCatalog::new()),
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
        .unwrap();
        let admin = Actor::admin(Ulid::new());
        for i in 0..3 {
            let venue = Venue {
                id: Ulid::new(),
                name: format!("Venue {i}"),
                operator_id: Ulid::new(),
                location: None,
                opens_at: "06:00".into(),
                closes_at: "23:00".into(),
                status: VenueStatus::Active,
            };
            engine.register_venue(venue, admin).await.unwrap();
        }

        assert!(!compact_if_needed(&engine, 3).await.unwrap());
        assert!(compact_if_needed(&engine, 2).await.unwrap());
        assert_eq!(engine.appends_since_compact().await.unwrap(), 0);
        assert_eq!(crate::wal::Wal::replay(&path).unwrap().events.len(), 3);
        let _ = std::fs::remove_file(&path);
    }
}

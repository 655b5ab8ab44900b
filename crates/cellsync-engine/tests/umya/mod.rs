// End-to-end engine tests against real xlsx files; run with `--features umya`.

mod live;
mod sheets;
mod update;

pub mod common {
    use std::sync::Arc;

    use cellsync_engine::{CellValue, EngineConfig, RecordingSleeper, Row, SyncEngine};

    pub fn rows(data: &[&[&str]]) -> Vec<Row> {
        data.iter()
            .map(|r| r.iter().map(|s| CellValue::from(*s)).collect())
            .collect()
    }

    /// File-only engine that never sleeps.
    pub fn offline_engine() -> SyncEngine {
        SyncEngine::builder(EngineConfig::immediate())
            .without_live()
            .sleeper(Arc::new(RecordingSleeper::new()))
            .build()
            .unwrap()
    }
}

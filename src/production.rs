//! Production tallies and operator sessions
//!
//! An operator panel counts parts locally and hands every single-part delta
//! to the backend recorder. The local tally is never persisted here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{ApiResult, FactoryApi};
use crate::telemetry::{MachineId, MachineStatus, ProductionRecord, TelemetryRecord};

/// Parts counted during one operator session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductionTally {
    pub good_parts: u64,
    pub defective_parts: u64,
}

impl ProductionTally {
    pub fn total(&self) -> u64 {
        self.good_parts + self.defective_parts
    }

    /// Good parts over total parts, for display
    ///
    /// Unlike [`crate::oee::quality`], an empty tally reads as `0.0` here:
    /// the operator panel shows 0% before the first part is counted.
    pub fn quality_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.good_parts as f64 / total as f64,
        }
    }
}

/// Counts parts and reports machine status for one machine
pub struct OperatorSession {
    api: Arc<dyn FactoryApi>,
    machine_id: MachineId,
    tally: ProductionTally,
}

impl OperatorSession {
    pub fn new(api: Arc<dyn FactoryApi>, machine_id: MachineId) -> Self {
        Self {
            api,
            machine_id,
            tally: ProductionTally::default(),
        }
    }

    pub fn machine_id(&self) -> MachineId {
        self.machine_id
    }

    pub fn tally(&self) -> ProductionTally {
        self.tally
    }

    /// Count one good part and forward it
    ///
    /// The local count keeps the part even if the backend rejects it.
    pub async fn record_good(&mut self) -> ApiResult<ProductionTally> {
        self.tally.good_parts += 1;
        self.forward(1, 0).await
    }

    /// Count one defective part and forward it
    pub async fn record_defective(&mut self) -> ApiResult<ProductionTally> {
        self.tally.defective_parts += 1;
        self.forward(0, 1).await
    }

    /// Report a status change as a sparse telemetry update
    pub async fn set_status(&self, status: MachineStatus) -> ApiResult<()> {
        let update = TelemetryRecord::new(self.machine_id).status(status);
        self.api.send_machine_data(self.machine_id, &update).await?;
        tracing::info!(machine_id = self.machine_id, status = %status, "Machine status reported");
        Ok(())
    }

    pub fn reset(&mut self) {
        self.tally = ProductionTally::default();
    }

    async fn forward(&self, good_parts: u64, defective_parts: u64) -> ApiResult<ProductionTally> {
        let record = ProductionRecord {
            machine_id: self.machine_id,
            good_parts,
            defective_parts,
        };

        if let Err(e) = self.api.record_production(record).await {
            tracing::warn!(machine_id = self.machine_id, error = %e, "Failed to record production");
            return Err(e);
        }
        Ok(self.tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::telemetry::{Machine, OeeReport};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records what the session sends; can be switched to reject
    #[derive(Default)]
    struct RecordingApi {
        production: Mutex<Vec<ProductionRecord>>,
        telemetry: Mutex<Vec<TelemetryRecord>>,
        reject: AtomicBool,
    }

    impl RecordingApi {
        fn check(&self) -> ApiResult<()> {
            if self.reject.load(Ordering::SeqCst) {
                Err(ApiError::Unauthorized)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl FactoryApi for RecordingApi {
        async fn get_oee(&self, _: MachineId, _: DateTime<Utc>, _: DateTime<Utc>) -> ApiResult<OeeReport> {
            Err(ApiError::Unavailable)
        }

        async fn list_machines(&self) -> ApiResult<Vec<Machine>> {
            Ok(Vec::new())
        }

        async fn get_machine(&self, machine_id: MachineId) -> ApiResult<Machine> {
            Err(ApiError::NotFound(machine_id.to_string()))
        }

        async fn record_production(&self, record: ProductionRecord) -> ApiResult<()> {
            self.check()?;
            self.production.lock().unwrap().push(record);
            Ok(())
        }

        async fn send_machine_data(&self, _: MachineId, data: &TelemetryRecord) -> ApiResult<()> {
            self.check()?;
            self.telemetry.lock().unwrap().push(data.clone());
            Ok(())
        }
    }

    #[test]
    fn test_quality_rate_display_policy() {
        assert_eq!(ProductionTally::default().quality_rate(), 0.0);

        let tally = ProductionTally {
            good_parts: 9,
            defective_parts: 1,
        };
        assert_eq!(tally.total(), 10);
        assert!((tally.quality_rate() - 0.9).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_session_forwards_single_part_deltas() {
        let api = Arc::new(RecordingApi::default());
        let mut session = OperatorSession::new(api.clone(), 7);

        session.record_good().await.unwrap();
        session.record_good().await.unwrap();
        let tally = session.record_defective().await.unwrap();

        assert_eq!(tally, ProductionTally { good_parts: 2, defective_parts: 1 });

        let sent = api.production.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], ProductionRecord { machine_id: 7, good_parts: 1, defective_parts: 0 });
        assert_eq!(sent[2], ProductionRecord { machine_id: 7, good_parts: 0, defective_parts: 1 });
    }

    #[tokio::test]
    async fn test_rejection_is_returned_and_tally_kept() {
        let api = Arc::new(RecordingApi::default());
        api.reject.store(true, Ordering::SeqCst);
        let mut session = OperatorSession::new(api.clone(), 1);

        let result = session.record_good().await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert_eq!(session.tally().good_parts, 1);
        assert!(api.production.lock().unwrap().is_empty());

        session.reset();
        assert_eq!(session.tally(), ProductionTally::default());
    }

    #[tokio::test]
    async fn test_status_is_sent_alone() {
        let api = Arc::new(RecordingApi::default());
        let session = OperatorSession::new(api.clone(), 4);

        session.set_status(MachineStatus::Maintenance).await.unwrap();

        let sent = api.telemetry.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].machine_id, 4);
        assert_eq!(sent[0].status, Some(MachineStatus::Maintenance));
        assert!(sent[0].temperature.is_none());
        assert!(sent[0].cycle_count.is_none());
    }
}

//! Factory backend API
//!
//! The query functions this engine consumes but does not implement: OEE over
//! a time range, the machine list and descriptors, production recording and manual
//! telemetry submission. All calls are asynchronous and fallible; failures
//! are returned to the caller, never swallowed.

mod client;
mod error;

pub use client::{FactoryApiConfig, HttpFactoryApi};
pub use error::{ApiError, ApiResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::telemetry::{Machine, MachineId, OeeReport, ProductionRecord, TelemetryRecord};

/// Backend operations used by the engine
#[async_trait]
pub trait FactoryApi: Send + Sync {
    /// OEE for one machine over `[start, end)`
    async fn get_oee(
        &self,
        machine_id: MachineId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<OeeReport>;

    /// Every machine the backend knows about
    async fn list_machines(&self) -> ApiResult<Vec<Machine>>;

    /// Machine descriptor
    async fn get_machine(&self, machine_id: MachineId) -> ApiResult<Machine>;

    /// Hand a production delta to the recorder
    async fn record_production(&self, record: ProductionRecord) -> ApiResult<()>;

    /// Submit a (possibly sparse) telemetry update
    async fn send_machine_data(&self, machine_id: MachineId, data: &TelemetryRecord) -> ApiResult<()>;
}

// Upstream position source contract. The pipeline depends only on this async
// fetch/insert interface, never on a particular protocol or store.

use async_trait::async_trait;

use crate::types::TrainPosition;
use crate::utils::TelemetryResult;

/// Queryable store of position records, addressable by train or section.
/// Queries return the most recent records first (timestamp descending).
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Most recent positions reported within a track section.
    async fn recent_section_positions(
        &self,
        section_id: &str,
        limit: usize,
    ) -> TelemetryResult<Vec<TrainPosition>>;

    /// Most recent positions reported by a single train.
    async fn recent_train_positions(
        &self,
        train_id: &str,
        limit: usize,
    ) -> TelemetryResult<Vec<TrainPosition>>;

    /// Insert a single position update.
    async fn insert_position(&self, position: &TrainPosition) -> TelemetryResult<()>;
}

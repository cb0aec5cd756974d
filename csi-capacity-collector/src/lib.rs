use std::collections::BTreeMap;

use async_trait::async_trait;
use csi_capacity::DEFAULT_VOLUME_GROUP;
use csi_capacity::VOLUME_GROUP_PARAMETER;
use csi_capacity_kubeapi::CapacityAnnotator;
use csi_capacity_kubeapi::Nodes;
use csi_capacity_kubeapi::Outcome;
use csi_capacity_kubeapi::UpdateError;
use thiserror::Error;

/// Capability over the CSI connection: the single capacity verb consumed.
///
/// Cancellation rides on the future itself; dropping an in-flight call
/// aborts the outbound request.
#[async_trait]
pub trait CapacityQuery {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue one `GetCapacity` call with the given request parameters and
    /// return the aggregate available bytes the driver reports.
    async fn get_capacity(
        &self,
        parameters: BTreeMap<String, String>,
    ) -> Result<i64, Self::Error>;
}

/// Query the available capacity of one volume group.
///
/// The request names a single volume group, but the driver answers with one
/// aggregate figure either way; a per-group breakdown needs an upstream API
/// change. Backend errors are returned verbatim, with no retry at this
/// layer.
pub async fn query_volume_group_capacity<C: CapacityQuery>(
    conn: &C,
    volume_group: &str,
) -> Result<i64, C::Error> {
    let parameters = BTreeMap::from([(
        VOLUME_GROUP_PARAMETER.to_string(),
        volume_group.to_string(),
    )]);
    match conn.get_capacity(parameters).await {
        Ok(available) => {
            tracing::debug!(volume_group, available, "csi driver reported capacity");
            Ok(available)
        }
        Err(err) => {
            tracing::error!(volume_group, %err, "csi capacity query failed");
            Err(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Backend(E),
    #[error(transparent)]
    Update(#[from] UpdateError),
}

/// Keeps one node's capacity annotation in line with what the CSI driver
/// reports for one volume group.
#[derive(Debug)]
pub struct CapacityCollector<C, N> {
    conn: C,
    annotator: CapacityAnnotator<N>,
    node_name: String,
    volume_group: String,
}

impl<C, N> CapacityCollector<C, N>
where
    C: CapacityQuery,
    N: Nodes,
{
    pub fn new(conn: C, nodes: N, node_name: impl ToString) -> Self {
        Self::with_annotator(conn, CapacityAnnotator::new(nodes), node_name)
    }

    pub fn with_annotator(
        conn: C,
        annotator: CapacityAnnotator<N>,
        node_name: impl ToString,
    ) -> Self {
        Self {
            conn,
            annotator,
            node_name: node_name.to_string(),
            volume_group: DEFAULT_VOLUME_GROUP.to_string(),
        }
    }

    pub fn volume_group(self, volume_group: impl ToString) -> Self {
        Self {
            volume_group: volume_group.to_string(),
            ..self
        }
    }

    /// Query the volume group's available capacity and record it on the
    /// node, as a decimal byte count.
    pub async fn sync(&self) -> Result<Outcome, SyncError<C::Error>> {
        let available = query_volume_group_capacity(&self.conn, &self.volume_group)
            .await
            .map_err(SyncError::Backend)?;
        let outcome = self
            .annotator
            .apply(&self.node_name, &self.volume_group, &available.to_string())
            .await?;
        Ok(outcome)
    }
}

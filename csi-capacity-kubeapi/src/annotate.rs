use csi_capacity::CAPACITY_ANNOTATION;
use csi_capacity::VolumeGroupCapacities;
use csi_capacity_ext as k8s;
use thiserror::Error;

use k8s::NodeExt as _;
use k8s::clone_and_set_annotation;

use crate::Nodes;
use crate::RetryPolicy;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Api(#[from] kube::Error),
    #[error(transparent)]
    Capacity(#[from] csi_capacity::CapacityError),
    #[error("failed to update capacity annotation on node {node:?}: {source}")]
    RetriesExhausted {
        node: String,
        #[source]
        source: Box<UpdateError>,
    },
}

/// What one [`CapacityAnnotator::apply`] call did to the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The stored entry already matched; no write was issued.
    Unchanged,
    /// The node was written with the merged capacity map.
    Updated,
}

/// Keeps a node's capacity annotation in line with what the CSI driver
/// reports, one read-merge-write at a time.
#[derive(Debug)]
pub struct CapacityAnnotator<N> {
    nodes: N,
    policy: RetryPolicy,
}

impl<N: Nodes> CapacityAnnotator<N> {
    pub fn new(nodes: N) -> Self {
        Self::with_policy(nodes, RetryPolicy::default())
    }

    pub fn with_policy(nodes: N, policy: RetryPolicy) -> Self {
        Self { nodes, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record `capacity` for `volume_group` in the node's capacity
    /// annotation, preserving entries for other volume groups and all
    /// unrelated annotations.
    ///
    /// Every error coming out of one read-merge-write attempt consumes one
    /// attempt from the retry budget: a stale-version conflict means another
    /// writer landed first and the fresh re-read picks up their entries,
    /// and transient fetch failures ride the same bounded backoff.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use csi_capacity_kubeapi::{CapacityAnnotator, KubeApi};
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let annotator = CapacityAnnotator::new(KubeApi::new().await?);
    /// annotator.apply("node-1", "vg10000", "107374182400").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn apply(
        &self,
        node: &str,
        volume_group: &str,
        capacity: &str,
    ) -> Result<Outcome, UpdateError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.try_apply(node, volume_group, capacity).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };
            if attempt >= self.policy.max_attempts {
                return Err(UpdateError::RetriesExhausted {
                    node: node.to_string(),
                    source: Box::new(err),
                });
            }
            let delay = self.policy.delay(attempt);
            if is_conflict(&err) {
                tracing::debug!(node, attempt, ?delay, "conflicting node write, retrying");
            } else {
                tracing::debug!(node, attempt, ?delay, %err, "node capacity update failed, retrying");
            }
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_apply(
        &self,
        name: &str,
        volume_group: &str,
        capacity: &str,
    ) -> Result<Outcome, UpdateError> {
        // Fresh read every attempt, so changes made by other writers in the
        // meantime are merged rather than overwritten.
        let node = self.nodes.get(name).await.inspect_err(
            |err| tracing::error!(name, %err, "failed to fetch latest version of node"),
        )?;

        let previous = node.capacity_annotation();
        tracing::trace!(name, ?previous, "previous capacity annotation value");

        // A malformed stored value fails the same way on every attempt; the
        // retry budget bounds how long that is worth repeating.
        let mut capacities = VolumeGroupCapacities::parse(previous)?;

        if capacities.get(volume_group) == Some(capacity) {
            tracing::debug!(
                name,
                volume_group,
                capacity,
                "capacity annotation already up to date"
            );
            return Ok(Outcome::Unchanged);
        }

        capacities.set(volume_group, capacity);
        let value = capacities.to_json()?;

        let mut node = node;
        node.metadata.annotations = Some(clone_and_set_annotation(
            node.metadata.annotations.as_ref(),
            CAPACITY_ANNOTATION,
            value,
        ));

        match self.nodes.update(&node).await {
            Ok(_) => {
                tracing::info!(
                    name,
                    volume_group,
                    capacity,
                    "updated node capacity annotation"
                );
                Ok(Outcome::Updated)
            }
            Err(err) => {
                tracing::debug!(name, volume_group, %err, "node capacity update rejected");
                Err(err.into())
            }
        }
    }
}

fn is_conflict(err: &UpdateError) -> bool {
    matches!(
        err,
        UpdateError::Api(kube::Error::Api(response)) if response.code == 409
    )
}

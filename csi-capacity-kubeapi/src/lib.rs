use std::fmt::Debug;

use async_trait::async_trait;
use csi_capacity_ext as k8s;
use kube::ResourceExt as _;
use kube::api;

use k8s::corev1;

pub use annotate::CapacityAnnotator;
pub use annotate::Outcome;
pub use annotate::UpdateError;
pub use retry::RetryPolicy;

mod annotate;
mod retry;

/// Capability over node resources: exactly the two verbs the annotator
/// consumes, so tests substitute an in-memory fake for a cluster.
///
/// `update` is a conditional write: it carries the resource version from the
/// last `get` and fails with a 409 response if the stored version has moved.
#[async_trait]
pub trait Nodes {
    async fn get(&self, name: &str) -> kube::Result<corev1::Node>;
    async fn update(&self, node: &corev1::Node) -> kube::Result<corev1::Node>;
}

#[async_trait]
impl<N: Nodes + Send + Sync> Nodes for std::sync::Arc<N> {
    async fn get(&self, name: &str) -> kube::Result<corev1::Node> {
        (**self).get(name).await
    }

    async fn update(&self, node: &corev1::Node) -> kube::Result<corev1::Node> {
        (**self).update(node).await
    }
}

pub struct KubeApi {
    post_params: api::PostParams,
    client: kube::Client,
}

impl KubeApi {
    /// Create a KubeApi configured with a default Kubernetes client.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn run() -> Result<(), kube::Error> {
    /// let nodes = csi_capacity_kubeapi::KubeApi::new().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new() -> kube::Result<Self> {
        kube::Client::try_default().await.map(Self::with_client)
    }

    pub fn with_client(client: kube::Client) -> Self {
        Self {
            post_params: api::PostParams::default(),
            client,
        }
    }

    fn nodes(&self) -> api::Api<corev1::Node> {
        api::Api::all(self.client.clone())
    }
}

#[async_trait]
impl Nodes for KubeApi {
    async fn get(&self, name: &str) -> kube::Result<corev1::Node> {
        self.nodes().get(name).await
    }

    async fn update(&self, node: &corev1::Node) -> kube::Result<corev1::Node> {
        let name = node.name_any();
        self.nodes().replace(&name, &self.post_params, node).await
    }
}

impl Debug for KubeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApi")
            .field("post_params", &self.post_params)
            .field("client", &"<kube::Client>")
            .finish()
    }
}

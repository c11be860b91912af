//! Kubernetes API backed [`ClusterSource`].

use std::path::PathBuf;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::ClusterSource;
use super::velero;
use crate::{Error, Result};

const VELERO_GROUP: &str = "velero.io";
const VELERO_VERSION: &str = "v1";

/// How to reach the cluster.
#[derive(Debug, Clone)]
pub struct KubeSourceConfig {
    /// Use the pod service account.
    pub in_cluster: bool,
    /// Explicit kubeconfig file; the default lookup is used when unset.
    pub kube_config_file: Option<PathBuf>,
    /// Namespace holding the Velero custom resources.
    pub velero_namespace: String,
}

impl Default for KubeSourceConfig {
    fn default() -> Self {
        Self {
            in_cluster: false,
            kube_config_file: None,
            velero_namespace: "velero".to_string(),
        }
    }
}

/// Lists namespaces and Velero resources through the Kubernetes API.
pub struct KubeClusterSource {
    client: Client,
    velero_namespace: String,
    context_name: Option<String>,
}

impl KubeClusterSource {
    /// Connect using `config`.
    pub async fn connect(config: &KubeSourceConfig) -> Result<Self> {
        crate::utils::http_client::install_rustls_provider();

        let (kube_config, context_name) = if config.in_cluster {
            let kube_config = Config::incluster()
                .map_err(|e| Error::config(format!("in-cluster configuration: {}", e)))?;
            (kube_config, None)
        } else {
            let kubeconfig = match &config.kube_config_file {
                Some(path) => Kubeconfig::read_from(path).map_err(|e| {
                    Error::config(format!("reading kubeconfig {}: {}", path.display(), e))
                })?,
                None => Kubeconfig::read()
                    .map_err(|e| Error::config(format!("reading kubeconfig: {}", e)))?,
            };
            let context_name = kubeconfig.current_context.clone();
            let kube_config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::config(format!("loading kubeconfig: {}", e)))?;
            (kube_config, context_name)
        };

        info!(
            cluster_url = %kube_config.cluster_url,
            in_cluster = config.in_cluster,
            "Connecting to Kubernetes API"
        );

        let client = Client::try_from(kube_config)?;

        Ok(Self {
            client,
            velero_namespace: config.velero_namespace.clone(),
            context_name,
        })
    }

    fn velero_api(&self, kind: &str, plural: &str) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(VELERO_GROUP, VELERO_VERSION, kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, plural);
        Api::namespaced_with(self.client.clone(), &self.velero_namespace, &resource)
    }

    async fn list_velero<T: DeserializeOwned>(&self, kind: &str, plural: &str) -> Result<Vec<T>> {
        let list = self
            .velero_api(kind, plural)
            .list(&ListParams::default())
            .await?;

        debug!(kind, count = list.items.len(), "Listed Velero resources");

        list.items
            .into_iter()
            .map(|object| -> Result<T> {
                Ok(serde_json::from_value(serde_json::to_value(object)?)?)
            })
            .collect()
    }
}

#[async_trait]
impl ClusterSource for KubeClusterSource {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|namespace| namespace.metadata.name)
            .collect())
    }

    async fn list_schedules(&self) -> Result<Vec<velero::Schedule>> {
        self.list_velero("Schedule", "schedules").await
    }

    async fn list_backups(&self) -> Result<Vec<velero::Backup>> {
        self.list_velero("Backup", "backups").await
    }

    fn cluster_name(&self) -> Option<String> {
        self.context_name.clone()
    }
}

//! Deployment orchestrator
//!
//! Entry points behind the CLI commands. Work is strictly sequential: one
//! external command at a time, hosts and clusters in manifest order.

use crate::config::Manifest;
use crate::error::{ConvoyError, Result};
use crate::exec::CommandRunner;
use crate::host::{Host, HostManager, HostState};
use std::sync::Arc;

/// Deployment orchestrator
pub struct Orchestrator {
    manifest: Manifest,
    runner: Arc<dyn CommandRunner>,
}

impl Orchestrator {
    pub fn new(manifest: Manifest, runner: Arc<dyn CommandRunner>) -> Self {
        Self { manifest, runner }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn hosts(&self) -> Result<HostManager<'_>> {
        HostManager::new(&self.manifest.deployment, self.runner.as_ref())
    }

    /// Standalone host `name` for mutation, with a manager over the deployment
    fn standalone(&mut self, name: &str) -> Result<(HostManager<'_>, &mut Host)> {
        let host = self
            .manifest
            .hosts
            .iter_mut()
            .find(|h| h.name == name)
            .ok_or_else(|| ConvoyError::InvalidConfig(format!("unknown host '{}'", name)))?;
        let manager = HostManager::new(&self.manifest.deployment, self.runner.as_ref())?;
        Ok((manager, host))
    }

    /// Create and deploy every standalone host, then deploy every cluster
    pub async fn up(&mut self) -> Result<()> {
        tracing::info!(
            "Bringing up {} hosts and {} clusters",
            self.manifest.hosts.len(),
            self.manifest.clusters.len()
        );

        {
            let manager = HostManager::new(&self.manifest.deployment, self.runner.as_ref())?;
            for host in self.manifest.hosts.iter_mut() {
                manager.create(host).await?;
                host.state = HostState::Created;
                manager.deploy(host).await?;
                host.state = HostState::Deployed;
            }
        }

        let names: Vec<String> = self.manifest.clusters.iter().map(|c| c.name.clone()).collect();
        for name in names {
            self.deploy_cluster(&name).await?;
        }

        Ok(())
    }

    /// Destroy every standalone host and every cluster node
    pub async fn down(&mut self) -> Result<()> {
        let manager = HostManager::new(&self.manifest.deployment, self.runner.as_ref())?;
        let nodes = self
            .manifest
            .clusters
            .iter_mut()
            .flat_map(|c| c.nodes.iter_mut());
        for host in self.manifest.hosts.iter_mut().chain(nodes) {
            manager.destroy(host).await?;
            host.state = HostState::Declared;
            host.id = None;
        }
        Ok(())
    }

    pub async fn create_host(&mut self, name: &str) -> Result<()> {
        let (manager, host) = self.standalone(name)?;
        manager.create(host).await?;
        host.state = HostState::Created;
        Ok(())
    }

    pub async fn destroy_host(&mut self, name: &str) -> Result<()> {
        let (manager, host) = self.standalone(name)?;
        manager.destroy(host).await?;
        host.state = HostState::Declared;
        Ok(())
    }

    pub async fn deploy_host(&mut self, name: &str) -> Result<()> {
        let (manager, host) = self.standalone(name)?;
        manager.deploy(host).await?;
        host.state = HostState::Deployed;
        Ok(())
    }

    pub async fn host_exists(&self, name: &str) -> Result<bool> {
        self.hosts()?.exists(self.manifest.host(name)?).await
    }

    /// Normalize and deploy one cluster
    pub async fn deploy_cluster(&mut self, name: &str) -> Result<()> {
        let deployment = self.manifest.deployment.clone();
        let cluster = self.manifest.cluster_mut(name)?;

        cluster.normalize();
        cluster.deploy(&deployment, self.runner.as_ref()).await
    }

    /// Standalone host by name, with its current state
    pub fn host(&self, name: &str) -> Result<&Host> {
        self.manifest.host(name)
    }
}

//! Cluster coordination
//!
//! Deploying a cluster is a one-shot sequence: create the cluster resource
//! with the cluster CLI, map every declared node to the identifier the CLI
//! assigned it, then join the nodes one at a time, control plane first.

use crate::config::DeploymentContext;
use crate::error::{ConvoyError, Result};
use crate::exec::{command_line, CommandRunner};
use crate::host::{Host, HostManager, HostState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A cluster and its nodes, as declared in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    /// Cluster driver, passed to the cluster CLI as `--<kind>`
    pub kind: String,
    /// Driver-specific parameters
    #[serde(default, rename = "parameters", skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub nodes: Vec<Host>,
}

impl Cluster {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            params: BTreeMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Node names must be unique within a cluster
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(ConvoyError::InvalidConfig(format!(
                    "duplicate node '{}' in cluster '{}'",
                    node.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Claim ownership of every node and move manager and leader nodes in
    /// front of the workers. The sort is stable, so the declared order holds
    /// within each group. Running it twice changes nothing.
    pub fn normalize(&mut self) {
        for node in &mut self.nodes {
            node.cluster = Some(self.name.clone());
        }

        self.nodes.sort_by_key(|node| !node.role.is_control_plane());
    }

    /// Arguments of `<cluster-cli> cluster create`
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "cluster".to_string(),
            "create".to_string(),
            self.name.clone(),
            format!("--{}", self.kind),
        ];
        for (key, value) in &self.params {
            args.push("-p".to_string());
            args.push(format!("{}={}", key, value));
        }
        args
    }

    /// Create the cluster and join every node in order.
    ///
    /// The cluster must be normalized first. Any error is fatal to the run;
    /// nodes joined before the failure are left as they are.
    pub async fn deploy(
        &mut self,
        ctx: &DeploymentContext,
        runner: &dyn CommandRunner,
    ) -> Result<()> {
        tracing::info!(
            "Deploying cluster {} ({}) with {} nodes",
            self.name,
            self.kind,
            self.nodes.len()
        );

        let cli = &ctx.tools.cluster;
        let args = self.create_args();
        let output = runner.run(cli, &args).await?;
        if !output.success {
            let message = if output.stderr.is_empty() {
                format!("{} exited with an error", command_line(cli, &args))
            } else {
                output.stderr
            };
            return Err(ConvoyError::ClusterCreate {
                cluster: self.name.clone(),
                message,
            });
        }
        for node in &mut self.nodes {
            node.state = HostState::Created;
        }

        let listing = runner
            .run(cli, &["host".to_string(), "ls".to_string()])
            .await?;
        let ids = parse_host_listing(&listing.stdout);

        let manager = HostManager::new(ctx, runner)?;
        for node in &mut self.nodes {
            let id = ids
                .get(&node.name)
                .ok_or_else(|| ConvoyError::HostNotFound(node.name.clone()))?;
            node.id = Some(id.clone());

            manager.join(node).await?;
            node.state = HostState::Joined;
        }

        tracing::info!("Cluster {} deployed", self.name);
        Ok(())
    }
}

/// Parse the cluster CLI's host listing into a name → id map.
///
/// The first line is a header. Every other row is split on single spaces;
/// the first field is the id and the second the name. Runs of spaces
/// therefore yield empty fields, and rows with fewer than two fields are
/// skipped.
pub fn parse_host_listing(output: &str) -> HashMap<String, String> {
    output
        .split('\n')
        .skip(1)
        .filter_map(|row| {
            let mut cols = row.split(' ');
            match (cols.next(), cols.next()) {
                (Some(id), Some(name)) => Some((name.to_string(), id.to_string())),
                _ => None,
            }
        })
        .collect()
}

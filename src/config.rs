//! Deployment manifest
//!
//! A manifest is a YAML document with three sections:
//!
//! ```yaml
//! deployment:
//!   registry: 10.10.1.195:5000
//!   insecure_registry: [10.10.1.195:5000]
//!   agent:
//!     image: 10.10.1.195:5000/agent:1.4
//!     options: [--with-monitoring]
//!   web:
//!     image: 10.10.1.195:5000/agent-web:1.4
//! hosts:
//!   - name: ctl195
//!     external_ip: 10.10.1.195
//!     internal_ip: 192.168.1.195
//!     os: centos7
//!     docker: "19.03"
//! clusters:
//!   - name: c1
//!     kind: swarm
//!     parameters: { network: overlay }
//!     nodes:
//!       - { name: n1, external_ip: 10.10.1.201, internal_ip: 192.168.1.201, role: manager }
//! ```

use crate::cluster::Cluster;
use crate::error::{ConvoyError, Result};
use crate::host::Host;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default manifest file name
pub const DEFAULT_MANIFEST: &str = "convoy.yaml";

/// External tools driven by convoy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Host provisioning CLI
    pub machine: String,
    /// Driver passed to `machine create -d`; also the prefix of its flags
    pub driver: String,
    /// Cluster provisioning CLI
    pub cluster: String,
    /// Local deploy agent, asked for the remote join script
    pub agent: String,
    /// Shell used to run rendered scripts
    pub shell: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            machine: "docker-machine".to_string(),
            driver: "my".to_string(),
            cluster: "elite".to_string(),
            agent: "my".to_string(),
            shell: "/bin/bash".to_string(),
        }
    }
}

/// Deploy agent image and flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Image carrying the agent binary
    pub image: String,
    /// Path of the agent binary inside the image
    #[serde(default = "default_agent_binary")]
    pub binary: String,
    /// Extra flags passed to `deploy`
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_agent_binary() -> String {
    "/opt/chiwen/bin/my".to_string()
}

impl AgentConfig {
    /// File name the binary gets in the remote home directory
    pub fn binary_name(&self) -> &str {
        self.binary.rsplit('/').next().unwrap_or(&self.binary)
    }
}

/// Optional web component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebConfig {
    pub image: String,
    #[serde(default = "default_web_volume")]
    pub volume: String,
}

fn default_web_volume() -> String {
    "chiwen.web".to_string()
}

/// Settings shared by every host of a deployment. Read-only once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContext {
    /// Registry endpoint handed to the deploy agent
    pub registry: String,
    /// Insecure registries configured on every host
    #[serde(default, rename = "insecure_registry")]
    pub insecure_registries: Vec<String>,
    pub agent: AgentConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebConfig>,
    #[serde(default)]
    pub tools: ToolConfig,
    /// Seconds after which an external command is killed; unset waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<u64>,
}

impl DeploymentContext {
    /// Web component, if one with a non-empty image is configured
    pub fn web_component(&self) -> Option<&WebConfig> {
        self.web.as_ref().filter(|w| !w.image.is_empty())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout.map(Duration::from_secs)
    }
}

/// Declarative input for one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub deployment: DeploymentContext,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse and validate a manifest from a string
    pub fn parse_str(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)
            .map_err(|e| ConvoyError::Yaml(format!("Failed to parse manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the invariants the orchestrator relies on
    pub fn validate(&self) -> Result<()> {
        if self.deployment.agent.image.is_empty() {
            return Err(ConvoyError::InvalidConfig(
                "deployment.agent.image must not be empty".to_string(),
            ));
        }

        let mut hosts = HashSet::new();
        for host in &self.hosts {
            if !hosts.insert(host.name.as_str()) {
                return Err(ConvoyError::InvalidConfig(format!(
                    "duplicate host '{}'",
                    host.name
                )));
            }
        }

        let mut clusters = HashSet::new();
        for cluster in &self.clusters {
            if !clusters.insert(cluster.name.as_str()) {
                return Err(ConvoyError::InvalidConfig(format!(
                    "duplicate cluster '{}'",
                    cluster.name
                )));
            }
            cluster.validate()?;
        }

        Ok(())
    }

    pub fn host(&self, name: &str) -> Result<&Host> {
        self.hosts
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| ConvoyError::InvalidConfig(format!("unknown host '{}'", name)))
    }

    pub fn cluster_mut(&mut self, name: &str) -> Result<&mut Cluster> {
        self.clusters
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ConvoyError::InvalidConfig(format!("unknown cluster '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Role;

    const MANIFEST: &str = r#"
deployment:
  registry: 10.10.1.195:5000
  insecure_registry:
    - 10.10.1.195:5000
  agent:
    image: 10.10.1.195:5000/agent:1.4
    options:
      - --with-monitoring
hosts:
  - name: ctl195
    external_ip: 10.10.1.195
    internal_ip: 192.168.1.195
    os: centos7
    docker: "19.03"
    cpu: "4"
clusters:
  - name: c1
    kind: swarm
    parameters:
      network: overlay
    nodes:
      - name: n1
        external_ip: 10.10.1.201
        internal_ip: 192.168.1.201
        role: worker
      - name: n2
        external_ip: 10.10.1.202
        internal_ip: 192.168.1.202
        role: master
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse_str(MANIFEST).unwrap();

        assert_eq!(manifest.deployment.registry, "10.10.1.195:5000");
        assert_eq!(manifest.deployment.tools, ToolConfig::default());
        assert_eq!(manifest.deployment.agent.binary_name(), "my");
        assert!(manifest.deployment.web_component().is_none());
        assert!(manifest.deployment.command_timeout().is_none());

        let host = manifest.host("ctl195").unwrap();
        assert_eq!(host.cpu.as_deref(), Some("4"));
        assert!(host.memory.is_none());

        let cluster = &manifest.clusters[0];
        assert_eq!(cluster.params.get("network").map(String::as_str), Some("overlay"));
        assert_eq!(cluster.nodes[0].role, Role::Worker);
        assert_eq!(cluster.nodes[1].role, Role::Manager);
    }

    #[test]
    fn test_web_and_tools_overrides() {
        let yaml = r#"
deployment:
  registry: reg:5000
  agent:
    image: reg:5000/agent:2
    binary: /usr/local/bin/agentctl
  web:
    image: reg:5000/web:2
  tools:
    machine: /usr/local/bin/docker-machine
  command_timeout: 90
"#;
        let manifest = Manifest::parse_str(yaml).unwrap();
        let deployment = &manifest.deployment;

        let web = deployment.web_component().unwrap();
        assert_eq!(web.image, "reg:5000/web:2");
        assert_eq!(web.volume, "chiwen.web");
        assert_eq!(deployment.tools.machine, "/usr/local/bin/docker-machine");
        assert_eq!(deployment.tools.driver, "my");
        assert_eq!(deployment.agent.binary_name(), "agentctl");
        assert_eq!(deployment.command_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_duplicate_host_rejected() {
        let yaml = r#"
deployment:
  registry: reg
  agent: { image: agent }
hosts:
  - { name: a, external_ip: 1.1.1.1, internal_ip: 2.2.2.2 }
  - { name: a, external_ip: 1.1.1.2, internal_ip: 2.2.2.3 }
"#;
        let err = Manifest::parse_str(yaml).unwrap_err();
        assert!(matches!(err, ConvoyError::InvalidConfig(_)));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let yaml = r#"
deployment:
  registry: reg
  agent: { image: agent }
clusters:
  - name: c1
    kind: swarm
    nodes:
      - { name: n1, external_ip: 1.1.1.1, internal_ip: 2.2.2.2 }
      - { name: n1, external_ip: 1.1.1.2, internal_ip: 2.2.2.3 }
"#;
        let err = Manifest::parse_str(yaml).unwrap_err();
        assert!(err.to_string().contains("n1"));
    }

    #[test]
    fn test_empty_agent_image_rejected() {
        let yaml = r#"
deployment:
  registry: reg
  agent: { image: "" }
"#;
        assert!(Manifest::parse_str(yaml).is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = Manifest::parse_str("deployment: [").unwrap_err();
        assert!(matches!(err, ConvoyError::Yaml(_)));
    }

    #[test]
    fn test_unknown_lookups() {
        let mut manifest = Manifest::parse_str(MANIFEST).unwrap();
        assert!(manifest.host("nope").is_err());
        assert!(manifest.cluster_mut("nope").is_err());
        assert!(manifest.cluster_mut("c1").is_ok());
    }
}

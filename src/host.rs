//! Host lifecycle management
//!
//! A [`Host`] is one machine, either standalone or a node of a cluster.
//! [`HostManager`] maps each lifecycle operation onto one invocation of the
//! provisioning CLI or one ssh heredoc.

use crate::config::DeploymentContext;
use crate::error::{ConvoyError, Result};
use crate::exec::CommandRunner;
use crate::script::{DeployScript, ScriptRenderer};
use serde::{Deserialize, Serialize};

/// Marker in the provisioning CLI's error output for an idempotent create
const ALREADY_EXISTS: &str = "already exists";

/// Node role, which fixes the join order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "master")]
    Manager,
    Leader,
    #[default]
    Worker,
}

impl Role {
    /// Manager and leader nodes join before workers
    pub fn is_control_plane(&self) -> bool {
        matches!(self, Role::Manager | Role::Leader)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Manager => "manager",
            Role::Leader => "leader",
            Role::Worker => "worker",
        };
        f.pad(name)
    }
}

/// Progress of a host through an orchestration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostState {
    /// Only known from the manifest
    #[default]
    Declared,
    /// Provisioned by the provisioning CLI
    Created,
    /// Joined to its cluster
    Joined,
    /// Deploy agent installed
    Deployed,
}

/// A machine taking part in a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub external_ip: String,
    pub internal_ip: String,
    #[serde(default)]
    pub os: String,
    /// Container runtime version
    #[serde(default)]
    pub docker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, rename = "mem", skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(default, rename = "insecure_registry")]
    pub insecure_registries: Vec<String>,
    #[serde(default)]
    pub role: Role,

    /// Name of the owning cluster, set by normalization
    #[serde(skip)]
    pub cluster: Option<String>,
    /// Identifier assigned by the cluster CLI, set while joining
    #[serde(skip)]
    pub id: Option<String>,
    #[serde(skip)]
    pub state: HostState,
}

impl Host {
    pub fn new(name: &str, external_ip: &str, internal_ip: &str) -> Self {
        Self {
            name: name.to_string(),
            external_ip: external_ip.to_string(),
            internal_ip: internal_ip.to_string(),
            os: String::new(),
            docker: String::new(),
            cpu: None,
            memory: None,
            disk: None,
            insecure_registries: Vec::new(),
            role: Role::Worker,
            cluster: None,
            id: None,
            state: HostState::Declared,
        }
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Drives host lifecycle operations for one deployment
pub struct HostManager<'a> {
    ctx: &'a DeploymentContext,
    runner: &'a dyn CommandRunner,
    scripts: ScriptRenderer,
}

impl<'a> HostManager<'a> {
    pub fn new(ctx: &'a DeploymentContext, runner: &'a dyn CommandRunner) -> Result<Self> {
        Ok(Self {
            ctx,
            runner,
            scripts: ScriptRenderer::new()?,
        })
    }

    /// Arguments of `<machine> create` for `host`
    pub fn create_args(&self, host: &Host) -> Vec<String> {
        let driver = &self.ctx.tools.driver;
        let flag = |name: &str| format!("--{}-{}", driver, name);

        let mut args = vec![
            "create".to_string(),
            "-d".to_string(),
            driver.clone(),
            flag("ip"),
            host.external_ip.clone(),
            flag("ip"),
            host.internal_ip.clone(),
        ];

        if let Some(ref cpu) = host.cpu {
            args.push(flag("cpu-count"));
            args.push(cpu.clone());
        }

        if let Some(ref memory) = host.memory {
            args.push(flag("memory"));
            args.push(memory.clone());
        }

        for registry in self
            .ctx
            .insecure_registries
            .iter()
            .chain(&host.insecure_registries)
        {
            args.push(flag("insecure-registry"));
            args.push(registry.clone());
        }

        args.push(host.name.clone());
        args
    }

    /// Provision `host`. A host that already exists counts as created.
    pub async fn create(&self, host: &Host) -> Result<()> {
        tracing::info!("Creating {}...", host.name);

        let output = self
            .runner
            .run(&self.ctx.tools.machine, &self.create_args(host))
            .await?;

        if output.stderr.is_empty() {
            return Ok(());
        }

        if output.stderr.contains(ALREADY_EXISTS) {
            tracing::info!("Host {} already exists", host.name);
            return Ok(());
        }

        Err(ConvoyError::Provision(output.stderr))
    }

    /// Remove `host`. Failures are logged and never returned.
    pub async fn destroy(&self, host: &Host) -> Result<()> {
        tracing::info!("Destroying {}...", host.name);

        let args = vec!["rm".to_string(), "-y".to_string(), host.name.clone()];
        match self.runner.run(&self.ctx.tools.machine, &args).await {
            Ok(output) if !output.success => {
                tracing::warn!("Destroying {} failed: {}", host.name, output.stderr);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Destroying {} failed: {}", host.name, e),
        }

        Ok(())
    }

    /// Whether the provisioning CLI knows a host named exactly `host.name`
    pub async fn exists(&self, host: &Host) -> Result<bool> {
        let args = vec![
            "ls".to_string(),
            "--filter".to_string(),
            format!("name={}", host.name),
            "-q".to_string(),
        ];
        let output = self.runner.run(&self.ctx.tools.machine, &args).await?;
        Ok(output.stdout == host.name)
    }

    /// Install the deploy agent on `host`, then the web component if configured
    pub async fn deploy(&self, host: &Host) -> Result<()> {
        tracing::info!("Deploying agent to {}...", host.name);

        let ssh = self.ssh(host);
        let agent = &self.ctx.agent;
        let script = self.scripts.deploy(&DeployScript {
            ssh: &ssh,
            image: &agent.image,
            binary: &agent.binary,
            binary_name: agent.binary_name(),
            internal_ip: &host.internal_ip,
            external_ip: &host.external_ip,
            registry: &self.ctx.registry,
            options: &agent.options,
        })?;
        self.run_script(&script).await?;

        if let Some(web) = self.ctx.web_component() {
            tracing::info!("Deploying web component to {}...", host.name);
            let script = self.scripts.web(&ssh, &web.image, &web.volume)?;
            self.run_script(&script).await?;
        }

        Ok(())
    }

    /// Join `host` to its cluster by running the agent's deploy script on it
    pub async fn join(&self, host: &Host) -> Result<()> {
        tracing::info!(
            "Joining {} ({}) as {}...",
            host.name,
            host.id.as_deref().unwrap_or("-"),
            host.role
        );

        let args = vec![
            "host".to_string(),
            "deploy-script".to_string(),
            "-q".to_string(),
        ];
        let output = self.runner.run(&self.ctx.tools.agent, &args).await?;

        let script = self.scripts.ssh(&self.ssh(host), &output.stdout)?;
        self.run_script(&script).await
    }

    fn ssh(&self, host: &Host) -> String {
        format!("{} ssh {}", self.ctx.tools.machine, host.name)
    }

    /// Run a rendered script. The remote outcome is not inspected.
    async fn run_script(&self, script: &str) -> Result<()> {
        let args = vec!["-c".to_string(), script.to_string()];
        let output = self.runner.run(&self.ctx.tools.shell, &args).await?;
        if !output.success {
            tracing::debug!("remote script exited with error: {}", output.stderr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, ToolConfig, WebConfig};
    use crate::exec::testing::ScriptedRunner;
    use crate::exec::CommandOutput;

    fn context() -> DeploymentContext {
        DeploymentContext {
            registry: "10.10.1.195:5000".to_string(),
            insecure_registries: vec!["10.10.1.195:5000".to_string()],
            agent: AgentConfig {
                image: "10.10.1.195:5000/agent:1.4".to_string(),
                binary: "/opt/chiwen/bin/my".to_string(),
                options: vec!["--with-monitoring".to_string()],
            },
            web: None,
            tools: ToolConfig::default(),
            command_timeout: None,
        }
    }

    fn host() -> Host {
        let mut host = Host::new("luke195", "10.10.1.195", "192.168.1.195");
        host.insecure_registries = vec!["mirror:5000".to_string()];
        host
    }

    #[test]
    fn test_create_args_minimal() {
        let ctx = DeploymentContext {
            insecure_registries: Vec::new(),
            ..context()
        };
        let runner = ScriptedRunner::new();
        let manager = HostManager::new(&ctx, &runner).unwrap();

        let args = manager.create_args(&Host::new("n1", "1.1.1.1", "10.0.0.1"));
        assert_eq!(
            args,
            vec!["create", "-d", "my", "--my-ip", "1.1.1.1", "--my-ip", "10.0.0.1", "n1"]
        );
    }

    #[test]
    fn test_create_args_sizing_and_registries() {
        let ctx = context();
        let runner = ScriptedRunner::new();
        let manager = HostManager::new(&ctx, &runner).unwrap();

        let mut host = host();
        host.cpu = Some("4".to_string());
        host.memory = Some("8192".to_string());
        host.disk = Some("100".to_string());

        assert_eq!(
            manager.create_args(&host).join(" "),
            "create -d my --my-ip 10.10.1.195 --my-ip 192.168.1.195 \
             --my-cpu-count 4 --my-memory 8192 \
             --my-insecure-registry 10.10.1.195:5000 \
             --my-insecure-registry mirror:5000 luke195"
        );
    }

    #[tokio::test]
    async fn test_create_success() {
        let ctx = context();
        let runner = ScriptedRunner::new();
        let manager = HostManager::new(&ctx, &runner).unwrap();

        manager.create(&host()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "docker-machine");
        assert_eq!(calls[0].args[0], "create");
    }

    #[tokio::test]
    async fn test_create_already_exists_is_success() {
        let ctx = context();
        let runner = ScriptedRunner::new().respond(
            "create",
            CommandOutput::failed("Host already exists: \"luke195\""),
        );
        let manager = HostManager::new(&ctx, &runner).unwrap();

        assert!(manager.create(&host()).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_failure_is_verbatim() {
        let ctx = context();
        let stderr = "Error creating machine: ssh: handshake failed";
        let runner = ScriptedRunner::new().respond("create", CommandOutput::failed(stderr));
        let manager = HostManager::new(&ctx, &runner).unwrap();

        let err = manager.create(&host()).await.unwrap_err();
        assert!(matches!(&err, ConvoyError::Provision(text) if text == stderr));
        assert_eq!(err.to_string(), stderr);
    }

    #[tokio::test]
    async fn test_destroy_always_succeeds() {
        let ctx = context();
        let runner = ScriptedRunner::new().respond("rm -y", CommandOutput::failed("not found"));
        let manager = HostManager::new(&ctx, &runner).unwrap();

        manager.destroy(&host()).await.unwrap();
        assert_eq!(runner.lines(), vec!["docker-machine rm -y luke195"]);
    }

    #[tokio::test]
    async fn test_exists_exact_match() {
        let ctx = context();
        let runner = ScriptedRunner::new().respond("name=luke195", CommandOutput::ok("luke195"));
        let manager = HostManager::new(&ctx, &runner).unwrap();

        assert!(manager.exists(&host()).await.unwrap());
        assert_eq!(
            runner.lines(),
            vec!["docker-machine ls --filter name=luke195 -q"]
        );
    }

    #[tokio::test]
    async fn test_exists_rejects_partial_match() {
        let ctx = context();
        let runner = ScriptedRunner::new().respond("name=luke", CommandOutput::ok("luke195"));
        let manager = HostManager::new(&ctx, &runner).unwrap();

        let short = Host::new("luke", "1.1.1.1", "10.0.0.1");
        assert!(!manager.exists(&short).await.unwrap());
    }

    #[tokio::test]
    async fn test_deploy_runs_agent_script() {
        let ctx = context();
        let runner = ScriptedRunner::new();
        let manager = HostManager::new(&ctx, &runner).unwrap();

        manager.deploy(&host()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "/bin/bash");
        assert_eq!(calls[0].args[0], "-c");

        let script = &calls[0].args[1];
        assert!(script.contains("docker-machine ssh luke195 << 'EOF'"));
        assert!(script.contains("docker pull 10.10.1.195:5000/agent:1.4"));
        assert!(script.contains("$HOME/my \\"));
        assert!(script.contains("--host-ip=192.168.1.195"));
        assert!(script.contains("--domain=10.10.1.195"));
        assert!(script.contains("--registry=10.10.1.195:5000"));
        assert!(script.contains("--with-monitoring \\"));
    }

    #[tokio::test]
    async fn test_deploy_with_web_component() {
        let ctx = DeploymentContext {
            web: Some(WebConfig {
                image: "10.10.1.195:5000/web:1.4".to_string(),
                volume: "chiwen.web".to_string(),
            }),
            ..context()
        };
        let runner = ScriptedRunner::new();
        let manager = HostManager::new(&ctx, &runner).unwrap();

        manager.deploy(&host()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].args[1].contains("docker pull 10.10.1.195:5000/web:1.4"));
        assert!(calls[1].args[1].contains("-v chiwen.web:/data"));
    }

    #[tokio::test]
    async fn test_deploy_ignores_remote_failure() {
        let ctx = context();
        let runner =
            ScriptedRunner::new().respond("docker pull", CommandOutput::failed("pull denied"));
        let manager = HostManager::new(&ctx, &runner).unwrap();

        assert!(manager.deploy(&host()).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_wraps_agent_script() {
        let ctx = context();
        let runner = ScriptedRunner::new().respond(
            "deploy-script",
            CommandOutput::ok("curl -s http://10.10.1.195/join.sh | sh"),
        );
        let manager = HostManager::new(&ctx, &runner).unwrap();

        manager.join(&host()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].line(), "my host deploy-script -q");
        assert_eq!(
            calls[1].args[1],
            "\ndocker-machine ssh luke195 << 'EOF'\n\tcurl -s http://10.10.1.195/join.sh | sh\nEOF"
        );
    }

    #[test]
    fn test_role_parsing() {
        let roles: Vec<Role> = serde_yaml::from_str("[manager, master, leader, worker]").unwrap();
        assert_eq!(
            roles,
            vec![Role::Manager, Role::Manager, Role::Leader, Role::Worker]
        );
        assert!(Role::Leader.is_control_plane());
        assert!(!Role::Worker.is_control_plane());
        assert_eq!(Role::default(), Role::Worker);
        assert_eq!(format!("{:<8}|", Role::Leader), "leader  |");
    }
}

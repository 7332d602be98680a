//! Remote script templates
//!
//! Every remote action is one heredoc piped into a single `ssh` session, so
//! the remote shell sees the whole script at once. Nothing is rolled back if
//! the script fails half way.

use crate::error::Result;
use minijinja::{context, Environment, UndefinedBehavior};

/// Generic wrapper running one command text on a host
const SSH_TEMPLATE: &str = "
{{ ssh }} << 'EOF'
\t{{ command }}
EOF
";

/// Installs the deploy agent binary from its image and runs `deploy`
const DEPLOY_TEMPLATE: &str = "
{{ ssh }} << 'EOF'
\tdocker pull {{ image }}
\tid=$(docker create {{ image }})
\tdocker cp $id:{{ binary }} $HOME/
\t$HOME/{{ binary_name }} \\
\t\tdeploy \\
\t\t--host-ip={{ internal_ip }} \\
\t\t--domain={{ external_ip }} \\
\t\t--registry={{ registry }} \\
{% for option in options %}\t\t{{ option }} \\
{% endfor %}\t\t-y
\tdocker rm $id
EOF
";

/// Pulls and runs the web component with its persistent volume
const WEB_TEMPLATE: &str = "
{{ ssh }} << 'EOF'
\tdocker pull {{ web }}
\tdocker run \\
\t\t-v {{ volume }}:/data \\
\t\t{{ web }}
EOF
";

/// Values for [`ScriptRenderer::deploy`]
#[derive(Debug, Clone)]
pub struct DeployScript<'a> {
    pub ssh: &'a str,
    pub image: &'a str,
    pub binary: &'a str,
    pub binary_name: &'a str,
    pub internal_ip: &'a str,
    pub external_ip: &'a str,
    pub registry: &'a str,
    pub options: &'a [String],
}

/// Renders the heredoc scripts sent to hosts
pub struct ScriptRenderer {
    env: Environment<'static>,
}

impl ScriptRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template("ssh.sh", SSH_TEMPLATE)?;
        env.add_template("deploy.sh", DEPLOY_TEMPLATE)?;
        env.add_template("web.sh", WEB_TEMPLATE)?;
        Ok(Self { env })
    }

    /// Wrap `command` in an ssh heredoc
    pub fn ssh(&self, ssh: &str, command: &str) -> Result<String> {
        let template = self.env.get_template("ssh.sh")?;
        Ok(template.render(context! { ssh => ssh, command => command })?)
    }

    pub fn deploy(&self, script: &DeployScript<'_>) -> Result<String> {
        let template = self.env.get_template("deploy.sh")?;
        Ok(template.render(context! {
            ssh => script.ssh,
            image => script.image,
            binary => script.binary,
            binary_name => script.binary_name,
            internal_ip => script.internal_ip,
            external_ip => script.external_ip,
            registry => script.registry,
            options => script.options,
        })?)
    }

    pub fn web(&self, ssh: &str, web: &str, volume: &str) -> Result<String> {
        let template = self.env.get_template("web.sh")?;
        Ok(template.render(context! { ssh => ssh, web => web, volume => volume })?)
    }
}

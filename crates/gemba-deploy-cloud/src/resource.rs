use std::fmt;

use serde_json::Value;

/// Tag recorded on the SQL server to opt out of the security posture policy.
pub const SECURITY_TAG_KEY: &str = "SecurityControl";
pub const SECURITY_TAG_VALUE: &str = "Ignore";

/// Managed resource kinds, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ResourceGroup,
    SqlServer,
    SqlDatabase,
    Registry,
    Environment,
    ContainerApp,
}

impl ResourceKind {
    pub const ORDER: [ResourceKind; 6] = [
        Self::ResourceGroup,
        Self::SqlServer,
        Self::SqlDatabase,
        Self::Registry,
        Self::Environment,
        Self::ContainerApp,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResourceGroup => "resource group",
            Self::SqlServer => "SQL server",
            Self::SqlDatabase => "SQL database",
            Self::Registry => "container registry",
            Self::Environment => "Container Apps environment",
            Self::ContainerApp => "Container App",
        })
    }
}

/// Identifying keys of one Azure resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    Group {
        name: &'a str,
    },
    SqlServer {
        group: &'a str,
        name: &'a str,
    },
    SqlDatabase {
        group: &'a str,
        server: &'a str,
        name: &'a str,
    },
    Registry {
        group: &'a str,
        name: &'a str,
    },
    Environment {
        group: &'a str,
        name: &'a str,
    },
    ContainerApp {
        group: &'a str,
        name: &'a str,
    },
}

impl Resource<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Group { .. } => ResourceKind::ResourceGroup,
            Self::SqlServer { .. } => ResourceKind::SqlServer,
            Self::SqlDatabase { .. } => ResourceKind::SqlDatabase,
            Self::Registry { .. } => ResourceKind::Registry,
            Self::Environment { .. } => ResourceKind::Environment,
            Self::ContainerApp { .. } => ResourceKind::ContainerApp,
        }
    }

    pub fn name(&self) -> &str {
        match *self {
            Self::Group { name }
            | Self::SqlServer { name, .. }
            | Self::SqlDatabase { name, .. }
            | Self::Registry { name, .. }
            | Self::Environment { name, .. }
            | Self::ContainerApp { name, .. } => name,
        }
    }

    /// Read-only `show` invocation for this resource.
    pub fn show_args(&self) -> Vec<String> {
        let mut args: Vec<&str> = match *self {
            Self::Group { name } => vec!["group", "show", "--name", name],
            Self::SqlServer { group, name } => {
                vec!["sql", "server", "show", "--resource-group", group, "--name", name]
            }
            Self::SqlDatabase {
                group,
                server,
                name,
            } => vec![
                "sql",
                "db",
                "show",
                "--resource-group",
                group,
                "--server",
                server,
                "--name",
                name,
            ],
            Self::Registry { group, name } => {
                vec!["acr", "show", "--resource-group", group, "--name", name]
            }
            Self::Environment { group, name } => vec![
                "containerapp",
                "env",
                "show",
                "--resource-group",
                group,
                "--name",
                name,
            ],
            Self::ContainerApp { group, name } => {
                vec!["containerapp", "show", "--resource-group", group, "--name", name]
            }
        };
        args.extend(["--output", "json"]);
        args.into_iter().map(str::to_owned).collect()
    }
}

/// Probe-derived classification of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Absent,
    NeedsUpdate,
    UpToDate,
}

impl ResourceState {
    /// Classify a `show` result. `None` means Azure reported the resource
    /// as not found.
    pub fn classify(kind: ResourceKind, shown: Option<&Value>) -> Self {
        let Some(body) = shown else {
            return Self::Absent;
        };

        let up_to_date = match kind {
            ResourceKind::SqlServer => {
                body.pointer(&format!("/tags/{SECURITY_TAG_KEY}"))
                    .and_then(Value::as_str)
                    == Some(SECURITY_TAG_VALUE)
            }
            ResourceKind::Registry => body
                .get("adminUserEnabled")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            // Redeployed on every run.
            ResourceKind::ContainerApp => false,
            ResourceKind::ResourceGroup | ResourceKind::SqlDatabase | ResourceKind::Environment => {
                true
            }
        };

        if up_to_date {
            Self::UpToDate
        } else {
            Self::NeedsUpdate
        }
    }

    pub fn exists(self) -> bool {
        self != Self::Absent
    }
}

/// `az` exit code for a missing resource on `show`-style commands.
const EXIT_RESOURCE_NOT_FOUND: i32 = 3;

/// stderr markers Azure uses when a looked-up resource does not exist.
const NOT_FOUND_MARKERS: &[&str] = &[
    "ResourceNotFound",
    "ResourceGroupNotFound",
    "ParentResourceNotFound",
    "was not found",
    "could not be found",
];

/// stderr markers Azure uses when a created resource is already there.
const ALREADY_EXISTS_MARKERS: &[&str] = &[
    "already exists",
    "AlreadyExists",
    "(Conflict)",
];

#[derive(Debug, thiserror::Error)]
pub enum AzError {
    #[error("az CLI not found, install it from https://learn.microsoft.com/cli/azure/install-azure-cli")]
    NotInstalled { source: std::io::Error },

    #[error("az {command} failed{}: {stderr}", code.map(|c| format!(" (exit {c})")).unwrap_or_default())]
    CommandFailed {
        /// Redacted command label, see [`command_label`].
        command: String,
        code: Option<i32>,
        /// stderr folded onto one line.
        stderr: String,
    },

    #[error("az output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },

    #[error("az {command} returned unexpected output")]
    InvalidOutput {
        command: String,
        source: serde_json::Error,
    },
}

impl AzError {
    /// Whether this is Azure reporting the resource as absent, which a
    /// probe treats as a normal `false`.
    pub fn is_resource_not_found(&self) -> bool {
        match self {
            Self::CommandFailed { code, stderr, .. } => {
                *code == Some(EXIT_RESOURCE_NOT_FOUND)
                    || NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m))
            }
            _ => false,
        }
    }

    /// Whether a create call failed only because the resource exists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                ALREADY_EXISTS_MARKERS.iter().any(|m| stderr.contains(m))
            }
            _ => false,
        }
    }
}

/// Leading sub-command words of an `az` invocation, up to the first flag.
///
/// Flag values (passwords, secrets, connection strings) never make it
/// into logs or error messages.
pub fn command_label(args: &[String]) -> String {
    args.iter()
        .take_while(|a| !a.starts_with('-'))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fold multi-line CLI output onto a single line.
pub(crate) fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RomulusError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("invalid config: {message}")]
    Validation { message: String },

    #[error("state snapshot violates a consistency invariant: {message}")]
    #[diagnostic(help("check that every pool/network/volume reference in the config exists"))]
    Consistency { message: String },

    #[error("plan references a resource not yet created: {message}")]
    #[diagnostic(help("this is a planner bug — please report it"))]
    Dependency { message: String },

    #[error("plan orders actions incorrectly: {message}")]
    #[diagnostic(help("this is a planner bug — please report it"))]
    Order { message: String },

    #[error("cloud-init template error for '{vm}': {message}")]
    Template { vm: String, message: String },

    #[error("{action} on {resource} failed: {message}")]
    #[diagnostic(help("re-run `romulus plan` to see the remaining changes"))]
    Adapter {
        action: String,
        resource: String,
        message: String,
    },

    #[error("libvirt error: {message}")]
    #[diagnostic(help("{hint}"))]
    Libvirt { message: String, hint: String },

    #[error(
        "execution stopped after {completed} action(s): {action} on {resource} failed: {reason}"
    )]
    Execution {
        completed: usize,
        action: String,
        resource: String,
        reason: String,
    },

    #[error("operation cancelled after {completed} action(s)")]
    Cancelled { completed: usize },

    #[error("failed to download image: {message}")]
    ImageDownload {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{command} failed: {message}")]
    #[diagnostic(help("ensure {command} is installed and accessible"))]
    ExternalCommand { command: String, message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {timeout_s}s waiting on {what}")]
    Timeout { what: String, timeout_s: u64 },

    #[error("{command} is not yet implemented")]
    NotImplemented { command: String },
}

impl RomulusError {
    /// Maps the error onto the CLI's exit code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            RomulusError::ConfigLoad { .. }
            | RomulusError::ConfigParse { .. }
            | RomulusError::Validation { .. }
            | RomulusError::Consistency { .. }
            | RomulusError::Dependency { .. }
            | RomulusError::Order { .. } => 1,

            RomulusError::Template { .. }
            | RomulusError::Adapter { .. }
            | RomulusError::Libvirt { .. }
            | RomulusError::Execution { .. }
            | RomulusError::ImageDownload { .. }
            | RomulusError::ExternalCommand { .. }
            | RomulusError::Io { .. }
            | RomulusError::Timeout { .. }
            | RomulusError::NotImplemented { .. } => 2,

            RomulusError::Cancelled { .. } => 130,
        }
    }
}

use thiserror::Error;

/// Failures surfaced by the network control adapter (NetworkManager calls).
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("'{command}' timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("failed to parse command output: {0}")]
    Parse(String),
}

/// Top-level error taxonomy for the warden core.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Fewer than two wireless radios, or no radio left for a role.
    /// Fatal at startup.
    #[error("insufficient wireless hardware: {0}")]
    Hardware(String),

    /// Configuration validation failure. Rejected before any mutation.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

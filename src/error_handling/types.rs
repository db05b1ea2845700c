use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadIPFormatting(String),
    BadPort(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadIPFormatting(e) => write!(f, "IP formatting error: {}", e),
            ConfigError::BadPort(e) => write!(f, "Port error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures reported by a container engine adapter.
#[derive(Debug)]
pub enum EngineError {
    /// Engine command did not finish in time.
    Timeout { command: String, timeout: Duration },
    /// Engine command ran but returned a non-zero exit.
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },
    /// Engine binary couldn't be executed (not in PATH, permission denied).
    ExecFailed {
        command: String,
        source: std::io::Error,
    },
    /// Engine answered with output we could not decode.
    MalformedOutput { command: String, reason: String },
    /// The engine does not know the requested container, pod or engine id.
    NotFound(String),
}

impl EngineError {
    pub fn failed(cmd: impl Into<String>, output: &std::process::Output) -> Self {
        EngineError::CommandFailed {
            command: cmd.into(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code(),
        }
    }

    pub fn malformed(cmd: impl Into<String>, reason: impl fmt::Display) -> Self {
        EngineError::MalformedOutput {
            command: cmd.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Timeout { command, timeout } => write!(
                f,
                "Timed out running '{}' (exceeded {} seconds)",
                command,
                timeout.as_secs()
            ),
            EngineError::CommandFailed {
                command,
                stderr,
                exit_code,
            } => match exit_code {
                Some(code) => write!(f, "'{}' failed with exit code {}: {}", command, code, stderr),
                None => write!(f, "'{}' was terminated by a signal: {}", command, stderr),
            },
            EngineError::ExecFailed { command, source } => {
                write!(f, "Unable to execute '{}': {}", command, source)
            }
            EngineError::MalformedOutput { command, reason } => {
                write!(f, "Unexpected output from '{}': {}", command, reason)
            }
            EngineError::NotFound(what) => write!(f, "Engine object not found: {}", what),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::ExecFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors surfaced by the services manager to its callers.
#[derive(Debug)]
pub enum ServiceError {
    /// No tracked service for the given container id.
    NotFound(String),
    /// Request rejected before any engine call was made.
    Precondition(String),
    Engine(EngineError),
    Io(std::io::Error),
    Serialization(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::NotFound(id) => write!(f, "service not found: {}", id),
            ServiceError::Precondition(e) => write!(f, "Precondition failed: {}", e),
            ServiceError::Engine(e) => write!(f, "Engine error: {}", e),
            ServiceError::Io(e) => write!(f, "IO error: {}", e),
            ServiceError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Engine(e) => Some(e),
            ServiceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        ServiceError::Engine(err)
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(err)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

#[derive(Debug)]
pub enum TransportError {
    DeliveryFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::DeliveryFailed(e) => write!(f, "UI message delivery failed: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    WebError(WebError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}

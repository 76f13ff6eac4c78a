use std::fmt;

use memlink::MemlinkError;

/// Why a command failed, as reported on exit
#[derive(Debug)]
pub enum CliError {
    /// Bad or missing settings: config file, env overlay, log setup
    Config(String),
    /// The memory service could not be reached or refused the request
    Service(String),
    /// Rendering results for stdout
    Output(String),
    Other(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "configuration: {msg}"),
            CliError::Service(msg) => write!(f, "memory service: {msg}"),
            CliError::Output(msg) => write!(f, "output: {msg}"),
            CliError::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError::Other(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError::Other(s.to_string())
    }
}

impl From<MemlinkError> for CliError {
    fn from(e: MemlinkError) -> Self {
        match e {
            MemlinkError::Config(msg) => CliError::Config(msg),
            other => CliError::Service(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(format!("JSON error: {e}"))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(e: toml::ser::Error) -> Self {
        CliError::Output(format!("TOML error: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Other(format!("IO error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_stay_config() {
        let err = CliError::from(MemlinkError::Config("API key is required".to_string()));
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.to_string(), "configuration: API key is required");
    }

    #[test]
    fn client_failures_are_service_errors() {
        let err = CliError::from(MemlinkError::Connection("refused".to_string()));
        assert!(matches!(err, CliError::Service(_)));
        assert!(err.to_string().starts_with("memory service: "));

        let err = CliError::from(MemlinkError::Closed);
        assert!(matches!(err, CliError::Service(_)));
    }

    #[test]
    fn plain_messages_have_no_prefix() {
        let err = CliError::from("nothing to do");
        assert_eq!(err.to_string(), "nothing to do");
    }
}

use thiserror::Error;

/// Phase of the two-step context file fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// Solving the sub-graph that selects the file from the build context
    Resolve,
    /// Reading the file back from the solved reference
    Read,
}

impl std::fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve => write!(f, "resolve"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// Bunny error types
#[derive(Error, Debug)]
pub enum BunnyError {
    /// Descriptor bytes could not be decoded
    #[error("Failed to parse descriptor: {0}")]
    Parse(String),

    /// Malformed or unknown instruction
    #[error("Line {line}: {message}")]
    InstructionParse { line: usize, message: String },

    /// A second FROM was declared
    #[error("Line {line}: multi-stage builds are not supported")]
    MultiStageUnsupported { line: usize },

    /// The descriptor never declared a base
    #[error("Build base has not been set (missing FROM)")]
    MissingBase,

    /// Required build option not supplied by the engine
    #[error("Missing required build option '{0}'")]
    MissingOption(String),

    /// Required local path not supplied
    #[error("Missing path: {0}")]
    MissingPath(String),

    /// One phase of the context file fetch failed
    #[error("Failed to {phase} context file '{name}': {source}")]
    Fetch {
        phase: FetchPhase,
        name: String,
        #[source]
        source: Box<BunnyError>,
    },

    /// Graph construction failed
    #[error("Compile error: {0}")]
    Compile(String),

    /// The metadata payload could not be marshalled
    #[error("Failed to encode metadata: {0}")]
    MetadataEncoding(String),

    /// The engine rejected the final graph
    #[error("Solve failed: {source}")]
    Solve {
        #[source]
        source: Box<BunnyError>,
    },

    /// gRPC communication error
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// Connection to the engine could not be established
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BunnyError {
    /// Wrap an engine error as a failed fetch phase.
    pub fn fetch(phase: FetchPhase, name: impl Into<String>, source: BunnyError) -> Self {
        Self::Fetch {
            phase,
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an engine error as a rejected final solve.
    pub fn solve(source: BunnyError) -> Self {
        Self::Solve {
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for BunnyError {
    fn from(err: serde_json::Error) -> Self {
        BunnyError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for BunnyError {
    fn from(err: serde_yaml::Error) -> Self {
        BunnyError::Serialization(err.to_string())
    }
}

/// Result type alias for bunny operations
pub type Result<T> = std::result::Result<T, BunnyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_parse_display() {
        let error = BunnyError::InstructionParse {
            line: 3,
            message: "Unknown instruction 'FORM'".to_string(),
        };
        assert_eq!(error.to_string(), "Line 3: Unknown instruction 'FORM'");
    }

    #[test]
    fn test_multi_stage_display() {
        let error = BunnyError::MultiStageUnsupported { line: 4 };
        assert_eq!(
            error.to_string(),
            "Line 4: multi-stage builds are not supported"
        );
    }

    #[test]
    fn test_missing_option_display() {
        let error = BunnyError::MissingOption("filename".to_string());
        assert_eq!(error.to_string(), "Missing required build option 'filename'");
    }

    #[test]
    fn test_fetch_error_names_phase() {
        let error = BunnyError::fetch(
            FetchPhase::Read,
            "Containerfile",
            BunnyError::Grpc(tonic::Status::not_found("no such file")),
        );
        let msg = error.to_string();
        assert!(msg.starts_with("Failed to read context file 'Containerfile'"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_fetch_error_source_chain() {
        use std::error::Error as _;

        let error = BunnyError::fetch(
            FetchPhase::Resolve,
            "Containerfile",
            BunnyError::Transport("broken pipe".to_string()),
        );
        let source = error.source().unwrap();
        assert_eq!(source.to_string(), "Transport error: broken pipe");
    }

    #[test]
    fn test_solve_error_display() {
        let error = BunnyError::solve(BunnyError::Grpc(tonic::Status::internal("boom")));
        assert!(error.to_string().starts_with("Solve failed: gRPC error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: BunnyError = io_error.into();
        assert!(matches!(error, BunnyError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ bad");
        let error: BunnyError = result.unwrap_err().into();
        assert!(matches!(error, BunnyError::Serialization(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: BunnyError = result.unwrap_err().into();
        assert!(matches!(error, BunnyError::Serialization(_)));
    }

    #[test]
    fn test_fetch_phase_display() {
        assert_eq!(FetchPhase::Resolve.to_string(), "resolve");
        assert_eq!(FetchPhase::Read.to_string(), "read");
    }
}

//! Gateway-specific error conversions.

use bunny_core::error::BunnyError;
use tonic::Status;

/// Convert a BunnyError to the gRPC Status reported back to the engine.
pub fn to_status(err: &BunnyError) -> Status {
    match err {
        BunnyError::Parse(_)
        | BunnyError::InstructionParse { .. }
        | BunnyError::MultiStageUnsupported { .. }
        | BunnyError::MissingBase
        | BunnyError::Compile(_) => Status::invalid_argument(err.to_string()),
        BunnyError::MissingOption(_) | BunnyError::MissingPath(_) => {
            Status::failed_precondition(err.to_string())
        }
        BunnyError::Config(_) => Status::invalid_argument(err.to_string()),
        BunnyError::Transport(_) => Status::unavailable(err.to_string()),
        // Keep the engine's code, prefix the message with our context
        BunnyError::Fetch { source, .. } | BunnyError::Solve { source } => match &**source {
            BunnyError::Grpc(status) => Status::new(status.code(), err.to_string()),
            _ => Status::internal(err.to_string()),
        },
        BunnyError::Grpc(status) => status.clone(),
        other => Status::internal(other.to_string()),
    }
}

//! gRPC client for the engine's `LLBBridge` service.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bunny_core::error::{BunnyError, Result};
use http::uri::PathAndQuery;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UnixStream;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use super::pb::{
    ReadFileRequest, ReadFileResponse, ReturnRequest, ReturnResponse, SolveRequest, SolveResponse,
};
use super::LlbBridge;
use crate::llb::pb::Definition;

const SOLVE_PATH: &str = "/moby.buildkit.v1.frontend.LLBBridge/Solve";
const READ_FILE_PATH: &str = "/moby.buildkit.v1.frontend.LLBBridge/ReadFile";
const RETURN_PATH: &str = "/moby.buildkit.v1.frontend.LLBBridge/Return";

// The URI is required by tonic but unused by custom connectors
const PLACEHOLDER_URI: &str = "http://[::]:50051";

/// The process's stdin and stdout as one bidirectional stream.
pub struct StdioStream {
    stdin: tokio::io::Stdin,
    stdout: tokio::io::Stdout,
}

impl StdioStream {
    pub fn new() -> Self {
        Self {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdioStream {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncRead for StdioStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_read(cx, buf)
    }
}

impl AsyncWrite for StdioStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stdout).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_shutdown(cx)
    }
}

/// `LLBBridge` client over an HTTP/2 channel.
#[derive(Clone)]
pub struct GrpcBridge {
    channel: Channel,
}

impl GrpcBridge {
    /// Connect over stdin/stdout, the way the engine runs gateway frontends.
    pub async fn connect_stdio() -> Result<Self> {
        let channel = Endpoint::from_static(PLACEHOLDER_URI)
            .connect_with_connector(service_fn(|_: Uri| async {
                Ok::<_, io::Error>(StdioStream::new())
            }))
            .await
            .map_err(|e| BunnyError::Transport(format!("Failed to connect over stdio: {}", e)))?;

        Ok(Self { channel })
    }

    /// Connect to a gateway listening on a Unix socket.
    pub async fn connect_unix(socket_path: &Path) -> Result<Self> {
        let path = socket_path.to_path_buf();
        let channel = Endpoint::from_static(PLACEHOLDER_URI)
            .connect_with_connector(service_fn(move |_: Uri| UnixStream::connect(path.clone())))
            .await
            .map_err(|e| {
                BunnyError::Transport(format!(
                    "Failed to connect to gateway at {}: {}",
                    socket_path.display(),
                    e
                ))
            })?;

        Ok(Self { channel })
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| BunnyError::Transport(format!("Gateway not ready: {}", e)))?;

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl LlbBridge for GrpcBridge {
    async fn solve(&self, definition: Definition) -> Result<String> {
        let request = SolveRequest {
            definition: Some(definition),
            allow_result_return: true,
            ..Default::default()
        };
        let response: SolveResponse = self.unary(SOLVE_PATH, request).await?;

        let reference = response
            .result
            .as_ref()
            .and_then(|r| r.reference())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .or_else(|| Some(response.r#ref.clone()).filter(|r| !r.is_empty()));

        reference.ok_or_else(|| {
            BunnyError::Grpc(tonic::Status::internal("Solve returned no result reference"))
        })
    }

    async fn read_file(&self, reference: &str, path: &str) -> Result<Vec<u8>> {
        let request = ReadFileRequest {
            r#ref: reference.to_string(),
            file_path: path.to_string(),
        };
        let response: ReadFileResponse = self.unary(READ_FILE_PATH, request).await?;
        Ok(response.data)
    }

    async fn return_result(&self, request: ReturnRequest) -> Result<()> {
        let _: ReturnResponse = self.unary(RETURN_PATH, request).await?;
        Ok(())
    }
}

//! Service-mode build handler.
//!
//! One invocation per process: fetch the descriptor named by the `filename`
//! option, compile it, solve the graph and attach image metadata to the
//! solved reference.

use std::collections::BTreeMap;

use bunny_core::error::{BunnyError, Result};
use bunny_core::FrontendConfig;

use crate::compile::{compile, image_config, CompileOptions};
use crate::descriptor::PackageDescriptor;
use crate::dockerfile::Dockerfile;
use crate::error::to_status;
use crate::fetch::ContextFetcher;
use crate::gateway::pb::{build_result, BuildResult, Ref, ReturnRequest, RpcStatus};
use crate::gateway::{FrontendOpts, LlbBridge};

/// Build option naming the descriptor inside the build context.
pub const FILENAME_OPTION: &str = "filename";

/// Result metadata key of the image config.
pub const IMAGE_CONFIG_KEY: &str = "containerimage.config";

/// Result metadata key prefix of manifest annotations.
pub const MANIFEST_ANNOTATION_PREFIX: &str = "annotation.manifest.";

/// Solved reference plus the metadata the engine attaches to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub reference: String,
    pub metadata: BTreeMap<String, Vec<u8>>,
}

impl From<BuildOutput> for BuildResult {
    fn from(output: BuildOutput) -> Self {
        BuildResult {
            result: Some(build_result::Kind::Ref(Ref {
                id: output.reference,
                def: None,
            })),
            metadata: output.metadata,
        }
    }
}

/// Gateway frontend for unikernel packages.
pub struct Frontend {
    config: FrontendConfig,
}

impl Frontend {
    pub fn new(config: FrontendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// Handle one build request against the engine.
    pub async fn build(&self, bridge: &dyn LlbBridge, opts: &FrontendOpts) -> Result<BuildOutput> {
        let filename = opts
            .get(FILENAME_OPTION)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| BunnyError::MissingOption(FILENAME_OPTION.to_string()))?;

        let fetcher = ContextFetcher::new(
            bridge,
            &self.config.context_name,
            self.config.target_platform.clone(),
        )
        .with_session(opts.session_id.clone());
        let content = fetcher.fetch_context_file(filename).await?;

        let dockerfile = Dockerfile::from_bytes(&content)?;
        let descriptor = PackageDescriptor::from_dockerfile(&dockerfile)?;
        tracing::info!(
            file = filename,
            base = %descriptor.base,
            copies = descriptor.copies.len(),
            annotations = descriptor.annotations.len(),
            "Extracted package descriptor"
        );

        let options = CompileOptions::from(&self.config).with_session(opts.session_id.clone());
        let definition = compile(&descriptor, &options)?.marshal()?;

        let reference = bridge.solve(definition).await.map_err(BunnyError::solve)?;
        tracing::info!(reference = %reference, "Solved package graph");

        let mut metadata = BTreeMap::new();
        metadata.insert(
            IMAGE_CONFIG_KEY.to_string(),
            image_config(&descriptor, &self.config)?,
        );
        for (key, value) in &descriptor.annotations {
            metadata.insert(
                format!("{}{}", MANIFEST_ANNOTATION_PREFIX, key),
                value.clone().into_bytes(),
            );
        }

        Ok(BuildOutput {
            reference,
            metadata,
        })
    }

    /// Build and report the outcome to the engine through `Return`.
    ///
    /// The build error, if any, is returned after it has been reported. When
    /// `Return` itself fails the build error still wins and the `Return`
    /// failure is logged.
    pub async fn serve(&self, bridge: &dyn LlbBridge, opts: &FrontendOpts) -> Result<()> {
        let outcome = self.build(bridge, opts).await;
        let request = return_request(&outcome);
        match (outcome, bridge.return_result(request).await) {
            (Err(build_err), Err(return_err)) => {
                tracing::error!(
                    build_error = %build_err,
                    return_error = %return_err,
                    "Failed to report build error to the engine"
                );
                Err(build_err)
            }
            (outcome, returned) => {
                returned?;
                outcome.map(|_| ())
            }
        }
    }
}

/// `Return` payload for a build outcome.
fn return_request(outcome: &Result<BuildOutput>) -> ReturnRequest {
    match outcome {
        Ok(output) => ReturnRequest {
            result: Some(output.clone().into()),
            error: None,
        },
        Err(e) => ReturnRequest {
            result: None,
            error: Some(RpcStatus::from(&to_status(e))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::FakeBridge;
    use crate::llb::pb;
    use bunny_core::FetchPhase;
    use prost::Message;

    const PACKAGE: &[u8] = b"# syntax=harbor.nbfc.io/nubificus/bunny:latest\n\
FROM scratch\n\
COPY nginx.kernel /unikernel/kernel\n\
LABEL com.urunc.unikernel.binary=/unikernel/kernel\n\
LABEL \"com.urunc.unikernel.hypervisor\"=\"qemu\"\n";

    fn opts(filename: Option<&str>) -> FrontendOpts {
        let mut opts = FrontendOpts::default();
        if let Some(f) = filename {
            opts.options.insert(FILENAME_OPTION.to_string(), f.to_string());
        }
        opts
    }

    #[tokio::test]
    async fn test_missing_filename_makes_no_round_trips() {
        let bridge = FakeBridge::default();
        let frontend = Frontend::new(FrontendConfig::default());

        let err = frontend.build(&bridge, &opts(None)).await.unwrap_err();
        assert!(matches!(err, BunnyError::MissingOption(ref o) if o == "filename"));
        assert_eq!(bridge.round_trips(), 0);
    }

    #[tokio::test]
    async fn test_build_attaches_metadata() {
        let bridge = FakeBridge::with_file("Containerfile", PACKAGE);
        let frontend = Frontend::new(FrontendConfig::default());

        let output = frontend
            .build(&bridge, &opts(Some("Containerfile")))
            .await
            .unwrap();

        // Fetch solve, read, final solve
        assert_eq!(bridge.round_trips(), 3);
        assert_eq!(output.reference, "ref-2");
        assert_eq!(
            output.metadata["annotation.manifest.com.urunc.unikernel.hypervisor"],
            b"qemu"
        );
        assert_eq!(
            output.metadata["annotation.manifest.com.urunc.unikernel.binary"],
            b"/unikernel/kernel"
        );

        let config: serde_json::Value =
            serde_json::from_slice(&output.metadata[IMAGE_CONFIG_KEY]).unwrap();
        assert_eq!(config["config"]["Entrypoint"], serde_json::json!(["/unikernel/kernel"]));
        assert_eq!(config["config"]["Labels"]["com.urunc.unikernel.hypervisor"], "qemu");
    }

    #[tokio::test]
    async fn test_final_graph_writes_metadata_file() {
        let bridge = FakeBridge::with_file("Containerfile", PACKAGE);
        let frontend = Frontend::new(FrontendConfig::default());
        frontend
            .build(&bridge, &opts(Some("Containerfile")))
            .await
            .unwrap();

        let solved = bridge.solved.lock().unwrap();
        let ops: Vec<pb::Op> = solved[1]
            .def
            .iter()
            .map(|b| pb::Op::decode(b.as_slice()).unwrap())
            .collect();
        let mkfile = ops
            .iter()
            .find_map(|op| match &op.op {
                Some(pb::op::Op::File(f)) => match &f.actions[0].action {
                    Some(pb::file_action::Action::Mkfile(mk)) => Some(mk.clone()),
                    _ => None,
                },
                _ => None,
            })
            .unwrap();
        assert_eq!(mkfile.path, "/urunc.json");
        let payload: BTreeMap<String, String> = serde_json::from_slice(&mkfile.data).unwrap();
        assert_eq!(payload["com.urunc.unikernel.hypervisor"], "cWVtdQ==");
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_final_solve() {
        let bridge = FakeBridge::default();
        let frontend = Frontend::new(FrontendConfig::default());

        let err = frontend
            .build(&bridge, &opts(Some("Containerfile")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BunnyError::Fetch {
                phase: FetchPhase::Read,
                ..
            }
        ));
        assert_eq!(bridge.solved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_multi_stage_rejected_before_final_solve() {
        let bridge = FakeBridge::with_file("Containerfile", b"FROM scratch\nFROM alpine\n");
        let frontend = Frontend::new(FrontendConfig::default());

        let err = frontend
            .build(&bridge, &opts(Some("Containerfile")))
            .await
            .unwrap_err();
        assert!(matches!(err, BunnyError::MultiStageUnsupported { line: 2 }));
        assert_eq!(bridge.solved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_final_solve_failure_is_solve_error() {
        let bridge = FakeBridge {
            fail_solve_at: Some(2),
            ..FakeBridge::with_file("Containerfile", PACKAGE)
        };
        let frontend = Frontend::new(FrontendConfig::default());
        let err = frontend
            .build(&bridge, &opts(Some("Containerfile")))
            .await
            .unwrap_err();
        assert!(matches!(err, BunnyError::Solve { .. }));
        assert!(err.to_string().contains("engine down"));
    }

    #[tokio::test]
    async fn test_serve_returns_result_once() {
        let bridge = FakeBridge::with_file("Containerfile", PACKAGE);
        let frontend = Frontend::new(FrontendConfig::default());
        frontend
            .serve(&bridge, &opts(Some("Containerfile")))
            .await
            .unwrap();

        let returned = bridge.returned.lock().unwrap();
        assert_eq!(returned.len(), 1);
        assert!(returned[0].error.is_none());
        assert_eq!(returned[0].result.as_ref().unwrap().reference(), Some("ref-2"));
    }

    #[tokio::test]
    async fn test_serve_reports_build_error() {
        let bridge = FakeBridge::default();
        let frontend = Frontend::new(FrontendConfig::default());
        let err = frontend.serve(&bridge, &opts(None)).await.unwrap_err();
        assert!(matches!(err, BunnyError::MissingOption(_)));

        let returned = bridge.returned.lock().unwrap();
        assert_eq!(returned.len(), 1);
        assert_eq!(
            returned[0].error.as_ref().unwrap().code,
            tonic::Code::FailedPrecondition as i32
        );
    }

    #[tokio::test]
    async fn test_serve_keeps_build_error_when_return_fails() {
        let bridge = FakeBridge {
            fail_return: true,
            ..FakeBridge::default()
        };
        let frontend = Frontend::new(FrontendConfig::default());
        let err = frontend.serve(&bridge, &opts(None)).await.unwrap_err();
        assert!(matches!(err, BunnyError::MissingOption(ref o) if o == "filename"));
    }

    #[tokio::test]
    async fn test_serve_surfaces_return_failure_after_success() {
        let bridge = FakeBridge {
            fail_return: true,
            ..FakeBridge::with_file("Containerfile", PACKAGE)
        };
        let frontend = Frontend::new(FrontendConfig::default());
        let err = frontend
            .serve(&bridge, &opts(Some("Containerfile")))
            .await
            .unwrap_err();
        assert!(matches!(err, BunnyError::Grpc(ref s) if s.code() == tonic::Code::Unavailable));
    }

    #[test]
    fn test_return_request_for_error() {
        let outcome: Result<BuildOutput> = Err(BunnyError::MissingOption("filename".to_string()));
        let request = return_request(&outcome);
        assert!(request.result.is_none());
        let error = request.error.unwrap();
        assert_eq!(error.code, tonic::Code::FailedPrecondition as i32);
        assert!(error.message.contains("filename"));
    }

    #[test]
    fn test_return_request_for_output() {
        let mut metadata = BTreeMap::new();
        metadata.insert("k".to_string(), b"v".to_vec());
        let outcome = Ok(BuildOutput {
            reference: "ref-9".to_string(),
            metadata,
        });
        let request = return_request(&outcome);
        assert!(request.error.is_none());
        let result = request.result.unwrap();
        assert_eq!(result.reference(), Some("ref-9"));
        assert_eq!(result.metadata["k"], b"v");
    }
}

//! CLI argument definitions and mode dispatch.

mod llb;
mod serve;

use std::path::PathBuf;

use bunny_core::{FrontendConfig, Platform};
use clap::{CommandFactory, Parser};

/// Bunny: unikernel packaging frontend for BuildKit.
///
/// Runs as a gateway frontend by default. With `--llb`, compiles a local
/// descriptor and writes the LLB definition to stdout for `buildctl`.
#[derive(Parser, Debug)]
#[command(name = "bunny", version, about)]
pub struct Cli {
    /// Path to the packaging descriptor (used with --llb)
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Print the LLB definition to stdout instead of serving the gateway
    #[arg(long)]
    pub llb: bool,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Target platform as os/arch[/variant] (e.g., "linux/arm64")
    #[arg(long)]
    pub platform: Option<String>,

    /// Name of the build context COPY sources are read from
    #[arg(long = "context-name")]
    pub context_name: Option<String>,
}

impl Cli {
    /// Load the configuration file, if any, and apply flag overrides.
    pub fn load_config(&self) -> bunny_core::Result<FrontendConfig> {
        let mut config = match &self.config {
            Some(path) => FrontendConfig::from_file(path)?,
            None => FrontendConfig::default(),
        };

        if let Some(ref platform) = self.platform {
            config.target_platform = platform.parse::<Platform>()?;
        }
        if let Some(ref name) = self.context_name {
            config.context_name = name.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Run the selected mode.
pub async fn dispatch(cli: Cli, config: FrontendConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.llb {
        return serve::execute(config).await;
    }

    match cli.file.as_deref().filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            llb::execute(path, &config, &mut out)?;
            Ok(())
        }
        None => {
            Cli::command().write_help(&mut std::io::stderr())?;
            Err(bunny_core::BunnyError::MissingPath(
                "a descriptor file is required with --llb (use -f <path>)".to_string(),
            )
            .into())
        }
    }
}

//! Gateway frontend mode.

use bunny_core::FrontendConfig;
use bunny_frontend::{Frontend, FrontendOpts, GrpcBridge};

pub async fn execute(config: FrontendConfig) -> Result<(), Box<dyn std::error::Error>> {
    let opts = FrontendOpts::from_env();

    let bridge = match config.gateway_socket {
        Some(ref socket) => GrpcBridge::connect_unix(socket).await?,
        None => GrpcBridge::connect_stdio().await?,
    };
    tracing::info!(
        session = opts.session_id.as_deref().unwrap_or("-"),
        options = opts.options.len(),
        "Connected to gateway"
    );

    Frontend::new(config).serve(&bridge, &opts).await?;
    tracing::info!("Build returned");
    Ok(())
}

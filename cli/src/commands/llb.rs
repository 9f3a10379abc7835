//! `bunny --llb`: compile a local descriptor and print the LLB definition.
//!
//! The output is the protobuf-encoded definition `buildctl build` reads
//! from stdin.

use std::io::Write;
use std::path::Path;

use bunny_core::error::Result;
use bunny_core::FrontendConfig;
use bunny_frontend::{compile, CompileOptions, Dockerfile, PackageDescriptor};
use prost::Message;

pub fn execute<W: Write>(path: &Path, config: &FrontendConfig, out: &mut W) -> Result<()> {
    let dockerfile = Dockerfile::from_file(path)?;
    let descriptor = PackageDescriptor::from_dockerfile(&dockerfile)?;
    tracing::info!(
        file = %path.display(),
        base = %descriptor.base,
        copies = descriptor.copies.len(),
        "Compiling descriptor"
    );

    let graph = compile(&descriptor, &CompileOptions::from(config))?;
    let definition = graph.marshal()?;

    out.write_all(&definition.encode_to_vec())?;
    out.flush()?;
    Ok(())
}

//! The `imgpipe remote` command: one operation on a server-side transform
//! endpoint.

use clap::Args;
use imgpipe_core::pipeline::{operation_label, prefixed_name, select};
use imgpipe_core::{
    Config, ExportSink, OutputFormat, RemoteTransform, RemoteTransformer, SourceCandidate,
};
use std::path::PathBuf;

/// Arguments for the `remote` command.
#[derive(Args, Debug)]
pub struct RemoteArgs {
    /// Operation name, posted to <endpoint>/<operation>
    pub operation: String,

    /// Image file to send
    pub file: PathBuf,

    /// Operation parameter as KEY=VALUE (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Endpoint base URL (defaults to [remote] endpoint)
    #[arg(short, long, env = "IMGPIPE_REMOTE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Directory for the result (defaults to [export] output_dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

/// Execute the remote command.
pub async fn execute(args: RemoteArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(endpoint) = args.endpoint {
        config.remote.endpoint = Some(endpoint);
    }
    if let Some(dir) = args.output_dir {
        config.export.output_dir = dir;
    }

    let candidate = SourceCandidate::from_path(&args.file)?;
    let Some(candidate) = select(vec![candidate]).accepted.pop() else {
        anyhow::bail!("{:?} is not an image file", args.file);
    };

    let remote = RemoteTransformer::from_config(&config.remote)?;
    tracing::info!("Sending {} to {}", candidate.name, remote.url(&args.operation));
    let response = remote
        .transform(&args.operation, &candidate, &args.params)
        .await?;
    let blob = response.into_blob()?;

    let name = export_name(&args.operation, &candidate.name, blob.format);
    let path = ExportSink::from_config(&config)
        .export_single(&blob, &name)
        .await?;
    println!("{}", path.display());
    Ok(())
}

/// `<label>_<stem>.<ext>`, using the past-tense label for known operations.
fn export_name(operation: &str, source_name: &str, format: OutputFormat) -> String {
    let label = operation_label(operation).unwrap_or(operation);
    prefixed_name(label, source_name, format)
}

/// Parse `KEY=VALUE`. The value may itself contain `=`.
fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use medilab_artifact::{decode_archival, to_archival, to_data_uri, DirectoryTarget};
use medilab_session::{Credential, SessionGate};
use medilab_workflow::{
    DownloadOutcome, EventOutcome, HttpBackend, ImageFile, WorkflowConfig, WorkflowController,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "medilab", version)]
#[command(about = "Upload X-ray images, run the AI diagnosis and fetch report history")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Path to config TOML. If omitted, uses ./medilab.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bearer credential sent as the Authorization header
    #[arg(long, env = "MEDILAB_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an image, wait for the diagnosis and save the report
    Diagnose {
        #[arg(long)]
        image: PathBuf,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// List previous reports
    History {
        /// Save the report of the record at this index
        #[arg(long)]
        download: Option<usize>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Decode an archival (base64) report into its binary form
    Decode {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "diagnosis.pdf")]
        output: PathBuf,
    },
    /// Encode a binary report into its archival form
    Encode {
        #[arg(long)]
        input: PathBuf,
        /// Prefix with a `data:` URI header
        #[arg(long)]
        data_uri: bool,
    },
    /// Print the claims of the credential
    InspectToken,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json)?;
    tracing::debug!(command = ?args.cmd, "dispatching");

    match &args.cmd {
        Command::Diagnose { image, out } => {
            let config = load_config(args.config.as_deref())?;
            diagnose(config, credential(&args)?, image, out).await
        }
        Command::History { download, out } => {
            let config = load_config(args.config.as_deref())?;
            history(config, credential(&args)?, *download, out).await
        }
        Command::Decode { input, output } => decode(input, output),
        Command::Encode { input, data_uri } => encode(input, *data_uri),
        Command::InspectToken => inspect_token(&credential(&args)?),
    }
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))
}

fn load_config(path: Option<&Path>) -> Result<WorkflowConfig> {
    let config = match path {
        Some(path) => WorkflowConfig::load(path)
            .with_context(|| format!("load config: {}", path.display()))?,
        None if Path::new("medilab.toml").exists() => WorkflowConfig::load("medilab.toml")
            .context("load config: medilab.toml")?,
        None => WorkflowConfig::new(),
    };
    let config = config.apply_env().context("apply environment overrides")?;
    config.validate()?;
    Ok(config)
}

fn credential(args: &Args) -> Result<Credential> {
    match args.token.as_deref() {
        Some(token) if !token.trim().is_empty() => Ok(Credential::new(token.trim())),
        _ => bail!("no credential: pass --token or set MEDILAB_TOKEN"),
    }
}

async fn diagnose(
    config: WorkflowConfig,
    credential: Credential,
    image: &Path,
    out: &Path,
) -> Result<()> {
    let backend = HttpBackend::new(&config)?;
    let mut controller = WorkflowController::new(backend, config);

    tracing::info!(image = %image.display(), out = %out.display(), "starting diagnosis run");
    let image = ImageFile::load(image)
        .await
        .with_context(|| format!("read image: {}", image.display()))?;
    controller.select_image(image)?;

    let locator = controller.upload(&credential).await?;
    println!("Uploaded: {locator}");

    controller.begin_scan(&credential)?;
    println!("Scanning...");
    while let Some(outcome) = controller.process_next().await {
        match outcome {
            EventOutcome::IndicatorCleared => println!("Still waiting for the analysis service..."),
            EventOutcome::ReportCaptured | EventOutcome::ScanFailed => break,
            EventOutcome::Discarded => {}
        }
    }

    let report = controller.wait_for_report().await?;
    println!("Report received: {} bytes ({})", report.len(), report.hash().short());

    let saved = controller.download_report(&DirectoryTarget::new(out))?;
    println!("Saved {}", saved.location.display());
    Ok(())
}

async fn history(
    config: WorkflowConfig,
    credential: Credential,
    download: Option<usize>,
    out: &Path,
) -> Result<()> {
    if !SessionGate::new().is_usable(&credential) {
        bail!("credential is malformed or expired");
    }

    let backend = HttpBackend::new(&config)?;
    let controller = WorkflowController::new(backend, config);
    let view = controller.fetch_history(&credential).await;

    if let Some(message) = &view.message {
        eprintln!("{message}");
    }
    if view.is_empty() {
        println!("No diagnoses found.");
        return Ok(());
    }

    for (index, record) in view.records.iter().enumerate() {
        let date = record
            .captured_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .or_else(|| record.date_raw.clone())
            .unwrap_or_else(|| "-".to_string());
        let image = record.image.as_ref().map_or("-", |i| i.as_str());
        let status = if record.is_decodable() { "report" } else { "no data" };
        println!("{index:>3}  {date:<16}  {status:<7}  {image}");
    }

    let Some(index) = download else {
        return Ok(());
    };
    let record = view
        .records
        .get(index)
        .ok_or_else(|| anyhow!("no record at index {index} ({} records)", view.len()))?;

    match controller.download_history_record(record, &DirectoryTarget::new(out)) {
        DownloadOutcome::Saved(saved) => println!("Saved {}", saved.location.display()),
        DownloadOutcome::NoData => println!("No PDF data available for this record."),
        DownloadOutcome::Failed(message) => bail!(message),
    }
    Ok(())
}

fn decode(input: &Path, output: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("read archival report: {}", input.display()))?;
    let bytes = decode_archival(text.trim())?;
    std::fs::write(output, &bytes).with_context(|| format!("write {}", output.display()))?;
    println!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn encode(input: &Path, data_uri: bool) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let encoded = if data_uri {
        to_data_uri(&bytes, medilab_artifact::PDF_MIME)
    } else {
        to_archival(&bytes)
    };
    println!("{encoded}");
    Ok(())
}

fn inspect_token(credential: &Credential) -> Result<()> {
    let gate = SessionGate::new();
    let decoded = gate.decode(credential)?;
    let claims = &decoded.claims;

    let summary = serde_json::json!({
        "subject": claims.subject,
        "issued_at": claims.issued_at.map(|t| t.to_rfc3339()),
        "expires_at": claims.expires_at.map(|t| t.to_rfc3339()),
        "expired": decoded.is_expired,
        "usable": gate.is_usable(credential),
        "extra": claims.extra,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

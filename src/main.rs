//! PLF Uploadr - upload a PLF firmware to a device
//!
//! Runs one upload through the native ARUpdater engine and reports how it
//! ended. Ctrl-C cancels the transfer.

use clap::Parser;
use plf_uploadr::{config::Config, metrics, telemetry, UploadOutcome};
use std::path::PathBuf;
use tracing::info;

/// PLF Uploadr - firmware upload over the ARUpdater engine
#[derive(Parser, Debug)]
#[command(name = "plf-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "uploader.yaml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print Prometheus metrics when the upload ends
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
        config.validate()?;
    }

    telemetry::init_subscriber(&config.logging)?;

    info!("Starting PLF Uploadr v{}", plf_uploadr::VERSION);
    info!("Loaded configuration from {:?}", args.config);

    let outcome = upload(&config).await?;

    if args.print_metrics || config.metrics.enabled {
        print!("{}", metrics::gather_text());
    }

    if !outcome.is_success() {
        anyhow::bail!("{}", outcome);
    }

    info!("{}", outcome);
    Ok(())
}

#[cfg(feature = "native")]
async fn upload(config: &Config) -> anyhow::Result<UploadOutcome> {
    use parking_lot::Mutex;
    use plf_uploadr::engine::native::{FtpTransport, Md5Verifier, NativeEngine};
    use plf_uploadr::{Uploader, UploaderListeners};
    use std::sync::Arc;
    use tokio::sync::oneshot;
    use tracing::warn;

    let transport = FtpTransport::connect(
        &config.transport.address,
        config.transport.port,
        &config.transport.username,
        &config.transport.password,
    )?;
    let md5 = Md5Verifier::new()?;

    let uploader = Uploader::with_engine(Arc::new(NativeEngine::new()))?;

    let (tx, mut rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let listeners = UploaderListeners::new()
        .on_progress(None, |_, percent| info!(percent, "Upload progress"))
        .on_completion(None, move |_, outcome| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(outcome);
            }
        });

    uploader.create(
        &config.uploader.root_folder,
        transport.context(),
        md5.context(),
        config.uploader.product,
        listeners,
    )?;

    let task = uploader
        .runnable()
        .ok_or_else(|| anyhow::anyhow!("uploader is not initialized"))?;
    let mut run = tokio::spawn(task.run_blocking());

    let result = tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, canceling upload");
            let code = uploader.cancel();
            if !code.is_ok() {
                warn!(code = %code, "Cancel request rejected");
            }
            run.await?
        }
    };
    result?;

    let outcome = rx
        .try_recv()
        .map_err(|_| anyhow::anyhow!("engine returned without reporting completion"))?;

    uploader.dispose().into_result()?;

    Ok(outcome)
}

#[cfg(not(feature = "native"))]
async fn upload(_config: &Config) -> anyhow::Result<UploadOutcome> {
    anyhow::bail!(
        "plf-uploadr was built without the native engine; rebuild with `--features native`"
    )
}

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use vdms::config::{CliArgs, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).unwrap();
    fmt().with_env_filter(filter).init();

    let args = CliArgs::parse(std::env::args().skip(1));
    let config_path = if let Some(archive) = &args.restore_archive {
        warn!(archive = %archive.display(), "archive restore is not supported in this build; using its derived config path without extracting");
        Some(archive.with_extension("json"))
    } else {
        args.config_path.clone()
    };

    let config = Config::load(config_path.as_deref())?;
    config.validate()?;
    info!(port = config.port, db_root = %config.db_root_path.display(), "vdms starting");

    vdms::server::run(config).await
}

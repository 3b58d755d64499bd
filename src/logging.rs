use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `TRIPMAP_LOG` nor `RUST_LOG` is set. HTTP client
/// internals stay quiet so per-item progress remains readable.
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn";

fn build_filter() -> anyhow::Result<EnvFilter> {
    for var in ["TRIPMAP_LOG", EnvFilter::DEFAULT_ENV] {
        if let Ok(directives) = std::env::var(var)
            && !directives.trim().is_empty()
        {
            return EnvFilter::try_new(&directives)
                .with_context(|| format!("parse log filter from {var}: {directives}"));
        }
    }
    EnvFilter::try_new(DEFAULT_FILTER).context("build default log filter")
}

/// Installs the stderr subscriber. Stdout is reserved for command output
/// such as validation reports.
pub fn init() -> anyhow::Result<()> {
    let filter = build_filter()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

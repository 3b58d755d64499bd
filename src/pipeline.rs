use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::{
    FetchArgs, GeocodeArgs, LocateArgs, PublishArgs, RunArgs, TranscriptsArgs, ValidateArgs,
};

/// Artifact paths inside a run workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub raw: PathBuf,
    pub supplementary: PathBuf,
    pub located: PathBuf,
    pub geocoded: PathBuf,
    pub published: PathBuf,
}

impl Workspace {
    pub fn new(dir: &Path) -> Self {
        Self {
            raw: dir.join("raw.json"),
            supplementary: dir.join("supplementary.json"),
            located: dir.join("located.json"),
            geocoded: dir.join("geocoded.json"),
            published: dir.join("published.json"),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Runs every stage in order. Artifacts left by an earlier run in the same
/// workspace act as caches.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let workspace_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&workspace_dir)
        .with_context(|| format!("create workspace dir: {}", workspace_dir.display()))?;
    let workspace = Workspace::new(&workspace_dir);

    tracing::info!(out = %workspace_dir.display(), "run: fetch");
    crate::catalog::run(FetchArgs {
        config: args.config.clone(),
        out: path_arg(&workspace.raw),
        youtube: args.youtube.clone(),
    })
    .await
    .context("fetch")?;

    tracing::info!("run: transcripts");
    crate::transcript::run(TranscriptsArgs {
        items: path_arg(&workspace.raw),
        cache: path_arg(&workspace.supplementary),
        source: args.transcripts.clone(),
    })
    .await
    .context("transcripts")?;

    tracing::info!("run: locate");
    crate::locate::run(LocateArgs {
        items: path_arg(&workspace.raw),
        supplementary: path_arg(&workspace.supplementary),
        out: path_arg(&workspace.located),
        oracle: args.oracle.clone(),
    })
    .await
    .context("locate")?;

    tracing::info!("run: geocode");
    crate::geocode::run(GeocodeArgs {
        items: path_arg(&workspace.located),
        out: path_arg(&workspace.geocoded),
        geocoder: args.geocoder.clone(),
    })
    .await
    .context("geocode")?;

    tracing::info!("run: publish");
    crate::publish::run(PublishArgs {
        items: path_arg(&workspace.geocoded),
        config: args.config.clone(),
        out: path_arg(&workspace.published),
        web_out: args.web_out.clone(),
        youtube: args.youtube.clone(),
    })
    .await
    .context("publish")?;

    tracing::info!("run: validate");
    crate::validate::run(ValidateArgs {
        input: path_arg(&workspace.published),
        config: args.config.clone(),
    })
    .context("validate")?;

    Ok(())
}

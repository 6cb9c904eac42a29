use anyhow::{Context, Result};
use clap::Parser;
use folio::build::build_site;
use folio::config::{Config, CssMode, Mode};
use folio::math::Tex2Svg;
use folio::vcs::GitLog;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the published site; overrides `base_url` in folio.yaml
    base_url: Option<String>,

    /// Copy css/ verbatim instead of compiling a hashed stylesheet
    #[arg(long)]
    no_css: bool,

    /// Project directory (folio.yaml is searched for here and in its parents)
    #[arg(long, default_value = ".")]
    project: PathBuf,

    /// Output directory (defaults to public/ in the project); must not exist
    #[arg(long)]
    output: Option<PathBuf>,

    /// Build environment; `development` enables dev-only markup
    #[arg(long, env = "FOLIO_ENV")]
    env: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let project = std::fs::canonicalize(&cli.project)
        .with_context(|| format!("Resolving project directory `{}`", cli.project.display()))?;
    let mut config = Config::from_directory(&project)?;
    config.mode = Mode::from_env_value(cli.env.as_deref());
    if cli.no_css {
        config.css = CssMode::Static;
    }
    if let Some(output) = cli.output {
        config.output_directory = output;
    }
    let base_url = config.resolve_base_url(cli.base_url)?;

    let math = Tex2Svg {
        program: config.math_program.clone(),
    };
    let git = GitLog {
        repository: config.project_root.clone(),
    };
    build_site(&config, &base_url, math, &git)
        .await
        .with_context(|| format!("Building `{}`", config.project_root.display()))?;
    Ok(())
}

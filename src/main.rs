use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use subcheck::{
    config::{Settings, DEFAULT_CONFIG_TEMPLATE},
    pipeline::Pipeline,
    proxy::{FetcherConfig, RegexResolver, SubscriptionFetcher},
    publish::FilePublisher,
};

/// Check subscription proxies and publish the alive ones under normalized names
#[derive(Parser)]
#[command(name = "subcheck")]
#[command(about = "Check subscription proxies and publish the alive ones")]
struct Cli {
    /// Config file path [default: config/config.yaml next to the executable]
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Rename rules file [default: rename.yaml next to the config file]
    #[arg(short, long)]
    rename: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let rename_path = cli.rename.unwrap_or_else(|| {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("rename.yaml")
    });

    if !config_path.exists() {
        write_template(&config_path)?;
        info!(
            "config file created at {:?}, fill in sub-urls and start again",
            config_path
        );
        return Ok(());
    }

    let mut settings = Arc::new(
        Settings::load(&config_path)
            .with_context(|| format!("invalid config file {:?}", config_path))?,
    );
    info!(
        "loaded {:?}: {} subscriptions, concurrency {}, rename method {}",
        config_path,
        settings.sub_urls.len(),
        settings.check.concurrent,
        settings.rename.method
    );

    let mut regex = RegexResolver::from_path(&rename_path)
        .await
        .with_context(|| format!("invalid rename file {:?}", rename_path))?;
    info!("loaded {} rename rules", regex.len());

    loop {
        match run_cycle(Arc::clone(&settings), regex.clone()).await {
            Ok(count) => info!("cycle finished, {} proxies published", count),
            Err(e) => warn!("cycle failed: {:#}", e),
        }

        if cli.once {
            return Ok(());
        }

        let next = chrono::Local::now() + chrono::Duration::minutes(settings.check.interval as i64);
        info!("next check at {}", next.format("%Y-%m-%d %H:%M:%S"));
        tokio::time::sleep(settings.interval()).await;

        settings = settings.reload(&config_path);
        regex = regex.reload(&rename_path).await;
    }
}

async fn run_cycle(settings: Arc<Settings>, regex: RegexResolver) -> Result<usize> {
    let fetcher =
        SubscriptionFetcher::with_config(FetcherConfig::new().with_proxy(settings.proxy.clone()))?;
    let publisher = FilePublisher::new(settings.save.output_path.clone());
    let pipeline = Pipeline::from_settings(settings, regex);

    pipeline.run_cycle(&fetcher, &publisher).await
}

fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join("config").join("config.yaml"))
}

fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("cannot write config template to {:?}", path))?;
    Ok(())
}

use std::{io, path::PathBuf, sync::Arc, thread};

use anyhow::Context;
use auto_pick::{
    Capturer, Catalog, Config, MatchCycle, Selection, StopToken, TemplateStore,
    console::run_console,
    controller::{CaptureError, DesktopController},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing_subscriber() -> anyhow::Result<()> {
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive("INFO".parse()?)
                .from_env()?,
        )
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing_subscriber()?;

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config =
        Config::load_or_default(config_path.as_deref()).context("failed to load config")?;
    let catalog = Catalog::load(&config.catalog, &config.resource_root)
        .with_context(|| format!("failed to load catalog {}", config.catalog.display()))?;
    info!(
        "loaded {} labels from {}",
        catalog.labels().len(),
        config.catalog.display()
    );

    let controller = DesktopController::new().context("failed to create input controller")?;
    if let Err(err @ CaptureError::Unavailable) = controller.capture(config.roi) {
        return Err(err.into());
    }

    let store = Arc::new(TemplateStore::new());
    let stop = StopToken::new();

    let mut selection = Selection::new(catalog, store.clone());
    let console_stop = stop.clone();
    let console = thread::spawn(move || {
        run_console(io::stdin().lock(), &mut selection, &console_stop);
    });

    MatchCycle::new(&controller, &controller, store, config.cycle_options()?).run(&stop);

    console
        .join()
        .map_err(|_| anyhow::anyhow!("selection console panicked"))?;
    Ok(())
}

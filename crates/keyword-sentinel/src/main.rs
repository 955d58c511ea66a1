mod bootstrap;

use std::sync::Arc;

use anyhow::Result;
use sentinel_core::settings::Settings;
use sentinel_data::archive::ArchiveTransport;
use sentinel_data::outbox::OutboxNotifier;
use sentinel_data::persistence::JsonFilePersistence;
use sentinel_data::store::SourceStore;
use sentinel_runtime::backfill::BackfillProcessor;
use sentinel_runtime::context::WatchContext;
use sentinel_runtime::live_monitor::LiveMonitor;
use sentinel_runtime::scheduler::BackfillScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("Keyword Sentinel v{} starting", env!("CARGO_PKG_VERSION"));

    let data_file = settings.data_file();
    let archive_dir = settings.archive_dir();
    let outbox = settings.outbox();
    tracing::info!(
        data_file = %data_file.display(),
        archive = %archive_dir.display(),
        outbox = %outbox.display(),
        "paths resolved"
    );

    let store = Arc::new(SourceStore::open(
        JsonFilePersistence::new(data_file),
        settings.primary_operator,
    )?);
    let transport = Arc::new(ArchiveTransport::new(archive_dir, settings.poll_interval()));
    let archived = transport.archived_sources();
    let unregistered = archived.iter().filter(|&&id| store.source(id).is_none()).count();
    if unregistered > 0 {
        tracing::info!(count = unregistered, "archived sources not registered; ignored");
    }
    let notifier = Arc::new(OutboxNotifier::new(outbox));
    let ctx = WatchContext::new(store.clone(), transport, notifier);

    let processor = BackfillProcessor::new(ctx.clone(), settings.backfill_config());
    let scheduler = BackfillScheduler::new(processor, settings.max_concurrent_backfills as usize);
    let monitor = LiveMonitor::new(ctx);

    let run_state = store.run_state();
    tracing::info!(
        sources = store.source_ids().len(),
        keywords = store.keywords().len(),
        running = run_state.is_running,
        notifications = run_state.notifications_enabled,
        "store loaded"
    );

    monitor.subscribe().await?;

    if settings.backfill_pending {
        let pending: Vec<_> = store
            .source_ids()
            .into_iter()
            .filter(|&id| !store.is_backfilled(id))
            .collect();
        tracing::info!(count = pending.len(), "launching pending backfills");
        scheduler.launch_many(&pending, store.operators().primary());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received; shutting down");

    monitor.stop();
    scheduler.cancel_all();

    Ok(())
}

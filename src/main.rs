use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use ec2_fleetctl::cache::SnapshotCache;
use ec2_fleetctl::config::{BUILD_DATE, COMMIT, Command, Config, InstanceArgs, VERSION};
use ec2_fleetctl::engine::{FleetEngine, RefreshTrigger};
use ec2_fleetctl::events::EventLevel;
use ec2_fleetctl::fleet::ScanProgress;
use ec2_fleetctl::logging;
use ec2_fleetctl::model::InstanceRecord;
use ec2_fleetctl::output;
use ec2_fleetctl::reconciler::RebootOutcome;
use ec2_fleetctl::server::StatusServer;
use ec2_fleetctl::session::Session;
use ec2_fleetctl::settings::SettingsStore;
use ec2_fleetctl::view::FleetQuery;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();
    logging::init(&config.log_format, &config.log_level);

    info!(
        version = VERSION,
        commit = COMMIT,
        build_date = BUILD_DATE,
        "ec2-fleetctl starting"
    );

    let state_dir = config.state_dir();

    // Commands that only touch local state run without AWS credentials.
    match &config.command {
        Command::Pin { instance_id } => return set_pinned(&state_dir, instance_id, true),
        Command::Unpin { instance_id } => return set_pinned(&state_dir, instance_id, false),
        Command::List {
            region,
            sort,
            desc,
            cached: true,
        } => {
            let snapshot = SnapshotCache::new(&state_dir).load();
            let query = FleetQuery {
                region: region.clone(),
                sort: *sort,
                descending: *desc,
            };
            print_inventory(&state_dir, &snapshot.instances, &query);
            return Ok(());
        }
        _ => {}
    }

    let session = match Session::load(config.profile.as_deref(), config.home_region.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to resolve AWS credentials");
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    config.display(session.home_region());
    let engine_config = config.engine_config(session.home_region());
    let engine = Arc::new(FleetEngine::connect(session, engine_config));

    match config.command {
        Command::List {
            region, sort, desc, ..
        } => {
            let query = FleetQuery {
                region,
                sort,
                descending: desc,
            };
            list(&engine, &state_dir, &query).await
        }
        Command::Start(target) => {
            let region = resolve_region(&engine, &target)?;
            engine.start(&target.instance_id, &region).await?;
            println!("Start accepted for {} ({})", target.instance_id, region);
            Ok(())
        }
        Command::Stop(target) => {
            let region = resolve_region(&engine, &target)?;
            engine.stop(&target.instance_id, &region).await?;
            println!("Stop accepted for {} ({})", target.instance_id, region);
            Ok(())
        }
        Command::Reboot { target, no_wait } => reboot(&engine, &target, no_wait).await,
        Command::Status(target) => {
            let region = resolve_region(&engine, &target)?;
            let checks = engine.status_checks(&target.instance_id, &region).await?;
            println!("{}", output::render_status_checks(&target.instance_id, &checks));
            Ok(())
        }
        Command::Regions => {
            for region in engine.regions().await {
                println!("{}", region);
            }
            Ok(())
        }
        Command::Serve {
            port,
            auto_refresh_interval_seconds,
        } => serve(engine, port, auto_refresh_interval_seconds).await,
        Command::Pin { .. } | Command::Unpin { .. } => Ok(()),
    }
}

async fn list(engine: &FleetEngine, state_dir: &Path, query: &FleetQuery) -> Result<()> {
    let report_progress = |progress: ScanProgress<'_>| {
        eprint!(
            "\rScanning regions {}/{} ({})          ",
            progress.completed, progress.total, progress.region
        );
    };

    engine
        .refresh_with_progress(RefreshTrigger::Manual, Some(&report_progress))
        .await;
    eprintln!();

    print_inventory(state_dir, &engine.snapshot().instances, query);
    Ok(())
}

async fn reboot(engine: &FleetEngine, target: &InstanceArgs, no_wait: bool) -> Result<()> {
    let region = resolve_region(engine, target)?;
    let instance_id = target.instance_id.as_str();

    let mut events = engine.subscribe();
    let watch = engine.reboot(instance_id, &region).await?;
    println!("Reboot accepted for {} ({})", instance_id, region);

    if no_wait {
        return Ok(());
    }

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if matches!(event.level, EventLevel::Info | EventLevel::Warning) => {
                    println!("[{}] {}", event.level, event.message);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = watch.await.context("reboot watch task failed")?;
    printer.abort();

    match outcome {
        RebootOutcome::Completed => println!("Reboot of {} completed, status checks passing", instance_id),
        RebootOutcome::TimedOut => println!(
            "Reboot of {} not confirmed healthy in time, run `status` to check again",
            instance_id
        ),
        RebootOutcome::Superseded => println!("Reboot watch for {} was superseded", instance_id),
    }
    Ok(())
}

async fn serve(engine: Arc<FleetEngine>, port: u16, auto_refresh_interval_seconds: u64) -> Result<()> {
    let start_time = std::time::Instant::now();
    engine.load_cached();

    let server = StatusServer::new(Arc::clone(&engine));
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut server_task = tokio::spawn(server.serve(port, tx));

    tokio::select! {
        _ = rx => {}
        result = &mut server_task => {
            return match result {
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Ok(()),
                Err(e) => Err(e).context("status server task failed"),
            };
        }
    }

    info!(
        startup_time_ms = start_time.elapsed().as_millis(),
        "Status server initialization complete"
    );

    engine.refresh(RefreshTrigger::Startup).await;

    let auto_refresh = (auto_refresh_interval_seconds > 0).then(|| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .run_auto_refresh(Duration::from_secs(auto_refresh_interval_seconds))
                .await
        })
    });

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Err(e)) => error!(error = %e, "Status server failed"),
                Err(e) => error!(error = %e, "Status server task panicked"),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT/SIGTERM, initiating graceful shutdown");
        }
    }

    if let Some(task) = auto_refresh {
        task.abort();
    }
    info!(
        active_watches = engine.active_watches().len(),
        "Shutdown complete"
    );
    Ok(())
}

/// Uses `--region` when given, otherwise the region recorded in the cached inventory.
fn resolve_region(engine: &FleetEngine, target: &InstanceArgs) -> Result<String> {
    if let Some(region) = &target.region {
        return Ok(region.clone());
    }

    engine.load_cached();
    match engine.snapshot().get(&target.instance_id) {
        Some(instance) => Ok(instance.region.clone()),
        None => bail!(
            "region of {} is unknown, pass --region or run `list` first",
            target.instance_id
        ),
    }
}

fn print_inventory(state_dir: &Path, instances: &[InstanceRecord], query: &FleetQuery) {
    let pinned = SettingsStore::new(state_dir).load().pinned_instances;
    let rows = query.apply(instances, &pinned);
    println!("{}", output::render_instances(&rows, &pinned));
}

fn set_pinned(state_dir: &Path, instance_id: &str, pin: bool) -> Result<()> {
    let store = SettingsStore::new(state_dir);
    let mut settings = store.load();

    if settings.is_pinned(instance_id) == pin {
        println!(
            "{} is already {}",
            instance_id,
            if pin { "pinned" } else { "unpinned" }
        );
        return Ok(());
    }

    settings.toggle_pin(instance_id);
    if !store.save(&settings) {
        bail!("failed to save settings in {}", state_dir.display());
    }

    println!("{} {}", if pin { "Pinned" } else { "Unpinned" }, instance_id);
    Ok(())
}

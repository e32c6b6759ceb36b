use clap::Parser;
use hab_data_api::adapters::{GridDataClient, InfluxClient};
use hab_data_api::config::{self, toml_config::TariffFile};
use hab_data_api::core::{belpex, DailySchedule, Scheduler, TariffBook};
use hab_data_api::utils::{logger, validation::Validate};
use hab_data_api::{router, AppConfig, AppState, BelpexService, CliArgs, InfluxService, PriceService, TtlCache};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let env_loaded = config::load_env_file(&args.env_file);

    logger::init_logger(args.verbose, args.json_logs);

    match env_loaded {
        Ok(true) => tracing::info!(path = %args.env_file.display(), "environment file loaded"),
        Ok(false) => tracing::debug!(path = %args.env_file.display(), "no environment file"),
        Err(e) => {
            tracing::error!("❌ {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }

    let config = match AppConfig::from_env().and_then(|mut config| {
        config.apply_cli(&args);
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration error: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "configuration");

    let tariffs = match load_tariffs(&config) {
        Ok(tariffs) => tariffs,
        Err(e) => {
            tracing::error!("❌ Tariff file error: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(years = ?tariffs.years(), "tariffs loaded");

    let cache = Arc::new(TtlCache::new());
    let store = Arc::new(InfluxClient::new(&config.influx));
    let influx = Arc::new(InfluxService::new(store, cache.clone()));
    let price = Arc::new(PriceService::new(influx.clone(), tariffs));

    let mut scheduler = Scheduler::new();
    if args.no_scheduler {
        tracing::info!("scheduled jobs disabled");
    } else {
        let cache = cache.clone();
        scheduler.add_job("clear_cache", DailySchedule::at(15, 0), move || {
            let cache = cache.clone();
            async move {
                cache.clear();
                Ok(())
            }
        });

        let belpex = Arc::new(BelpexService::new(
            influx.clone(),
            Arc::new(GridDataClient::new(&config.griddata_url)),
        ));
        scheduler.add_job("update_grid_prices", belpex::update_schedule(), move || {
            let belpex = belpex.clone();
            async move { belpex.update().await.map(|_| ()) }
        });
    }

    let app = router(AppState { influx, price }, config.auth.clone());

    let address = match config.server.socket_addr() {
        Ok(address) => address,
        Err(e) => {
            tracing::error!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%address, error = %e, "cannot bind");
            std::process::exit(1);
        }
    };
    tracing::info!("🚀 hab-data-api listening on http://{}", address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        scheduler.shutdown();
        std::process::exit(1);
    }

    scheduler.shutdown();
    tracing::info!("shutdown complete");
}

fn load_tariffs(config: &AppConfig) -> hab_data_api::Result<TariffBook> {
    let Some(path) = &config.tariff_file else {
        return Ok(TariffBook::builtin());
    };

    tracing::info!(path = %path.display(), "loading tariff file");
    let file = TariffFile::from_file(path)?;
    file.validate()?;
    Ok(file.into_book())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

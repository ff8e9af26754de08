//! Burncast - agricultural burn coordination service
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP service
//! DATABASE_URL=postgres://... WEATHER_API_BASE_URL=https://api.open-meteo.com \
//! burncast serve
//!
//! # Seed demo data around a center point
//! burncast seed --farms 5 --requests 12 --seed 7
//!
//! # One optimization run for a date
//! burncast optimize --date 2026-08-04
//!
//! # Probe the configured dependencies
//! burncast health-check
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: PostgreSQL DSN (required for serve/optimize/seed)
//! - `WEATHER_API_BASE_URL`: weather provider base URL (required for serve)
//! - `WEATHER_API_KEY`, `EMBEDDING_API_URL`, `EMBEDDING_API_KEY`,
//!   `SMS_GATEWAY_URL`, `SMS_GATEWAY_TOKEN`: optional providers
//! - `BURNCAST_CONFIG`: path to a TOML config file
//! - `RUST_LOG`: logging filter (default: info)
//!
//! Exit codes: 0 success, 1 configuration error, 2 runtime failure.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{error, info, warn};

use burncast::alerts::channels::{
    HttpSmsGateway, LogEmailGateway, LogSmsGateway, SmsGateway,
};
use burncast::alerts::AlertService;
use burncast::api::{app_router, ApiState};
use burncast::config::{self, AppConfig};
use burncast::coordinator::{Coordinator, SubmitBurnRequest};
use burncast::embedding::{EmbeddingProvider, HttpEmbeddingProvider, NullEmbeddingProvider};
use burncast::optimizer::Optimizer;
use burncast::pipeline::Pipeline;
use burncast::predictor::Predictor;
use burncast::store::{spatial, MemStore, PgStore, Store};
use burncast::types::{epoch_micros, CropType, Farm, GeoPoint};
use burncast::weather::{HttpWeatherProvider, WeatherService};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "burncast")]
#[command(about = "Agricultural burn coordination service")]
#[command(version)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service with the periodic optimization loop
    Serve {
        /// Override the server address (default from config, "0.0.0.0:8080")
        #[arg(short, long)]
        addr: Option<String>,
        /// Planning horizon in days for periodic cycles
        #[arg(long, default_value = "3")]
        horizon: i64,
    },
    /// Populate the database with demo farms, fields and requests
    Seed {
        #[arg(long, default_value = "5")]
        farms: u32,
        #[arg(long, default_value = "12")]
        requests: u32,
        /// RNG seed for reproducible data
        #[arg(long, default_value = "7")]
        seed: u64,
        /// Center latitude/longitude for generated farms
        #[arg(long, default_value = "38.58")]
        lat: f64,
        #[arg(long, default_value = "-121.49")]
        lon: f64,
        /// Generate against an in-memory store and print a summary only
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one optimization cycle covering the given date
    Optimize {
        /// Target date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
    /// Probe configured dependencies and exit
    HealthCheck,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    init_tracing();
    let args = CliArgs::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::from(2);
        }
    };

    // Config problems exit 1; runtime failures exit 2.
    let (app_config, provenance) = match load_config(&args.command) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(1);
        }
    };
    info!(source = %provenance, "configuration loaded");
    config::init(app_config);

    let result = runtime.block_on(async {
        match args.command {
            Command::Serve { addr, horizon } => serve(addr, horizon).await,
            Command::Seed {
                farms,
                requests,
                seed,
                lat,
                lon,
                dry_run,
            } => seed_data(farms, requests, seed, GeoPoint::new(lat, lon), dry_run).await,
            Command::Optimize { date } => optimize_once(date).await,
            Command::HealthCheck => health_check().await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "runtime failure");
            ExitCode::from(2)
        }
    }
}

fn load_config(command: &Command) -> Result<(AppConfig, config::ConfigProvenance)> {
    // .env is a convenience for local runs; absence is fine.
    let _ = dotenvy::dotenv();
    let (app_config, provenance) = AppConfig::load()?;

    let warnings = config::validate(&app_config).map_err(|e| anyhow::anyhow!(e))?;
    for w in &warnings {
        warn!(%w, "config warning");
    }

    // Seed --dry-run and health-check tolerate missing env; serve and
    // optimize do not.
    let needs_all = matches!(command, Command::Serve { .. } | Command::Optimize { .. });
    let needs_db = matches!(command, Command::Seed { dry_run: false, .. });
    let missing = app_config.missing_required();
    if needs_all && !missing.is_empty() {
        anyhow::bail!(
            "missing required environment variables: {}",
            missing.join(", ")
        );
    }
    if needs_db && app_config.database.url.is_empty() {
        anyhow::bail!("missing required environment variable: DATABASE_URL");
    }

    Ok((app_config, provenance))
}

// ============================================================================
// Component assembly
// ============================================================================

async fn connect_store() -> Result<Arc<PgStore>> {
    let cfg = config::get();
    let store = PgStore::connect(
        &cfg.database.url,
        cfg.database.max_connections,
        Duration::from_secs(cfg.database.acquire_timeout_secs),
    )
    .await
    .context("connecting to PostgreSQL")?;
    store.run_migrations().await.context("running migrations")?;
    Ok(Arc::new(store))
}

fn build_pipeline(store: Arc<dyn Store>) -> Result<Arc<Pipeline>> {
    let cfg = config::get();

    let embedding: Arc<dyn EmbeddingProvider> = match &cfg.embedding.api_url {
        Some(url) => Arc::new(
            HttpEmbeddingProvider::new(url.clone(), cfg.embedding.api_key.clone())
                .map_err(|e| anyhow::anyhow!("{e}"))?,
        ),
        None => Arc::new(NullEmbeddingProvider),
    };

    let weather_provider = Arc::new(
        HttpWeatherProvider::new(
            cfg.weather.provider_base_url.clone(),
            cfg.weather.api_key.clone(),
            Duration::from_secs(cfg.weather.fetch_timeout_secs),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?,
    );
    let weather = Arc::new(WeatherService::new(
        weather_provider,
        store.clone(),
        &cfg.weather,
    ));

    let sms: Arc<dyn SmsGateway> = match &cfg.alerts.sms_gateway_url {
        Some(url) => Arc::new(
            HttpSmsGateway::new(
                url.clone(),
                cfg.alerts.sms_gateway_token.clone(),
                Duration::from_secs(cfg.alerts.send_timeout_secs),
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        ),
        None => Arc::new(LogSmsGateway),
    };
    let alerts = Arc::new(AlertService::new(
        store.clone(),
        sms,
        Arc::new(LogEmailGateway),
        cfg.alerts.clone(),
    ));

    Ok(Arc::new(Pipeline::new(
        store.clone(),
        Coordinator::new(store.clone(), embedding),
        weather,
        Arc::new(Predictor::new(store.clone(), cfg.predictor.clone())),
        Optimizer::new(cfg.optimizer.clone()),
        alerts,
    )))
}

// ============================================================================
// Commands
// ============================================================================

async fn serve(addr_override: Option<String>, horizon: i64) -> Result<()> {
    let store = connect_store().await?;
    let pipeline = build_pipeline(store)?;

    let periodic = pipeline.clone().spawn_periodic(horizon.clamp(1, 7));

    let addr = addr_override.unwrap_or_else(|| config::get().server.addr.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "burncast listening");

    let app = app_router(ApiState {
        pipeline: pipeline.clone(),
    });

    let shutdown = pipeline.shutdown_token();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown.cancel();
    })
    .await
    .context("http server")?;

    periodic.abort();
    Ok(())
}

async fn seed_data(
    farm_count: u32,
    request_count: u32,
    seed: u64,
    center: GeoPoint,
    dry_run: bool,
) -> Result<()> {
    let store: Arc<dyn Store> = if dry_run {
        Arc::new(MemStore::new())
    } else {
        connect_store().await?
    };

    let coordinator = Coordinator::new(store.clone(), Arc::new(NullEmbeddingProvider));
    let mut rng = StdRng::seed_from_u64(seed);
    let area_dist = Normal::new(80.0_f64, 40.0).context("area distribution")?;
    let fuel_dist = Normal::new(15.0_f64, 4.0).context("fuel distribution")?;

    let crops = [
        CropType::Rice,
        CropType::Wheat,
        CropType::Corn,
        CropType::Barley,
        CropType::Cotton,
    ];

    let mut farm_ids = Vec::with_capacity(farm_count as usize);
    for i in 0..farm_count {
        let bearing = rng.gen_range(0.0..360.0);
        let distance = rng.gen_range(1_000.0..25_000.0);
        let location = spatial::destination(center, bearing, distance);
        let farm = store
            .insert_farm(Farm {
                id: 0,
                name: format!("Demo Farm {}", i + 1),
                owner_name: format!("Owner {}", i + 1),
                phone: format!("+1555123{:04}", 1_000 + i),
                email: format!("owner{}@example.com", i + 1),
                location,
                permit_number: Some(format!("CA-2026-{:04}", i + 1)),
                total_area_hectares: 200.0 + f64::from(i) * 50.0,
                created_at: epoch_micros(Utc::now()),
            })
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        farm_ids.push((farm.id, location));
    }

    let today = Utc::now().date_naive();
    let mut accepted = 0;
    for i in 0..request_count {
        let (farm_id, location) = farm_ids[(i as usize) % farm_ids.len()];
        let area = area_dist.sample(&mut rng).clamp(10.0, 900.0);
        let side_m = (area * 10_000.0).sqrt();
        let offset = spatial::destination(
            location,
            rng.gen_range(0.0..360.0),
            rng.gen_range(200.0..3_000.0),
        );
        let start_hour = rng.gen_range(6..12u32);
        let duration = rng.gen_range(2..6u32);

        let submission = SubmitBurnRequest {
            farm_id,
            field_name: format!("Field {}", i + 1),
            field_boundary: spatial::square_around(offset, side_m),
            area_hectares: area,
            crop_type: crops[(i as usize) % crops.len()].as_str().to_string(),
            burn_date: today + chrono::Duration::days(rng.gen_range(1..6)),
            time_window_start: format!("{start_hour:02}:00"),
            time_window_end: format!("{:02}:00", start_hour + duration),
            fuel_load_t_per_ha: fuel_dist.sample(&mut rng).clamp(5.0, 40.0),
            requested_priority: None,
        };

        match coordinator.submit(submission, None).await {
            Ok(outcome) => {
                accepted += 1;
                info!(
                    request_id = outcome.request.id,
                    priority = outcome.request.priority_score,
                    "seeded burn request"
                );
            }
            Err(e) => warn!(error = %e, "seed submission rejected"),
        }
    }

    info!(
        farms = farm_ids.len(),
        requests = accepted,
        dry_run,
        "seed complete"
    );
    Ok(())
}

async fn optimize_once(date: NaiveDate) -> Result<()> {
    let store = connect_store().await?;
    let pipeline = build_pipeline(store)?;

    let today = Utc::now().date_naive();
    let horizon = ((date - today).num_days() + 1).clamp(1, 7);
    let outcome = pipeline
        .run_optimization_cycle(horizon)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    info!(
        run_id = %outcome.run_id,
        scheduled = outcome.scheduled,
        deferred = outcome.deferred,
        rejected = outcome.rejected,
        conflicts = outcome.conflicts,
        feasible = outcome.feasible,
        "optimization run complete"
    );
    if !outcome.feasible {
        anyhow::bail!("optimizer could not place any request");
    }
    Ok(())
}

async fn health_check() -> Result<()> {
    let cfg = config::get();
    let mut healthy = true;

    if cfg.database.url.is_empty() {
        warn!("DATABASE_URL not set — skipping store probe");
    } else {
        match connect_store().await {
            Ok(store) => match store.health_check().await {
                Ok(()) => info!("store: ok"),
                Err(e) => {
                    error!(error = %e, "store: failed");
                    healthy = false;
                }
            },
            Err(e) => {
                error!(error = %e, "store: unreachable");
                healthy = false;
            }
        }
    }

    if cfg.weather.provider_base_url.is_empty() {
        warn!("WEATHER_API_BASE_URL not set — skipping weather provider probe");
    } else {
        let provider = HttpWeatherProvider::new(
            cfg.weather.provider_base_url.clone(),
            cfg.weather.api_key.clone(),
            Duration::from_secs(cfg.weather.fetch_timeout_secs),
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        match burncast::weather::WeatherProvider::probe(&provider).await {
            Ok(()) => info!("weather provider: ok"),
            Err(e) => {
                error!(error = %e, "weather provider: failed");
                healthy = false;
            }
        }
    }

    if healthy {
        info!("health check passed");
        Ok(())
    } else {
        anyhow::bail!("one or more dependencies are unhealthy")
    }
}

//! Command line driver for the consolidation pipeline.
//!
//! Reads a CSV export of trip requests, consolidates every service date in
//! the range and writes the labeled trips back out as CSV.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;

use route_consolidator::batch::UnprocessableTrip;
use route_consolidator::config::PipelineConfig;
use route_consolidator::pipeline::{AnnotatedTrip, GroupFailure, Pipeline, PipelineOutput};
use route_consolidator::routing::google::{API_KEY_ENV, GoogleDirectionsClient, GoogleDirectionsConfig};
use route_consolidator::routing::osrm::{OsrmClient, OsrmConfig};
use route_consolidator::source::CsvTripSource;
use route_consolidator::traits::RoutingService;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Router {
    Google,
    Osrm,
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// CSV export of trip requests
    #[arg(long, value_name = "CSV")]
    trips: PathBuf,

    /// JSON pipeline config; defaults apply when omitted
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// First service date (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last service date, inclusive; defaults to --start
    #[arg(long)]
    end: Option<NaiveDate>,

    #[arg(long, value_enum, default_value = "google")]
    router: Router,

    #[arg(long = "osrm-url", value_name = "URL", default_value = "http://localhost:5000")]
    osrm_url: String,

    /// IANA zone of the scheduled times; overrides the config file
    #[arg(long, value_name = "ZONE")]
    timezone: Option<Tz>,

    #[arg(long = "output-dir", value_name = "DIR")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let cli = Cli::parse();
    let end = cli.end.unwrap_or(cli.start);
    if end < cli.start {
        bail!("--end {} is before --start {}", end, cli.start);
    }

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(timezone) = cli.timezone {
        config.timezone = timezone;
    }
    let source = CsvTripSource::new(&cli.trips);

    let output = match cli.router {
        Router::Google => {
            let Some(google) = GoogleDirectionsConfig::from_env(config.timezone) else {
                bail!("{} is not set", API_KEY_ENV);
            };
            run(source, GoogleDirectionsClient::new(google)?, config, cli.start, end)?
        }
        Router::Osrm => {
            let osrm = OsrmConfig {
                base_url: cli.osrm_url.clone(),
                ..OsrmConfig::default()
            };
            run(source, OsrmClient::new(osrm)?, config, cli.start, end)?
        }
    };

    write_output(&cli.output_dir, &output)?;
    info!(dir = %cli.output_dir.display(), routing_calls = output.routing_calls, "results written");
    Ok(())
}

fn run<R: RoutingService>(
    source: CsvTripSource,
    router: R,
    config: PipelineConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PipelineOutput> {
    let pipeline = Pipeline::new(source, router, config);
    Ok(pipeline.run(start, end)?)
}

// ============================================================================
// Export
// ============================================================================

#[derive(Serialize)]
struct TripRow<'a> {
    #[serde(rename = "SERVICIO_ID")]
    service_id: &'a str,
    #[serde(rename = "IDENTIFICACION_USUARIO")]
    user_id: &'a str,
    #[serde(rename = "NOMBRE_USUARIO")]
    user_name: &'a str,
    #[serde(rename = "FECHA_SERVICIO")]
    service_date: NaiveDate,
    #[serde(rename = "HORA_SERVICIO")]
    service_time: String,
    #[serde(rename = "DETALLE_SERVICIO")]
    direction: &'static str,
    #[serde(rename = "LATITUD_ORIGEN")]
    origin_lat: Option<f64>,
    #[serde(rename = "LONGITUD_ORIGEN")]
    origin_lng: Option<f64>,
    #[serde(rename = "LATITUD_DESTINO")]
    destination_lat: Option<f64>,
    #[serde(rename = "LONGITUD_DESTINO")]
    destination_lng: Option<f64>,
    #[serde(rename = "CIUDAD_DESTINO")]
    destination_city: &'a str,
    destination_cluster: Option<usize>,
    time_window: Option<usize>,
    initial_route: Option<usize>,
    final_route: Option<&'a str>,
    linear_distance_km: Option<f64>,
    estimated_minutes: Option<f64>,
    real_minutes: Option<u64>,
    pickup_order: Option<u32>,
    valid: Option<bool>,
    missing: Option<String>,
}

impl<'a> TripRow<'a> {
    fn annotated(row: &'a AnnotatedTrip) -> Self {
        let mut out = Self::base(&row.trip);
        out.destination_cluster = Some(row.destination_cluster);
        out.time_window = Some(row.time_window);
        out.initial_route = Some(row.base_group);
        out.final_route = row.final_route.as_deref();
        out.linear_distance_km = row.linear_distance_km;
        out.estimated_minutes = row.estimated_minutes;
        out.real_minutes = row.real_minutes;
        out.pickup_order = row.pickup_order;
        out.valid = Some(row.valid);
        out
    }

    fn unprocessable(row: &'a UnprocessableTrip) -> Self {
        let mut out = Self::base(&row.trip);
        out.missing = Some(format!("{:?}", row.missing).to_lowercase());
        out
    }

    fn base(trip: &'a route_consolidator::trip::TripRequest) -> Self {
        Self {
            service_id: &trip.service_id,
            user_id: &trip.user_id,
            user_name: &trip.user_name,
            service_date: trip.service_date,
            service_time: trip.service_time.format("%H:%M:%S").to_string(),
            direction: trip.direction.as_str(),
            origin_lat: trip.origin.map(|c| c.lat),
            origin_lng: trip.origin.map(|c| c.lng),
            destination_lat: trip.destination.map(|c| c.lat),
            destination_lng: trip.destination.map(|c| c.lng),
            destination_city: &trip.destination_city,
            destination_cluster: None,
            time_window: None,
            initial_route: None,
            final_route: None,
            linear_distance_km: None,
            estimated_minutes: None,
            real_minutes: None,
            pickup_order: None,
            valid: None,
            missing: None,
        }
    }
}

#[derive(Serialize)]
struct FailureRow<'a> {
    service_date: NaiveDate,
    direction: &'static str,
    stage: String,
    route: &'a str,
    seed_service_id: Option<&'a str>,
    error: String,
}

impl<'a> From<&'a GroupFailure> for FailureRow<'a> {
    fn from(failure: &'a GroupFailure) -> Self {
        Self {
            service_date: failure.service_date,
            direction: failure.direction.as_str(),
            stage: failure.stage.to_string(),
            route: &failure.route,
            seed_service_id: failure.seed_service_id.as_deref(),
            error: failure.error.to_string(),
        }
    }
}

fn write_output(dir: &Path, output: &PipelineOutput) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    write_csv(&dir.join("outbound.csv"), output.outbound.iter().map(TripRow::annotated))?;
    write_csv(&dir.join("return.csv"), output.returns.iter().map(TripRow::annotated))?;
    write_csv(
        &dir.join("unprocessable.csv"),
        output.unprocessable.iter().map(TripRow::unprocessable),
    )?;
    write_csv(&dir.join("failures.csv"), output.failures.iter().map(FailureRow::from))?;
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: impl Iterator<Item = T>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

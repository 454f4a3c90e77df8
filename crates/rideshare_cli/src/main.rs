use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rideshare_core::config::EngineConfig;
use rideshare_core::demand::{generate_users, DemandParams};
use rideshare_core::geo::Point;
use rideshare_core::store::{JsonFileStateStore, StateStore};
use rideshare_core::user::RideRequest;
use rideshare_core::{MatchResult, MatchingEngine};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "rideshare",
    about = "Fair ride-pool matching over a JSON state file",
    long_about = "Manage drivers and riders in a JSON state file and run matching epochs:\n\
                  build the eligibility matrix, then assign riders to drivers."
)]
struct Cli {
    /// State file (created on first write)
    #[arg(long, env = "RIDESHARE_STORE", default_value = "rideshare_state.json")]
    store: PathBuf,
    /// Engine config file (JSON); defaults apply to missing fields
    #[arg(long, env = "RIDESHARE_CONFIG")]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account with the initial token balance
    CreateUser { id: String },
    /// Submit a ride request as driver or rider
    RequestRide {
        id: String,
        #[arg(long, value_enum)]
        role: RoleArg,
        /// Pickup as LAT,LNG
        #[arg(long, value_parser = parse_point)]
        from: Point,
        /// Drop-off as LAT,LNG
        #[arg(long, value_parser = parse_point)]
        to: Point,
        /// Seats offered (drivers)
        #[arg(long, default_value_t = 0)]
        seats: u32,
        /// Accepted detour in percent of the direct route (drivers)
        #[arg(long, default_value_t = 0)]
        threshold: u32,
    },
    /// Print a user record
    ShowUser { id: String },
    /// Remove a user record
    DeleteUser { id: String },
    /// Compute and persist the eligibility matrix for the current pool
    BuildMatrix,
    /// Assign riders against the persisted matrix
    Assign {
        #[arg(long)]
        tx_id: String,
    },
    /// Build the matrix and assign, if enough users are waiting
    Epoch {
        #[arg(long)]
        tx_id: String,
    },
    /// Count unassigned users and report whether an epoch is due
    Count,
    /// Summarise users, tokens and active rides
    Overview,
    /// Write a batch of random drivers and riders into the store
    Generate {
        #[arg(long, default_value_t = 10)]
        drivers: usize,
        #[arg(long, default_value_t = 50)]
        riders: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "usr")]
        id_prefix: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Driver,
    Rider,
}

// ── helpers ────────────────────────────────────────────────────────

fn parse_point(raw: &str) -> Result<Point, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got {raw:?}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|err| format!("invalid latitude {lat:?}: {err}"))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|err| format!("invalid longitude {lng:?}: {err}"))?;
    let point = Point::new(lat, lng);
    if !point.is_valid() {
        return Err(format!("coordinate out of range: {raw}"));
    }
    Ok(point)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> MatchResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> MatchResult<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    Ok(config.apply_env()?)
}

fn run(cli: Cli) -> MatchResult<()> {
    let config = load_config(cli.config.as_ref())?;
    let store = JsonFileStateStore::open(&cli.store);
    info!(store = %store.path().display(), provider = ?config.provider, "state store opened");
    let engine = MatchingEngine::from_config(store, config)?;
    run_command(&engine, cli.command)
}

fn run_command<S: StateStore>(
    engine: &MatchingEngine<S>,
    command: Commands,
) -> MatchResult<()> {
    match command {
        Commands::CreateUser { id } => print_json(&engine.create_user(&id)?),
        Commands::RequestRide {
            id,
            role,
            from,
            to,
            seats,
            threshold,
        } => {
            let request = match role {
                RoleArg::Driver => RideRequest::driver(from, to, seats, threshold),
                RoleArg::Rider => RideRequest::rider(from, to),
            };
            print_json(&engine.request_ride(&id, &request)?)
        }
        Commands::ShowUser { id } => print_json(&engine.read_user(&id)?),
        Commands::DeleteUser { id } => {
            engine.delete_user(&id)?;
            print_json(&json!({ "deleted": id }))
        }
        Commands::BuildMatrix => print_json(&engine.build_matrix()?),
        Commands::Assign { tx_id } => print_json(&engine.run_assignment(&tx_id)?),
        Commands::Epoch { tx_id } => match engine.run_epoch(&tx_id)? {
            Some(summary) => print_json(&summary),
            None => print_json(&json!({ "skipped": true, "transaction_id": tx_id })),
        },
        Commands::Count => {
            let unassigned = engine.count_unassigned()?;
            let threshold = engine.config().min_users_for_assignment;
            print_json(&json!({
                "unassigned": unassigned,
                "min_users_for_assignment": threshold,
                "should_trigger": unassigned >= threshold,
            }))
        }
        Commands::Overview => print_json(&engine.overview()?),
        Commands::Generate {
            drivers,
            riders,
            seed,
            id_prefix,
        } => {
            let params = DemandParams {
                seed,
                initial_token: engine.config().initial_token,
                id_prefix,
                ..DemandParams::default()
            }
            .with_counts(drivers, riders);
            let written = engine.import_users(&generate_users(&params))?;
            print_json(&json!({ "generated": written }))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("12.97, 77.59"), Ok(Point::new(12.97, 77.59)));
        assert!(parse_point("12.97").is_err());
        assert!(parse_point("north,77").is_err());
        assert!(parse_point("95.0,10.0").is_err());
    }

    #[test]
    fn parses_request_ride() {
        let cli = Cli::try_parse_from([
            "rideshare",
            "--store",
            "state.json",
            "request-ride",
            "usr1",
            "--role",
            "driver",
            "--from",
            "12.9,77.5",
            "--to",
            "13.0,77.6",
            "--seats",
            "3",
            "--threshold",
            "20",
        ])
        .unwrap();
        match cli.command {
            Commands::RequestRide { id, seats, threshold, .. } => {
                assert_eq!(id, "usr1");
                assert_eq!((seats, threshold), (3, 20));
            }
            _ => panic!("expected request-ride"),
        }
    }

    #[test]
    fn generate_then_epoch_over_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let rideshare = |cmd: &[&str]| {
            let mut args = vec!["rideshare", "--store", path.to_str().unwrap()];
            args.extend_from_slice(cmd);
            run(Cli::try_parse_from(args).unwrap())
        };

        rideshare(&["generate", "--drivers", "3", "--riders", "9", "--seed", "4"]).unwrap();
        rideshare(&["epoch", "--tx-id", "cli-epoch"]).unwrap();

        let engine =
            MatchingEngine::from_config(JsonFileStateStore::open(&path), EngineConfig::default())
                .unwrap();
        let overview = engine.overview().unwrap();
        assert_eq!(overview.total_users, 12);
        assert_eq!(overview.total_tokens, 120);
    }
}

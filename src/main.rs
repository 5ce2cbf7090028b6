use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;
use sure_feeder_access::api::SureApiClient;
use sure_feeder_access::config::{Config, load_dotenv};
use sure_feeder_access::coordinator::{Coordinator, EntityCache};
use sure_feeder_access::error::Result;
use sure_feeder_access::model::Entity;
use sure_feeder_access::switch::{ConfirmPolicy, PetFeederAccess, ToggleEntity, discover_toggles};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sure-access", version, about = "Manage pet access to Sure Petcare feeders")]
struct Cli {
    /// Bearer token for the Sure Petcare cloud
    #[arg(long, env = "SURE_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List cached pets and devices
    List,
    /// Show every pet/feeder access toggle and its state
    Status,
    /// Grant a pet access to a feeder and wait for confirmation
    Enable(PairArgs),
    /// Revoke a pet's access to a feeder and wait for confirmation
    Disable(PairArgs),
    /// Keep refreshing and log access changes until interrupted
    Watch,
}

#[derive(Args)]
struct PairArgs {
    #[arg(long)]
    pet: u64,
    #[arg(long)]
    feeder: u64,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn state_label(state: Option<bool>) -> &'static str {
    match state {
        Some(true) => "on",
        Some(false) => "off",
        None => "unknown",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    init_logger();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(token) = cli.token {
        config.api.token = Some(token);
    }

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let client = Arc::new(SureApiClient::new(&config.api)?);
    let coordinator = Arc::new(Coordinator::new(client.clone()));
    let entities = coordinator.refresh().await?;
    info!("Loaded {} entities from {}", entities, client.base_url());

    // Ctrl+C aborts any in-flight confirmation
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            cancel_on_signal.cancel();
        }
    });

    let policy = ConfirmPolicy::from(&config.access);

    match command {
        Command::List => {
            for entity in coordinator.entities() {
                let kind = entity
                    .entity_type()
                    .map(|t| t.display_name())
                    .unwrap_or_else(|| "Unknown".to_string());
                let extra = match &entity {
                    Entity::Pet(p) => format!(
                        "tag {}",
                        p.tag_id.map_or_else(|| "-".to_string(), |t| t.to_string())
                    ),
                    Entity::Feeder(f) => format!("{} tag(s)", f.tags.len()),
                    Entity::Device(_) => String::new(),
                };
                println!(
                    "{:>10}  household {:>8}  {:<12} {:<20} {}",
                    entity.id(),
                    entity.household_id(),
                    kind,
                    entity.name().unwrap_or("-"),
                    extra
                );
            }
        }
        Command::Status => {
            for toggle in discover_toggles(coordinator.clone(), client.clone(), policy, &cancel) {
                println!(
                    "{:<40} {:<8} {}",
                    toggle.name(),
                    state_label(toggle.is_on()),
                    toggle.unique_id()
                );
            }
        }
        Command::Enable(pair) => {
            let toggle = pair_toggle(&coordinator, &client, &pair, policy, &cancel)?;
            toggle.turn_on().await?;
            info!("{}: {}", toggle.name(), state_label(toggle.is_on()));
        }
        Command::Disable(pair) => {
            let toggle = pair_toggle(&coordinator, &client, &pair, policy, &cancel)?;
            toggle.turn_off().await?;
            info!("{}: {}", toggle.name(), state_label(toggle.is_on()));
        }
        Command::Watch => {
            let toggles = discover_toggles(coordinator.clone(), client.clone(), policy, &cancel);
            let mut last: Vec<Option<bool>> = toggles.iter().map(|t| t.is_on()).collect();
            for (toggle, state) in toggles.iter().zip(&last) {
                info!("{}: {}", toggle.name(), state_label(*state));
            }

            let refresher =
                coordinator.spawn_periodic(config.coordinator.refresh_interval(), cancel.clone());
            let mut ticker = tokio::time::interval(config.coordinator.refresh_interval());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for (toggle, previous) in toggles.iter().zip(last.iter_mut()) {
                            let current = toggle.is_on();
                            if current != *previous {
                                info!(
                                    "{}: {} -> {}",
                                    toggle.name(),
                                    state_label(*previous),
                                    state_label(current)
                                );
                                *previous = current;
                            }
                        }
                    }
                }
            }
            let _ = refresher.await;
        }
    }

    Ok(())
}

fn pair_toggle(
    coordinator: &Arc<Coordinator>,
    client: &Arc<SureApiClient>,
    pair: &PairArgs,
    policy: ConfirmPolicy,
    cancel: &CancellationToken,
) -> Result<PetFeederAccess> {
    Ok(
        PetFeederAccess::new(coordinator.clone(), client.clone(), pair.pet, pair.feeder)?
            .with_policy(policy)
            .with_cancellation(cancel.child_token()),
    )
}

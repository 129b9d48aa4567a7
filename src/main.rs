use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use soak::config::{Config, LoggingConfig, load_config};
use soak::domain::ports::Participant;
use soak::infrastructure::krist::derive_address;
use soak::interfaces::csv::transfer_writer::TransferWriter;
use soak::interfaces::jsonl::payment_reader::PaymentReader;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit status when the broker cannot be reached or is not available in this build.
const EXIT_BROKER_UNAVAILABLE: i32 = 3;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults to $SOAK_CONFIG, then ./config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume payments from NATS and pay out through the Krist API.
    Run,
    /// Replay recorded payment notifications and print the resulting transfers as CSV.
    Replay {
        /// Payment notifications, one JSON object per line.
        input: PathBuf,

        /// JSON array of the participants online during the replay.
        #[arg(long)]
        roster: PathBuf,

        /// Address payments must be sent to. Derived from the private key when omitted.
        #[arg(long)]
        address: Option<String>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(|path| path.display().to_string())
        .or_else(|| std::env::var("SOAK_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string());
    let config = load_config(Some(&config_path)).into_diagnostic()?;
    init_tracing(&config.logging);

    match cli.command {
        Command::Run => run(config).await,
        Command::Replay {
            input,
            roster,
            address,
        } => replay(config, input, roster, address).await,
    }
}

async fn replay(
    config: Config,
    input: PathBuf,
    roster: PathBuf,
    address: Option<String>,
) -> Result<()> {
    let address = address.unwrap_or_else(|| derive_address(&config.service.private_key));

    let participants: Vec<Participant> =
        serde_json::from_reader(File::open(roster).into_diagnostic()?).into_diagnostic()?;

    let file = File::open(input).into_diagnostic()?;
    let mut payments = Vec::new();
    for payment in PaymentReader::new(file).payments() {
        match payment {
            Ok(payment) => payments.push(payment),
            Err(e) => error!(error = %e, "Error reading payment"),
        }
    }

    let transfers = soak::replay::replay(&payments, participants, &config, &address)
        .await
        .into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = TransferWriter::new(stdout.lock());
    writer.write_transfers(&transfers).into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "broker-nats")]
async fn run(config: Config) -> Result<()> {
    use soak::application::inbound::{InboundProcessor, ServiceIdentity};
    use soak::application::outbound::OutboundProcessor;
    use soak::application::publisher::RequestPublisher;
    use soak::domain::backoff::BackoffPolicy;
    use soak::domain::policy::SplitPolicy;
    use soak::domain::ports::PaymentNetwork;
    use soak::infrastructure::krist::KristClient;
    use soak::infrastructure::nats::JetStreamBroker;
    use soak::infrastructure::roster::{FileRoster, RosterResolver};
    use std::sync::Arc;
    use tracing::{info, warn};

    config.validate_for_service().into_diagnostic()?;
    let address = derive_address(&config.service.private_key);

    let network = Arc::new(KristClient::new(config.network.endpoint.as_str()));
    match network.balance(&address).await {
        Ok(balance) => info!(%address, balance, "wallet ready"),
        Err(e) => warn!(%address, error = %e, "could not read wallet balance"),
    }

    let connected = async {
        let broker = JetStreamBroker::connect(
            &config.broker.server,
            &config.broker.user,
            &config.broker.password,
        )
        .await?;
        broker.ensure_outgoing_stream().await?;
        let inbound = broker.inbound(&address).await?;
        let outbound = broker.outbound(config.outbound.max_in_flight).await?;
        Ok::<_, soak::error::SoakError>((broker, inbound, outbound))
    }
    .await;
    let (broker, inbound_source, outbound_source) = match connected {
        Ok(connected) => connected,
        Err(e) => {
            error!(error = %e, "Error connecting to NATS");
            std::process::exit(EXIT_BROKER_UNAVAILABLE);
        }
    };

    let backoff = BackoffPolicy::from(&config.backoff);
    let resolver = RosterResolver::new(
        Box::new(FileRoster::new(&config.presence.roster_path)),
        config.service.deny_list.clone(),
        config.service.recipient_domain.as_str(),
    );
    let inbound = InboundProcessor::new(
        ServiceIdentity {
            address: address.clone(),
            name: config.service.name.clone(),
        },
        RequestPublisher::new(Arc::new(broker.queue())),
        Arc::new(resolver),
        SplitPolicy::new(config.service.name.as_str()),
    )
    .with_backoff(backoff)
    .with_closed_message(config.service.closed_message.clone());
    let outbound = OutboundProcessor::new(network, config.service.private_key.as_str())
        .with_backoff(backoff)
        .with_max_in_flight(config.outbound.max_in_flight);

    info!(%address, name = %config.service.name, "consuming payments");
    let result = tokio::select! {
        result = inbound.run(inbound_source) => result,
        result = outbound.run(outbound_source) => result,
    };

    match result {
        Ok(()) => error!("subscription to NATS ended"),
        Err(e) => error!(error = %e, "lost connection to NATS"),
    }
    std::process::exit(EXIT_BROKER_UNAVAILABLE);
}

#[cfg(not(feature = "broker-nats"))]
async fn run(_config: Config) -> Result<()> {
    error!(
        "the run command needs NATS support, which is not enabled in this build. Rebuild with the 'broker-nats' feature."
    );
    std::process::exit(EXIT_BROKER_UNAVAILABLE);
}

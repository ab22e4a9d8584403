use clap::Parser;
use log::{error, info, warn};
use scene_switch_sync::config::{self, Config, DeviceConfig};
use scene_switch_sync::engine::scheduler::TokioTickScheduler;
use scene_switch_sync::engine::{InboundEvent, OutboundSink, SwitchEngine};
use scene_switch_sync::input::mqtt::{
    LoggingSink, MqttClient, MqttIntegration, MqttSink, WallSwitchDecoder,
};
use scene_switch_sync::instance_lock::{InstanceLock, InstanceLockError};
use scene_switch_sync::store::StateStore;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Parser)]
#[command(version, about = "Sync engine for four-button scene wall switches")]
struct Cli {
    /// JSON file listing the wall switches and their preferences
    #[arg(long, env = "DEVICES_FILE")]
    devices: Option<PathBuf>,

    /// Where per-device state is persisted
    #[arg(long, env = "STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Run without a broker; outbound commands are only logged
    #[arg(long)]
    no_mqtt: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn spawn_engine<S>(
    config: &Config,
    sink: S,
    events_tx: mpsc::Sender<InboundEvent>,
    events_rx: mpsc::Receiver<InboundEvent>,
    store: StateStore,
) -> JoinHandle<()>
where
    S: OutboundSink + 'static,
{
    let scheduler = TokioTickScheduler::new(
        events_tx,
        config.engine.tick_period(),
        config.engine.association_spacing(),
    );
    let engine = SwitchEngine::new(config.engine.settings(), sink, scheduler, store);
    tokio::spawn(engine.run(events_rx))
}

fn main() {
    // Load .env before clap reads its env fallbacks and before any runtime threads exist
    config::load_dotenv();
    let cli = Cli::parse();
    init_logger();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli));
}

async fn run(cli: Cli) {
    info!("Starting scene switch sync");

    let _lock = match InstanceLock::acquire() {
        Ok(lock) => lock,
        Err(InstanceLockError::AlreadyRunning) => {
            error!("Another instance is already running");
            std::process::exit(1);
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut config = Config::from_env();
    if let Some(path) = cli.devices {
        config.devices_file = Some(path);
    }
    if let Some(path) = cli.state_file {
        config.state_file = path;
    }
    info!("Configuration loaded:");
    info!(
        "  MQTT broker: {}:{} (prefix {})",
        config.mqtt.broker_host, config.mqtt.broker_port, config.mqtt.topic_prefix
    );
    info!("  State file: {:?}", config.state_file);

    let devices: Vec<DeviceConfig> = match &config.devices_file {
        Some(path) => match config::load_devices(path) {
            Ok(devices) => devices,
            Err(e) => {
                error!("Failed to load devices from {:?}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No devices file configured, starting with no wall switches");
            Vec::new()
        }
    };
    info!("  Wall switches: {}", devices.len());

    let store = StateStore::open(config.state_file.clone());
    let (events_tx, events_rx) = mpsc::channel::<InboundEvent>(256);

    let mut tasks = Vec::new();
    if cli.no_mqtt {
        info!("MQTT disabled, outbound commands will only be logged");
        tasks.push(spawn_engine(
            &config,
            LoggingSink,
            events_tx.clone(),
            events_rx,
            store,
        ));
    } else {
        let mqtt_client = MqttClient::new(&config.mqtt);
        let sink = MqttSink::new(mqtt_client.client(), config.mqtt.topic_prefix.clone());
        tasks.push(spawn_engine(
            &config,
            sink,
            events_tx.clone(),
            events_rx,
            store,
        ));

        let decoder = WallSwitchDecoder::new(
            config.mqtt.topic_prefix.clone(),
            devices.iter().map(|d| (d.id.clone(), d.preferences.clone())),
        );
        info!(
            "[MQTT] Connecting to {}:{}",
            config.mqtt.broker_host, config.mqtt.broker_port
        );
        tasks.push(MqttIntegration::new(mqtt_client, decoder, events_tx.clone()).start());
    }

    for device in devices {
        let added = InboundEvent::DeviceAdded {
            device_id: device.id,
            preferences: device.preferences,
        };
        if events_tx.send(added).await.is_err() {
            error!("Engine stopped before devices were registered");
            std::process::exit(1);
        }
    }

    info!("Scene switch sync is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    for task in tasks {
        task.abort();
    }
    info!("Scene switch sync stopped");
}

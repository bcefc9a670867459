//! Two-federate value exchange demo.
//!
//! A sender federate publishes `t * 22/7` for a number of time steps while a
//! receiver federate subscribes and logs each delivered value. Both run as
//! tasks against one in-process broker.
//!
//! # Usage
//!
//! ```bash
//! # Twenty steps of 0.01 simulated seconds
//! pi-exchange
//!
//! # Slower cadence, visible delivery delay, verbose logging
//! pi-exchange --steps 10 --delta 0.1 --input-delay 0.1 --log-level debug
//! ```

use clap::Parser;
use lockstep_broker::{Broker, BrokerConfig};
use lockstep_federate::{Federate, FederateConfig, FederateError};
use lockstep_proto::{LogLevel, SimTime, ValueType};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// The value the sender scales by simulated time.
const PI_ISH: f64 = 22.0 / 7.0;

/// Two-federate pi exchange over an in-process broker
#[derive(Parser, Debug)]
#[command(name = "pi-exchange")]
#[command(about = "Time-stepped value exchange between two federates")]
#[command(version)]
struct Args {
    /// Number of time steps the sender publishes
    #[arg(long, default_value = "20")]
    steps: u32,

    /// Simulated seconds between steps (the federates' period)
    #[arg(long, default_value = "0.01")]
    delta: f64,

    /// Receiver input delay in simulated seconds
    #[arg(long, default_value = "0.0")]
    input_delay: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let log_level: LogLevel = args.log_level.parse()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let delta = SimTime::from_seconds(args.delta);
    let input_delay = SimTime::from_seconds(args.input_delay);
    let horizon = SimTime::from_seconds(args.delta * f64::from(args.steps));

    let broker = Broker::create(BrokerConfig {
        expected_federates: 2,
        log_level,
        ..BrokerConfig::default()
    });
    tracing::info!(connected = broker.is_connected(), "broker created");

    let sender = {
        let broker = broker.clone();
        let config = FederateConfig::new("pi-sender")
            .with_period(delta)
            .with_log_level(log_level);
        tokio::spawn(run_sender(broker, config, args.steps))
    };
    let receiver = {
        let broker = broker.clone();
        let config = FederateConfig::new("pi-receiver")
            .with_period(delta)
            .with_input_delay(input_delay)
            .with_log_level(log_level);
        tokio::spawn(run_receiver(broker, config, horizon))
    };

    sender.await??;
    receiver.await??;

    broker.wait_closed().await;
    tracing::info!("broker disconnected");
    Ok(())
}

/// Publish `t * 22/7` for `steps` grants, then finalize.
async fn run_sender(
    broker: Broker,
    config: FederateConfig,
    steps: u32,
) -> Result<(), FederateError> {
    let mut fed = Federate::create(config);
    fed.connect(&broker).await?;

    let output = fed.register_publication("testA", ValueType::Double).await?;
    fed.enter_initializing().await?;
    fed.enter_executing().await?;

    let mut now = SimTime::ZERO;
    for _ in 0..steps {
        let value = now.as_seconds() * PI_ISH;
        tracing::info!(target: "pi_sender", value, time = %now, "sending");
        fed.publish(&output, value).await?;

        // Requesting the current time advances by one period.
        now = fed.request_time(now).await?;
    }

    fed.finalize().await?;
    Ok(())
}

/// Step along with the sender until `horizon`, logging delivered values.
async fn run_receiver(
    broker: Broker,
    config: FederateConfig,
    horizon: SimTime,
) -> Result<(), FederateError> {
    let mut fed = Federate::create(config);
    fed.connect(&broker).await?;

    let input = fed.register_subscription("testA").await?;
    fed.enter_initializing().await?;
    fed.enter_executing().await?;

    let mut now = SimTime::ZERO;
    while now < horizon {
        now = fed.request_time(now).await?;

        if fed.is_updated(&input).await? {
            let value = fed.value(&input).await?;
            tracing::info!(target: "pi_receiver", value, time = %now, "received");
        }
    }

    fed.finalize().await?;
    Ok(())
}

//! Sensor node CoAP server on simulated hardware
//!
//! Usage:
//!   cargo run --example coap_server -- [--settings node.json] [--port 5683] [--button-every 15]
//!

use clap::Parser;
use log::info;
use sensor_coreconf::hardware::{SimulatedLeds, SimulatedSensors};
use sensor_coreconf::{CATALOG, Node, NodeSettings, SensorManager};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

#[derive(Parser, Debug)]
#[command(name = "sensor-node")]
#[command(about = "Sensor node CoAP server - telemetry, LEDs and observe over CBOR")]
struct Args {
    /// Path to the node settings file (JSON, optional)
    #[arg(short, long)]
    settings: Option<String>,

    /// UDP port to listen on (overrides the settings file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Simulate a button press every N seconds
    #[arg(long)]
    button_every: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> sensor_coreconf::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let mut settings = match &args.settings {
        Some(path) => NodeSettings::load(path)?,
        None => NodeSettings::default(),
    };
    if let Some(port) = args.port {
        settings.bind = SocketAddr::new(settings.bind.ip(), port);
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Sensor Node CoAP Server                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let pins = &settings.pins;
    println!("Simulated hardware:");
    println!("  DHT22        GPIO{}", pins.dht);
    println!("  Light ADC    GPIO{}", pins.light);
    println!("  Ultrasonic   trig GPIO{} / echo GPIO{}", pins.trigger, pins.echo);
    println!("  LEDs         red GPIO{} / yellow GPIO{} / green GPIO{}", pins.red, pins.yellow, pins.green);
    println!("  Button       GPIO{}", pins.button);

    let sensors = SensorManager::new(
        SimulatedSensors::new(&settings.pins),
        SimulatedLeds::new(&settings.pins),
        settings.max_bin_height_cm,
    );

    let socket = UdpSocket::bind(settings.bind).await?;
    let port = socket.local_addr()?.port();

    println!("\n────────────────────────────────────────────────────────────────");
    println!("Server listening on: coap://{}", socket.local_addr()?);
    for entry in &CATALOG {
        println!(
            "  {:<20} {:<8}{}",
            entry.path,
            entry
                .methods
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(","),
            if entry.observable { " (observable)" } else { "" }
        );
    }
    println!("Sampling every {}s", settings.sampling_interval_seconds);
    println!("────────────────────────────────────────────────────────────────");
    println!("\nQuick test:");
    println!("  coap-client -m get coap://127.0.0.1:{}/sensors", port);
    println!("  cargo run --example coap_client -- observe /leds");
    println!("\nWaiting for requests... (Ctrl+C to stop)\n");

    let node = Node::new(settings, sensors);

    if let Some(secs) = args.button_every {
        let button = node.button();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!("Simulated button press");
                if !button.press() {
                    break;
                }
            }
        });
    }

    node.run(socket, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n\nReceived Ctrl+C, shutting down...");
        }
    })
    .await
}

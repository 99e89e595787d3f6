//! Sensor node CoAP client
//!
//! Usage:
//!   cargo run --example coap_client -- [--server 127.0.0.1:5683] <command>
//!
//! Commands:
//!   get <path>                         - GET a resource (/sensors, /config, ...)
//!   discover [--links]                 - GET /.well-known/core
//!   leds [--red] [--yellow] [--green]  - PUT /leds (omitted LEDs are switched off)
//!   interval <seconds>                 - PUT /config samplingIntervalSeconds
//!   observe <path>                     - Observe a resource until Ctrl+C

use clap::{Parser, Subcommand};
use sensor_coreconf::coap_types::ContentFormat;
use sensor_coreconf::request_builder::parse_response;
use sensor_coreconf::{ActuatorState, ClientResponse, RequestBuilder};
use serde_json::{Map, Value};
use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sensor-client")]
#[command(about = "CoAP client for the sensor node")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Server address
    #[arg(long, default_value = "127.0.0.1:5683", global = true)]
    server: String,

    /// Print raw datagrams as hex
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// GET a resource
    Get { path: String },
    /// List the node's resources
    Discover {
        /// Ask for RFC 6690 link-format instead of CBOR
        #[arg(long)]
        links: bool,
    },
    /// Replace the LED state
    Leds {
        #[arg(long)]
        red: bool,
        #[arg(long)]
        yellow: bool,
        #[arg(long)]
        green: bool,
    },
    /// Change the sampling interval
    Interval { seconds: u32 },
    /// Observe a resource until Ctrl+C
    Observe { path: String },
}

struct Client {
    socket: UdpSocket,
    builder: RequestBuilder,
    verbose: bool,
}

impl Client {
    fn new(server: &str, verbose: bool) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(Duration::from_secs(5)))?;
        socket.connect(server)?;

        Ok(Self {
            socket,
            builder: RequestBuilder::new(std::process::id() as u16),
            verbose,
        })
    }

    fn exchange(&mut self, datagram: sensor_coreconf::Result<Vec<u8>>) -> io::Result<Option<ClientResponse>> {
        let datagram = datagram.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        if self.verbose {
            println!("  → {}", hex::encode(&datagram));
        }
        self.socket.send(&datagram)?;
        self.receive()
    }

    fn receive(&self) -> io::Result<Option<ClientResponse>> {
        let mut buf = [0u8; 1500];
        match self.socket.recv(&mut buf) {
            Ok(len) => {
                if self.verbose {
                    println!("  ← {}", hex::encode(&buf[..len]));
                }
                parse_response(&buf[..len])
                    .map(Some)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn reset(&self, message_id: u16) {
        if let Ok(bytes) = RequestBuilder::reset(message_id) {
            let _ = self.socket.send(&bytes);
        }
    }
}

fn print_response(response: Option<ClientResponse>) {
    match response {
        Some(response) => {
            match response.code {
                Some(code) => println!("  Response: {}", code),
                None => println!("  Response: (unknown code)"),
            }
            if !response.payload.is_empty() {
                for line in response.render().lines() {
                    println!("    {}", line);
                }
            }
        }
        None => println!("  Timeout - no response"),
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let mut client = Client::new(&args.server, args.verbose)?;

    match args.command {
        Commands::Get { path } => {
            println!("GET {}", path);
            let request = client.builder.get(&path, &[0x01]);
            let response = client.exchange(request)?;
            print_response(response);
        }
        Commands::Discover { links } => {
            println!("GET /.well-known/core");
            let request = if links {
                client
                    .builder
                    .get_accepting("/.well-known/core", &[0x02], ContentFormat::LinkFormat)
            } else {
                client.builder.get("/.well-known/core", &[0x02])
            };
            let response = client.exchange(request)?;
            print_response(response);
        }
        Commands::Leds { red, yellow, green } => {
            let state = ActuatorState {
                red_led: red,
                yellow_led: yellow,
                green_led: green,
            };
            println!("PUT /leds {:?}", state);
            let request = client.builder.put_leds(&state, &[0x03]);
            let response = client.exchange(request)?;
            print_response(response);
        }
        Commands::Interval { seconds } => {
            let mut changes = Map::new();
            changes.insert("samplingIntervalSeconds".to_string(), Value::from(seconds));
            println!("PUT /config samplingIntervalSeconds={}", seconds);
            let request = client.builder.put_config(&changes, &[0x04]);
            let response = client.exchange(request)?;
            print_response(response);
        }
        Commands::Observe { path } => observe(&mut client, &path)?,
    }

    Ok(())
}

fn observe(client: &mut Client, path: &str) -> io::Result<()> {
    let token = [0x0B, 0x5E];
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| io::Error::other(e.to_string()))?;

    println!("Observing {} (Ctrl+C to stop)", path);
    let request = client.builder.observe(path, &token);
    let first = client.exchange(request)?;
    print_response(first);
    client.socket.set_read_timeout(Some(Duration::from_millis(500)))?;

    while running.load(Ordering::SeqCst) {
        let Some(notification) = client.receive()? else {
            continue;
        };
        if notification.token != token {
            client.reset(notification.message_id);
            continue;
        }
        println!("\nNotification #{}", notification.observe.unwrap_or_default());
        print_response(Some(notification));
    }

    println!("\nCancelling observation...");
    client.socket.set_read_timeout(Some(Duration::from_secs(2)))?;
    let request = client.builder.cancel_observe(path, &token);
    let last = client.exchange(request)?;
    print_response(last);
    Ok(())
}

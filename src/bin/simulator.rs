use clap::{App, Arg};
use rovsim::protocol::{parse_client_message, ClientMessage, LineEncoder, ServerMessage, MAX_COMMAND_SIZE};
use rovsim::{SimConfig, SimulationContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{debug, error, info, warn};

const EVENT_BROADCAST_BUFFER_SIZE: usize = 256;

type SharedContext = Arc<Mutex<SimulationContext>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("rovsim-simulator")
        .version("0.1.0")
        .about("Remote vehicle simulator server")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listen")
                .short("l")
                .long("listen")
                .value_name("ADDR")
                .help("Listen address, e.g. 127.0.0.1:8080")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("device-id")
                .long("device-id")
                .value_name("ID")
                .help("Vehicle device id")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for reproducible runs")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("tick")
                .long("tick-ms")
                .value_name("MS")
                .help("Physics tick period in milliseconds")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("noise")
                .long("noise")
                .value_name("LEVEL")
                .help("Sensor noise level in [0, 1]")
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(listen) = matches.value_of("listen") {
        config.listen_addr = listen.to_string();
    }
    if let Some(device_id) = matches.value_of("device-id") {
        config.device_id = device_id.to_string();
    }
    if let Some(seed) = matches.value_of("seed") {
        config.seed = Some(seed.parse()?);
    }
    if let Some(tick) = matches.value_of("tick") {
        config.tick_period_ms = tick.parse()?;
    }
    if let Some(noise) = matches.value_of("noise") {
        config.noise_level = noise.parse()?;
    }
    config.validate()?;

    println!("🚗 Remote Vehicle Simulator");
    println!("===========================");

    let context: SharedContext = Arc::new(Mutex::new(SimulationContext::new(&config)?));
    info!(
        "Simulating {} ({} ms tick, noise {}, latency {}..{} ms, failure rate {})",
        config.device_id,
        config.tick_period_ms,
        config.noise_level,
        config.policy.min_latency_ms,
        config.policy.max_latency_ms,
        config.policy.failure_rate
    );

    let (event_tx, _) = broadcast::channel::<String>(EVENT_BROADCAST_BUFFER_SIZE);

    let listener = TcpListener::bind(config.socket_addr()?).await?;
    info!("🌐 TCP server listening on {}", config.listen_addr);

    let tcp_context = Arc::clone(&context);
    let tcp_event_tx = event_tx.clone();
    let tcp_server = tokio::spawn(async move {
        accept_clients(listener, tcp_context, tcp_event_tx).await;
    });

    let mut interval = time::interval(Duration::from_millis(config.tick_period_ms));
    let mut encoder = LineEncoder::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }

        let events = {
            let mut ctx = context.lock().await;
            ctx.tick()
        };

        for event in events {
            let message = ServerMessage::from(event);
            match encoder.encode(&message) {
                // No subscribers is not an error
                Ok(line) => {
                    let _ = event_tx.send(line.to_string());
                }
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
    }

    tcp_server.abort();

    let summary = context.lock().await.summary();
    println!(
        "🏁 Simulator stopped: {} acks ({} ok, {} failed)",
        summary.total, summary.successes, summary.failures
    );

    Ok(())
}

async fn accept_clients(listener: TcpListener, context: SharedContext, event_tx: broadcast::Sender<String>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_context = Arc::clone(&context);
                let client_event_rx = event_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, addr.to_string(), client_context, client_event_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: String,
    context: SharedContext,
    mut event_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    // Stream telemetry and acks to this client
    let event_writer = Arc::clone(&writer);
    let event_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(line) => {
                    let mut writer_guard = event_writer.lock().await;
                    if let Err(e) = writer_guard.write_all(line.as_bytes()).await {
                        warn!("Failed to send event: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client lagging, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut encoder = LineEncoder::new();
    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                // The reply must reach the client before any ack for the command it dispatched
                let mut writer_guard = writer.lock().await;
                let reply = handle_line(trimmed, &peer, &context).await;
                let encoded = encoder.encode(&reply)?;
                writer_guard.write_all(encoded.as_bytes()).await?;
            }
            Err(e) => {
                error!("Error reading from client: {}", e);
                break;
            }
        }
    }

    event_task.abort();
    Ok(())
}

async fn handle_line(line: &str, peer: &str, context: &SharedContext) -> ServerMessage {
    let message = match parse_client_message(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Rejected line from {} ({} bytes max): {}", peer, MAX_COMMAND_SIZE, e);
            return ServerMessage::Error { message: e.to_string() };
        }
    };

    let mut ctx = context.lock().await;
    match message {
        ClientMessage::Command(request) => {
            let requested_by = request
                .requested_by()
                .map(str::to_string)
                .unwrap_or_else(|| format!("tcp:{}", peer));

            match ctx.execute(&request.command, request.params, &requested_by) {
                Ok(correlation_id) => {
                    info!("📨 {} from {} dispatched as {}", request.command, requested_by, correlation_id);
                    ServerMessage::Dispatched { correlation_id }
                }
                Err(e) => {
                    warn!("Command {} from {} rejected: {}", request.command, requested_by, e);
                    ServerMessage::Error { message: e.to_string() }
                }
            }
        }
        ClientMessage::SetPolicy { set_policy } => match ctx.set_policy(set_policy) {
            Ok(_) => {
                debug!("Policy updated by {}", peer);
                ServerMessage::PolicyUpdated { policy: set_policy }
            }
            Err(e) => ServerMessage::Error { message: e.to_string() },
        },
    }
}

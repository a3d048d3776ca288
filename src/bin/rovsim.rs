use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use rovsim::protocol::{parse_server_message, AckTracker, ClientCommand, ServerMessage};
use rovsim::{Ack, CommandParams, MockPolicy, TelemetrySnapshot};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_TIMEOUT_SECS: &str = "5";

struct Options<'a> {
    host: &'a str,
    port: u16,
    format: &'a str,
    verbose: bool,
    timeout: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("rovsim")
        .version("0.1.0")
        .author("Vehicle Systems Engineering Team")
        .about("🚗 Remote vehicle simulator client")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("timeout")
                .short("t")
                .long("timeout")
                .value_name("SECONDS")
                .help("How long to wait for the acknowledgment")
                .takes_value(true)
                .default_value(DEFAULT_TIMEOUT_SECS)
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose output")
                .global(true),
        )
        .subcommand(SubCommand::with_name("start").about("▶️  Start the vehicle"))
        .subcommand(SubCommand::with_name("stop").about("⏹️  Stop the vehicle"))
        .subcommand(
            SubCommand::with_name("drive")
                .about("🕹️  Set drive mode, throttle and steering")
                .long_about("Sends set_controls. Omitted values keep the vehicle's current setting.")
                .arg(
                    Arg::with_name("mode")
                        .short("m")
                        .long("mode")
                        .value_name("MODE")
                        .help("Drive mode (manual, cruise, sport, eco)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("throttle")
                        .long("throttle")
                        .value_name("0..1")
                        .help("Throttle position")
                        .takes_value(true)
                        .validator(validate_number),
                )
                .arg(
                    Arg::with_name("steering")
                        .long("steering")
                        .value_name("-1..1")
                        .help("Steering position")
                        .takes_value(true)
                        .allow_hyphen_values(true)
                        .validator(validate_number),
                ),
        )
        .subcommand(
            SubCommand::with_name("aux")
                .about("💡 Set lights and horn")
                .arg(
                    Arg::with_name("lights")
                        .long("lights")
                        .value_name("LIGHTS")
                        .help("Lights (off, low, high, hazard)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("horn")
                        .long("horn")
                        .value_name("STATE")
                        .help("Horn state")
                        .takes_value(true)
                        .possible_values(&["on", "off"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("estop")
                .about("🛑 Emergency stop")
                .arg(
                    Arg::with_name("reason")
                        .long("reason")
                        .value_name("TEXT")
                        .help("Reason, informational only")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("firmware")
                .about("📦 Update the firmware version label")
                .arg(Arg::with_name("version").help("New version").required(true)),
        )
        .subcommand(
            SubCommand::with_name("raw")
                .about("🧪 Send an arbitrary command")
                .arg(Arg::with_name("command").help("Command name").required(true))
                .arg(Arg::with_name("params").help("Parameters as a JSON object").required(false)),
        )
        .subcommand(
            SubCommand::with_name("policy")
                .about("🎲 Set simulated latency and failure rate")
                .arg(Arg::with_name("min").help("Minimum latency in ms").required(true).validator(validate_number))
                .arg(Arg::with_name("max").help("Maximum latency in ms").required(true).validator(validate_number))
                .arg(Arg::with_name("rate").help("Failure rate in [0, 1]").required(true).validator(validate_number)),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📈 Monitor live telemetry and acks")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Monitor duration in seconds (default: infinite)")
                        .takes_value(true)
                        .validator(validate_number),
                ),
        )
        .get_matches();

    let options = Options {
        host: matches.value_of("host").unwrap_or(DEFAULT_HOST),
        port: matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?,
        format: matches.value_of("format").unwrap_or("table"),
        verbose: matches.is_present("verbose"),
        timeout: Duration::from_secs_f64(
            matches
                .value_of("timeout")
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .parse::<f64>()?
                .max(0.0),
        ),
    };

    if options.verbose {
        println!("{}", "🚗 rovsim - Remote Vehicle Simulator".bright_blue().bold());
        println!("{} {}:{}", "Connecting to".dimmed(), options.host, options.port);
    }

    match matches.subcommand() {
        ("start", _) => run_command(&options, "start", CommandParams::new()).await?,
        ("stop", _) => run_command(&options, "stop", CommandParams::new()).await?,
        ("drive", Some(sub)) => run_command(&options, "set_controls", drive_params(sub)?).await?,
        ("aux", Some(sub)) => run_command(&options, "set_aux", aux_params(sub)).await?,
        ("estop", Some(sub)) => {
            let mut params = CommandParams::new();
            if let Some(reason) = sub.value_of("reason") {
                params.insert("reason".to_string(), json!(reason));
            }
            run_command(&options, "emergency_stop", params).await?
        }
        ("firmware", Some(sub)) => {
            let mut params = CommandParams::new();
            params.insert("version".to_string(), json!(sub.value_of("version").unwrap_or_default()));
            run_command(&options, "firmware_update", params).await?
        }
        ("raw", Some(sub)) => {
            let params = match sub.value_of("params") {
                Some(text) => serde_json::from_str::<CommandParams>(text)?,
                None => CommandParams::new(),
            };
            run_command(&options, sub.value_of("command").unwrap_or_default(), params).await?
        }
        ("policy", Some(sub)) => {
            let policy = MockPolicy::new(
                sub.value_of("min").unwrap_or("0").parse()?,
                sub.value_of("max").unwrap_or("0").parse()?,
                sub.value_of("rate").unwrap_or("0").parse()?,
            )?;
            run_policy(&options, policy).await?
        }
        ("monitor", Some(sub)) => {
            let duration = sub.value_of("duration").map(str::parse::<f64>).transpose()?;
            handle_monitor(&options, duration.map(|secs| Duration::from_secs_f64(secs.max(0.0)))).await?
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

fn validate_number(value: String) -> Result<(), String> {
    value
        .parse::<f64>()
        .map(|_| ())
        .map_err(|_| format!("'{}' is not a number", value))
}

fn drive_params(matches: &ArgMatches<'_>) -> Result<CommandParams, Box<dyn std::error::Error>> {
    let mut params = CommandParams::new();
    if let Some(mode) = matches.value_of("mode") {
        params.insert("mode".to_string(), json!(mode));
    }
    if let Some(throttle) = matches.value_of("throttle") {
        params.insert("throttle".to_string(), json!(throttle.parse::<f64>()?));
    }
    if let Some(steering) = matches.value_of("steering") {
        params.insert("steering".to_string(), json!(steering.parse::<f64>()?));
    }
    Ok(params)
}

fn aux_params(matches: &ArgMatches<'_>) -> CommandParams {
    let mut params = CommandParams::new();
    if let Some(lights) = matches.value_of("lights") {
        params.insert("lights".to_string(), json!(lights));
    }
    if let Some(horn) = matches.value_of("horn") {
        params.insert("horn".to_string(), json!(horn == "on"));
    }
    params
}

async fn connect(options: &Options<'_>) -> Result<TcpStream, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", options.host, options.port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to simulator at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin rovsim-simulator".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            Err(e.into())
        }
    }
}

/// Read server messages until one satisfies `select`.
async fn next_matching<T>(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    format: &str,
    mut select: impl FnMut(ServerMessage) -> Option<T>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    while let Some(line) = lines.next_line().await? {
        let message = match parse_server_message(&line) {
            Ok(message) => message,
            Err(_) => continue,
        };
        let is_telemetry = matches!(message, ServerMessage::Telemetry(_));
        if format == "json" && !is_telemetry {
            println!("{}", line);
        }
        if let Some(found) = select(message) {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

async fn run_command(options: &Options<'_>, command: &str, params: CommandParams) -> Result<(), Box<dyn std::error::Error>> {
    let stream = connect(options).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let request = ClientCommand {
        command: command.to_string(),
        params,
        meta: None,
    };
    let mut payload = serde_json::to_string(&request)?;
    payload.push('\n');

    if options.verbose {
        println!("{} {}", "Sending".dimmed(), payload.trim_end().dimmed());
    }

    let sent_at = Instant::now();
    writer.write_all(payload.as_bytes()).await?;

    let outcome = tokio::time::timeout(options.timeout, await_ack(&mut lines, options)).await;

    match outcome {
        Ok(Ok(Ok(ack))) => print_ack(&ack, sent_at.elapsed(), options.format),
        Ok(Ok(Err(message))) => {
            println!("{} {} rejected: {}", "❌".red(), command.bright_white(), message.bright_red());
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            println!("{} No ack for {} within {:?}", "⏰".yellow(), command.bright_white(), options.timeout);
            println!("{} The command may still complete on the simulator", "💡".yellow());
        }
    }

    Ok(())
}

/// Wait for the dispatch reply and the ack carrying its correlation id, in either order.
async fn await_ack(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    options: &Options<'_>,
) -> Result<Result<Ack, String>, Box<dyn std::error::Error>> {
    let mut tracker = AckTracker::new();

    let outcome = next_matching(lines, options.format, |message| {
        let dispatched = matches!(message, ServerMessage::Dispatched { .. }) && tracker.correlation_id().is_none();
        let outcome = tracker.observe(message);
        if dispatched && options.verbose {
            if let Some(correlation_id) = tracker.correlation_id() {
                println!("{} {}", "Dispatched as".dimmed(), correlation_id.as_str().bright_white());
            }
        }
        outcome
    })
    .await?;

    outcome.ok_or_else(|| "server closed connection".into())
}

async fn run_policy(options: &Options<'_>, policy: MockPolicy) -> Result<(), Box<dyn std::error::Error>> {
    let stream = connect(options).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let mut payload = json!({ "set_policy": policy }).to_string();
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;

    let reply = tokio::time::timeout(
        options.timeout,
        next_matching(&mut lines, options.format, |message| match message {
            ServerMessage::PolicyUpdated { policy } => Some(Ok(policy)),
            ServerMessage::Error { message } => Some(Err(message)),
            _ => None,
        }),
    )
    .await;

    if options.format == "json" {
        return Ok(());
    }

    match reply {
        Ok(Ok(Some(Ok(policy)))) => println!(
            "{} Policy set: {}..{} ms, failure rate {}",
            "✅".green(),
            policy.min_latency_ms.to_string().bright_cyan(),
            policy.max_latency_ms.to_string().bright_cyan(),
            policy.failure_rate.to_string().bright_cyan()
        ),
        Ok(Ok(Some(Err(message)))) => println!("{} Policy rejected: {}", "❌".red(), message.bright_red()),
        Ok(Ok(None)) => println!("{} Server closed connection", "❌".red()),
        Ok(Err(e)) => return Err(e),
        Err(_) => println!("{} No reply within {:?}", "⏰".yellow(), options.timeout),
    }

    Ok(())
}

fn print_ack(ack: &Ack, round_trip: Duration, format: &str) {
    match format {
        "json" => {}
        "compact" => {
            if ack.accepted {
                println!("{}", "OK".bright_green());
            } else {
                println!("{}", "FAILED".bright_red());
            }
        }
        _ => {
            if ack.accepted {
                println!("{} {} acknowledged: {}", "✅".green(), ack.command.bright_white(), ack.message.bright_green());
            } else {
                println!("{} {} failed: {}", "❌".red(), ack.command.bright_white(), ack.message.bright_red());
            }
            println!("   {} {}", "Correlation:".bright_white(), ack.correlation_id.as_str());
            println!("   {} {} ms", "Round trip:".bright_white(), round_trip.as_millis().to_string().bright_cyan());
            let result = &ack.result;
            println!(
                "   {} {} | mode {} | throttle {:.2} | steering {:.2} | lights {} | fw {}",
                "Vehicle:".bright_white(),
                if result.running { "RUNNING".bright_green() } else { "STOPPED".yellow() },
                result.mode.as_str(),
                result.throttle,
                result.steering,
                result.lights.as_str(),
                result.firmware
            );
        }
    }
}

async fn handle_monitor(options: &Options<'_>, duration: Option<Duration>) -> Result<(), Box<dyn std::error::Error>> {
    let stream = connect(options).await?;
    let (reader, _writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    if options.format == "table" {
        println!("{}", "📡 Monitoring vehicle telemetry (Press Ctrl+C to stop)...".bright_blue().bold());
        println!(
            "{}",
            "  Seq │ Status  │ Mode    │ Speed km/h │ Battery │ Temp °C │ Throttle │ Steering │ Position".bright_white()
        );
    }

    let deadline = duration.map(|duration| Instant::now() + duration);
    loop {
        let next = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, lines.next_line()).await {
                    Ok(next) => next?,
                    Err(_) => break,
                }
            }
            None => lines.next_line().await?,
        };
        let Some(line) = next else { break };

        if options.format == "json" {
            println!("{}", line);
            continue;
        }

        match parse_server_message(&line) {
            Ok(ServerMessage::Telemetry(snapshot)) => print_telemetry(&snapshot, options.format),
            Ok(ServerMessage::Ack(ack)) if options.format == "table" => {
                let outcome = if ack.accepted { "ACK".bright_green() } else { "NACK".bright_red() };
                println!("  {} {} {} ({})", outcome, ack.command.bright_white(), ack.correlation_id.as_str(), ack.message);
            }
            Ok(_) => {}
            Err(e) => {
                if options.verbose {
                    eprintln!("{} {}", "Unparseable line:".yellow(), e);
                }
            }
        }
    }

    Ok(())
}

fn print_telemetry(snapshot: &TelemetrySnapshot, format: &str) {
    let metrics = &snapshot.metrics;
    if format == "compact" {
        println!(
            "#{} {} {:.1}km/h {:.1}% {:.1}C",
            snapshot.seq, snapshot.mode.as_str(), metrics.speed, metrics.battery, metrics.temperature
        );
        return;
    }

    let status = match snapshot.status {
        rovsim::vehicle::VehicleStatus::Running => "running".bright_green(),
        rovsim::vehicle::VehicleStatus::Stopped => "stopped".yellow(),
    };
    let battery = format!("{:>6.1}%", metrics.battery);
    let battery = if metrics.battery > 20.0 { battery.green() } else { battery.red() };
    let temperature = format!("{:>7.1}", metrics.temperature);
    let temperature = if metrics.temperature > 70.0 { temperature.red() } else { temperature.white() };

    println!(
        "{:>5} │ {:<7} │ {:<7} │ {:>10.2} │ {} │ {} │ {:>8.2} │ {:>8.2} │ {:.6}, {:.6}",
        snapshot.seq,
        status,
        snapshot.mode.as_str(),
        metrics.speed,
        battery,
        temperature,
        snapshot.throttle,
        snapshot.steering,
        snapshot.gps.lat,
        snapshot.gps.lon
    );
}

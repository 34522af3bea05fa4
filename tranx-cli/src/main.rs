//! The tranx command-line client.
//!
//! `tranx send <file>` offers a file and prints the transfer password;
//! `tranx receive <password>` pulls it on another machine.

use std::path::PathBuf;
use std::process::ExitCode;

use tokio::fs::File;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

use tranx_core::Password;
use tranx_transport::{ClientConfig, Payload, Progress, Receiver, Sender, TransferState};

const USAGE: &str = "\
usage:
  tranx send <file> [--tranx <host>] [--port <port>]
  tranx receive <password> [--tranx <host>] [--port <port>] [--relay] [--output <file>]

options:
  --tranx <host>   tranx server hostname (default: localhost)
  --port <port>    tranx server port (default: 80)
  --relay          skip the direct-connection probe
  --output <file>  where to write the received payload (default: the
                   original name is not known, so tranx-received)
";

#[derive(Debug)]
enum Command {
    Send { file: PathBuf },
    Receive { password: String, output: PathBuf },
}

#[derive(Debug)]
struct Args {
    command: Command,
    tranx_address: String,
    tranx_port: u16,
    force_relay: bool,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command_name) = args.first() else {
        return Err("missing command".into());
    };

    let mut positional: Option<String> = None;
    let mut tranx_address = "localhost".to_string();
    let mut tranx_port = tranx_core::DEFAULT_TRANX_PORT;
    let mut force_relay = false;
    let mut output: Option<PathBuf> = None;

    // minimal arg parsing
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tranx" if i + 1 < args.len() => {
                tranx_address = args[i + 1].clone();
                i += 1;
            }
            "--port" if i + 1 < args.len() => {
                tranx_port = args[i + 1]
                    .parse()
                    .map_err(|_| format!("bad port: {}", args[i + 1]))?;
                i += 1;
            }
            "--relay" => force_relay = true,
            "--output" if i + 1 < args.len() => {
                output = Some(PathBuf::from(&args[i + 1]));
                i += 1;
            }
            other if positional.is_none() && !other.starts_with("--") => {
                positional = Some(other.to_string());
            }
            other => return Err(format!("unexpected argument: {other}")),
        }
        i += 1;
    }

    let command = match command_name.as_str() {
        "send" => Command::Send {
            file: PathBuf::from(positional.ok_or("send needs a file")?),
        },
        "receive" => Command::Receive {
            password: positional.ok_or("receive needs a password")?,
            output: output.unwrap_or_else(|| PathBuf::from("tranx-received")),
        },
        other => return Err(format!("unknown command: {other}")),
    };

    Ok(Args {
        command,
        tranx_address,
        tranx_port,
        force_relay,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let mut config = ClientConfig::new(args.tranx_address.clone(), args.tranx_port);
    if args.force_relay {
        config = config.with_force_relay();
    }

    let result = match args.command {
        Command::Send { file } => send(config, file).await,
        Command::Receive { password, output } => receive(config, &password, output).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn send(config: ClientConfig, path: PathBuf) -> Result<(), String> {
    let file = File::open(&path)
        .await
        .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| format!("cannot stat {}: {e}", path.display()))?
        .len();

    let (sender, password) = Sender::connect(&config)
        .await
        .map_err(|e| e.to_string())?;

    println!("Transfer password: {password}");
    println!("On the other machine, run:");
    println!("  tranx receive {password}");

    let (payload_tx, payload_rx) = oneshot::channel();
    payload_tx
        .send(Payload {
            reader: Box::new(file),
            size,
        })
        .map_err(|_| "payload handoff failed".to_string())?;

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(progress_rx, size));

    sender
        .transfer(payload_rx, Some(progress_tx))
        .await
        .map_err(|e| e.to_string())?;
    let _ = reporter.await;

    println!("Sent {} ({} bytes)", path.display(), size);
    Ok(())
}

async fn receive(config: ClientConfig, password: &str, output: PathBuf) -> Result<(), String> {
    let password = Password::parse(password).map_err(|e| e.to_string())?;

    let receiver = Receiver::connect(&config, password)
        .await
        .map_err(|e| e.to_string())?;
    let size = receiver.payload_size();
    if receiver.used_relay() {
        println!("Receiving {size} bytes through the relay");
    } else {
        println!("Receiving {size} bytes directly");
    }

    let mut file = File::create(&output)
        .await
        .map_err(|e| format!("cannot create {}: {e}", output.display()))?;

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(progress_rx, size));

    let received = receiver
        .receive(&mut file, Some(progress_tx))
        .await
        .map_err(|e| e.to_string())?;
    let _ = reporter.await;

    println!("Wrote {} ({} bytes)", output.display(), received);
    Ok(())
}

/// Prints coarse progress, one line per whole-percent step.
async fn report_progress(mut updates: mpsc::UnboundedReceiver<Progress>, size: u64) {
    let mut last_percent = 0u32;
    while let Some(update) = updates.recv().await {
        if update.state != TransferState::Initial {
            continue;
        }
        let percent = (update.ratio * 100.0) as u32;
        if percent >= last_percent + 10 || (percent == 100 && last_percent < 100) {
            println!("  {percent}% of {size} bytes");
            last_percent = percent;
        }
    }
}

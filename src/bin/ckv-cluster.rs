use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use ckv::client::Player;
use ckv::{ClusterSettings, ReplicaServer, Scheme};
use futures::future::join_all;
use rand::seq::SliceRandom;
use tokio::signal::ctrl_c;
use tracing::{error, info};

/// Launch every replica of a local cluster in this process, then optionally replay a
/// command file with a number of clients.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    /// JSON settings file. Defaults are used for anything it leaves out.
    #[clap(long, env = "CKV_CONFIG")]
    config: Option<PathBuf>,

    /// Prompted for on stdin when omitted.
    #[clap(long, env = "CKV_SCHEME")]
    scheme: Option<Scheme>,

    #[clap(long)]
    replicas: Option<u16>,

    #[clap(long)]
    clients: Option<u16>,

    /// Lines of `<client_id> <replica_id> <command...>`.
    #[clap(long)]
    command_file: Option<PathBuf>,

    /// Stop once the command file has been played instead of waiting for Ctrl-C.
    #[clap(long)]
    exit_after_play: bool,

    #[clap(long, default_value = "info", env = "CKV_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,
}

fn prompt_scheme() -> anyhow::Result<Scheme> {
    let choices = Scheme::value_variants();
    let stdin = std::io::stdin();
    loop {
        println!("Choose consistency scheme:");
        for (i, scheme) in choices.iter().enumerate() {
            println!("{}. {}", i + 1, scheme);
        }
        print!("Enter number: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            anyhow::bail!("no consistency scheme chosen");
        }
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => return Ok(choices[n - 1]),
            _ => println!("\nInvalid input\n"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    ckv::setup_logging(app.log_level)?;

    let mut settings = match &app.config {
        Some(path) => ClusterSettings::load(path)?,
        None => ClusterSettings::default(),
    };
    if let Some(n) = app.replicas {
        settings.num_replicas = n;
    }
    if let Some(n) = app.clients {
        settings.num_clients = n;
    }
    if app.command_file.is_some() {
        settings.client.command_file = app.command_file.clone();
    }

    let scheme = match app.scheme {
        Some(scheme) => scheme,
        None => prompt_scheme()?,
    };
    let addresses = settings.replica_addresses()?;
    let sequencer = match scheme {
        Scheme::Sequential => addresses.choose(&mut rand::thread_rng()).cloned(),
        _ => None,
    };

    info!(
        replicas = settings.num_replicas,
        "Starting distributed kv store with {scheme} consistency"
    );
    for index in 0..settings.num_replicas {
        let config = settings.replica_config(index, scheme, sequencer.clone())?;
        let server = ReplicaServer::bind(config).await?;
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Replica stopped: {e}");
            }
        });
    }
    if let Some(sequencer) = &sequencer {
        info!(%sequencer, "Sequencer chosen");
    }
    println!(
        "Snapshots are written to {}",
        settings.replica.output_location.display()
    );

    if let Some(file) = settings.client.command_file.clone() {
        let players = (0..settings.num_clients).map(|i| Player {
            client_id: format!("client_{i}"),
            replica_host: settings.replica.ip.clone(),
            base_port: settings.replica.port,
            pause: Duration::from_millis(settings.client.pause_ms),
            timeout: settings.timeout(),
        });
        let runs = players.map(|player| {
            let file = file.clone();
            async move {
                let responses = player.play_file(&file).await;
                (player.client_id, responses)
            }
        });
        for (client_id, responses) in join_all(runs).await {
            match responses {
                Ok(responses) => {
                    for (replica, response) in responses {
                        println!("{client_id} <- {replica}: {response}");
                    }
                }
                Err(e) => error!(client = client_id, "Unable to play commands: {e}"),
            }
        }
        if app.exit_after_play {
            return Ok(());
        }
    }

    match ctrl_c().await {
        Ok(_) => info!("Received shutdown signal"),
        Err(e) => error!("Error receiving Ctrl-C: {e}"),
    };
    Ok(())
}

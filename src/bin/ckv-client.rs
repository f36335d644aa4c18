use std::time::Duration;

use clap::Parser;
use ckv::client::{Action, Player};
use ckv::{transport, ReplicaAddr, KEY_NOT_FOUND};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    #[clap(name = "addr", global = true, long, default_value = "127.0.0.1:9500")]
    server: ReplicaAddr,

    #[clap(long, global = true, default_value = "5000", env = "CKV_TIMEOUT_MS")]
    timeout_ms: u64,

    #[clap(long, global = true, default_value = "warn", env = "CKV_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,

    #[clap(subcommand)]
    subcmd: Action,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = App::parse();
    ckv::setup_logging(cli.log_level)?;
    let timeout = Duration::from_millis(cli.timeout_ms);

    if let Action::Play {
        file,
        client_id,
        replica_host,
        base_port,
        pause_ms,
    } = cli.subcmd
    {
        let player = Player {
            client_id,
            replica_host,
            base_port,
            pause: Duration::from_millis(pause_ms),
            timeout,
        };
        for (replica, response) in player.play_file(&file).await? {
            println!("{replica}: {response}");
        }
        return Ok(());
    }

    let Some(request) = cli.subcmd.request() else {
        return Ok(());
    };
    let response = transport::send(&cli.server, &request, timeout).await?;
    match (&cli.subcmd, response.as_str()) {
        (Action::Remove { .. }, KEY_NOT_FOUND) => {
            eprintln!("{KEY_NOT_FOUND}");
            std::process::exit(1);
        }
        _ => println!("{response}"),
    }

    Ok(())
}

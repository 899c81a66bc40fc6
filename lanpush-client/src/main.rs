//! lanpush client — interactive entry point.
//!
//! ```text
//! lanpush-client --host 192.168.1.10 --name kitchen
//!
//! > send <user-uuid> <text...>     Deliver a message
//! > whoami                         Print this client's user id
//! > quit                           Disconnect and exit
//! ```

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use lanpush_client::PushClient;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lanpush-client", about = "lanpush interactive messaging client")]
struct Cli {
    /// Server host name or address.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Control channel port.
    #[arg(long, default_value_t = 4810)]
    control_port: u16,

    /// Notification channel port.
    #[arg(long, default_value_t = 4811)]
    notification_port: u16,

    /// Device name announced at registration.
    #[arg(short, long, default_value = "lanpush")]
    name: String,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (client, mut delivered) = PushClient::connect(
        &cli.host,
        cli.control_port,
        cli.notification_port,
        &cli.name,
    )
    .await?;
    println!("connected as {}", client.user());

    // Print deliveries as they arrive.
    tokio::spawn(async move {
        while let Some(text) = delivered.recv().await {
            println!("[{}] {}: {}", text.timestamp.format("%H:%M:%S"), text.sender, text.body);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let mut parts = line.trim().splitn(3, ' ');
        match parts.next() {
            Some("send") => {
                let (recipient, body) = match (parts.next(), parts.next()) {
                    (Some(id), Some(body)) => match id.parse::<Uuid>() {
                        Ok(recipient) => (recipient, body),
                        Err(_) => {
                            eprintln!("invalid user id: {id}");
                            continue;
                        }
                    },
                    _ => {
                        eprintln!("usage: send <user-uuid> <text...>");
                        continue;
                    }
                };
                if let Err(e) = client.send_text(recipient, body).await {
                    error!("send failed: {e}");
                }
            }
            Some("whoami") => println!("{}", client.user()),
            Some("quit") | Some("exit") => break,
            Some("") | None => {}
            Some(other) => eprintln!("unknown command: {other}"),
        }
    }

    client.disconnect().await;
    Ok(())
}

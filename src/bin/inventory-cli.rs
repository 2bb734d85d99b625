use std::path::PathBuf;
use std::time::Duration;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use droplet_balancer::health::probe::HealthProbe;
use droplet_balancer::load_balancer::inventory::read_droplets;
use droplet_balancer::Droplet;

#[derive(Parser)]
#[command(name = "inventory-cli")]
#[command(about = "Inspect droplet inventory files", long_about = None)]
struct Cli {
    /// Inventory file.
    #[arg(short, long, default_value = "inventory.toml")]
    inventory: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print all droplets as JSON
    List,
    /// Check that the inventory loads
    Validate,
    /// Run one health probe against every droplet
    Probe {
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let droplets = read_droplets(&cli.inventory)?;

    match cli.command {
        Commands::List => {
            let list: Vec<Value> = droplets.iter().map(droplet_json).collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Commands::Validate => {
            println!(
                "{}: {} droplet(s) OK",
                cli.inventory.display(),
                droplets.len()
            );
        }
        Commands::Probe { timeout_ms } => {
            let timeout = Duration::from_millis(timeout_ms);
            let mut results = Vec::with_capacity(droplets.len());
            for droplet in &droplets {
                let result = match droplet.health_url() {
                    None => json!({ "id": droplet.id, "name": droplet.name, "healthy": true, "detail": "no health url" }),
                    Some(url) => match HealthProbe::new(url, timeout)?.check().await {
                        Ok(status) => json!({ "id": droplet.id, "name": droplet.name, "healthy": true, "detail": status.as_u16() }),
                        Err(e) => json!({ "id": droplet.id, "name": droplet.name, "healthy": false, "detail": e.to_string() }),
                    },
                };
                results.push(result);
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}

fn droplet_json(droplet: &Droplet) -> Value {
    json!({
        "id": droplet.id,
        "name": droplet.name,
        "private-ip": droplet.private_ip,
        "server-host": droplet.server_host,
        "health-url": droplet.health_url,
        "started-time": droplet.started.to_rfc3339(),
    })
}

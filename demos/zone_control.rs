use control4_amp::{
    import_yaml, EntryStore, FlowStep, MemoryStore, Registry, UdpTransport, Zone, ZoneUpdate,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const SAMPLE_ZONES: &str = r#"
- name: Kitchen
  host: 192.168.1.50
  channel: 1
  source_list: [Tuner, TV, Server]
- name: Patio
  host: 192.168.1.50
  channel: 2
"#;

const HELP: &str = "commands: list | on N | off N | vol N LEVEL | up N | down N | mute N | unmute N | src N NAME | quit";

fn zone_at(zones: &[Zone], arg: Option<&str>) -> Option<Zone> {
    let index: usize = arg?.parse().ok()?;
    zones.get(index.checked_sub(1)?).cloned()
}

async fn run_command(zones: &[Zone], line: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(true);
    };

    if command == "quit" {
        return Ok(false);
    }
    if command == "list" {
        for (i, zone) in zones.iter().enumerate() {
            let snapshot = zone.snapshot();
            println!(
                "{}. {} [{}] {:?} vol {:.2}{} source {}",
                i + 1,
                snapshot.name,
                zone.key(),
                snapshot.power,
                snapshot.volume_level,
                if snapshot.muted { " (muted)" } else { "" },
                snapshot.source
            );
        }
        return Ok(true);
    }

    let Some(zone) = zone_at(zones, parts.next()) else {
        println!("{}", HELP);
        return Ok(true);
    };

    match command {
        "on" => zone.turn_on().await,
        "off" => zone.turn_off().await,
        "up" => zone.volume_up().await,
        "down" => zone.volume_down().await,
        "mute" => zone.mute_volume(true).await,
        "unmute" => zone.mute_volume(false).await,
        "vol" => {
            let level: f64 = parts.next().unwrap_or("0").parse()?;
            zone.set_volume_level(level).await;
        }
        "src" => {
            let name = parts.collect::<Vec<_>>().join(" ");
            zone.select_source(&name).await?;
        }
        _ => println!("{}", HELP),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("control4_amp=info".parse()?))
        .init();

    let zones_yaml = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE_ZONES.to_string(),
    };

    let store = Arc::new(MemoryStore::new());
    for step in import_yaml(store.clone(), &zones_yaml)? {
        if let FlowStep::Aborted(reason) = step {
            println!("Skipped a zone: {:?}", reason);
        }
    }

    let registry = Registry::new(Arc::new(UdpTransport::new()));
    let zones = registry.setup_all(store.as_ref()).await?;
    println!("{} zone(s) configured from {} entries", zones.len(), store.entries().len());
    println!("{}", HELP);

    let mut updates = registry.subscribe_updates();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match run_command(&zones, line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("Error: {}", e),
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(ZoneUpdate::StateChanged(snapshot)) => {
                        println!("{} -> {:?} vol {:.2} source {}", snapshot.name, snapshot.power, snapshot.volume_level, snapshot.source);
                    }
                    Ok(ZoneUpdate::RefreshFailed { reason, .. }) => println!("Refresh failed: {}", reason),
                    Err(e) => println!("Update error: {}", e),
                }
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}

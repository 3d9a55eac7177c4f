use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use alife_common::{SimulationConfig, WorldDescription};
use alife_engine::world_setup::populate;
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, trace, warn};

/// Headless runner for the artificial-life kernel.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config.toml file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Number of timesteps to run, overriding timing.total_steps
    #[arg(long)]
    steps: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting alife engine...");
    let config = SimulationConfig::load(&args.config)?;
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    let mut sim = populate(&config).context("Failed to build the initial world")?;
    debug!("Simulation Parameters: {:#?}", sim.params());

    let total_steps = args.steps.unwrap_or(config.timing.total_steps);
    let record_interval = config.timing.record_interval_steps;
    let base = &config.output.base_filename;

    let mut stats_writer = if config.output.save_stats {
        let filename = format!("{}_stats.csv", base);
        let writer = csv::Writer::from_path(&filename)
            .with_context(|| format!("Error creating statistics file '{}'", filename))?;
        info!("Writing statistics to {} every {} steps.", filename, record_interval);
        Some(writer)
    } else {
        None
    };
    if let Some(writer) = stats_writer.as_mut() {
        writer.serialize(sim.statistics())?;
    }

    info!("Starting simulation loop for {} steps...", total_steps);
    let start_time = Instant::now();

    for step in 0..total_steps {
        let step_start_time = Instant::now();
        if let Err(e) = sim.step() {
            error!("Error during simulation step {}: {}", step + 1, e);
            return Err(e).context("Simulation step failed");
        }
        let step_duration = step_start_time.elapsed();

        let is_record_step = (step + 1) % record_interval == 0;
        let is_last_step = step + 1 == total_steps;
        if is_record_step || is_last_step {
            let stats = sim.statistics();
            info!(
                "Step [{}/{}] | Clusters: {} | Cells: {} | Particles: {} | Tokens: {} | Step Time: {:6.2} ms",
                step + 1,
                total_steps,
                stats.cluster_count,
                stats.cell_count,
                stats.particle_count,
                stats.token_count,
                step_duration.as_secs_f64() * 1000.0
            );
            if let Some(writer) = stats_writer.as_mut() {
                writer.serialize(stats)?;
            }
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms",
                step + 1,
                total_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }

    info!("Simulation finished in {:.3} seconds.", start_time.elapsed().as_secs_f64());

    if let Some(mut writer) = stats_writer {
        writer.flush()?;
    }

    if config.output.save_snapshot {
        let format = config.output.format.as_deref().unwrap_or("json");
        save_snapshot(&sim.to_description(), base, format)?;
    } else {
        info!("Skipping final snapshot as per config (save_snapshot is false).");
    }

    info!("Simulation Complete.");
    Ok(())
}

/// Writes the final world in the configured format. Unknown formats fall
/// back to JSON.
fn save_snapshot(desc: &WorldDescription, base: &str, format: &str) -> Result<()> {
    match format {
        "bincode" => {
            let filename = format!("{}_snapshot.bin", base);
            let file = File::create(&filename).with_context(|| format!("Error creating '{}'", filename))?;
            bincode::serialize_into(BufWriter::new(file), desc)?;
            info!("Final snapshot saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshot.msgpack", base);
            let file = File::create(&filename).with_context(|| format!("Error creating '{}'", filename))?;
            rmp_serde::encode::write(&mut BufWriter::new(file), desc)?;
            info!("Final snapshot saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                warn!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshot.json", base);
            let file = File::create(&filename).with_context(|| format!("Error creating '{}'", filename))?;
            let mut out = BufWriter::new(file);
            serde_json::to_writer(&mut out, desc)?;
            out.flush()?;
            info!("Final snapshot saved to {}", filename);
        }
    }
    Ok(())
}

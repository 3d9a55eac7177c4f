use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

/// Smallest token memory that still holds every function's input/output slots.
pub const MIN_TOKEN_MEMORY_SIZE: usize = 64;

// Configuration for universe properties
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UniverseConfig {
    pub width: u32,
    pub height: u32,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub total_steps: u32,
    pub record_interval_steps: u32,
}

// Initial population, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub seed: u64,
    pub num_organisms: u32,
    pub cells_per_organism: u32,
    pub cell_energy: f32,
    pub token_energy: f32,
    #[serde(default = "default_tokens_per_organism")]
    pub tokens_per_organism: u32,
    #[serde(default)]
    pub num_particles: u32,
    #[serde(default = "default_particle_energy")]
    pub particle_energy: f32,
    #[serde(default = "default_velocity_std_dev")]
    pub velocity_std_dev: f32,
}

// Physical constants of the kernel, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellParamsConfig {
    #[serde(default = "default_internal_to_kinetic_energy")]
    pub internal_to_kinetic_energy: f32,
    #[serde(default = "default_min_token_energy")]
    pub min_token_energy: f32,
    #[serde(default = "default_cell_min_energy")]
    pub cell_min_energy: f32,
    #[serde(default = "default_cell_creation_energy")]
    pub cell_creation_energy: f32,
    #[serde(default = "default_cell_max_connections")]
    pub cell_max_connections: u8,
    #[serde(default = "default_max_token_branch_number")]
    pub max_token_branch_number: u8,
    #[serde(default = "default_max_tokens_per_cell")]
    pub max_tokens_per_cell: u8,
    #[serde(default = "default_token_memory_size")]
    pub token_memory_size: usize,
    #[serde(default = "default_cell_memory_size")]
    pub cell_memory_size: usize,
    #[serde(default = "default_sensor_range")]
    pub sensor_range: f32,
    #[serde(default = "default_weapon_strength")]
    pub weapon_strength: f32,
    #[serde(default = "default_computer_max_instructions")]
    pub computer_max_instructions: usize,
    #[serde(default)]
    pub radiation_probability: f32,
    #[serde(default = "default_radiation_energy_fraction")]
    pub radiation_energy_fraction: f32,
    #[serde(default = "default_check_energy_conservation")]
    pub check_energy_conservation: bool,
}

impl Default for CellParamsConfig {
    fn default() -> Self {
        CellParamsConfig {
            internal_to_kinetic_energy: default_internal_to_kinetic_energy(),
            min_token_energy: default_min_token_energy(),
            cell_min_energy: default_cell_min_energy(),
            cell_creation_energy: default_cell_creation_energy(),
            cell_max_connections: default_cell_max_connections(),
            max_token_branch_number: default_max_token_branch_number(),
            max_tokens_per_cell: default_max_tokens_per_cell(),
            token_memory_size: default_token_memory_size(),
            cell_memory_size: default_cell_memory_size(),
            sensor_range: default_sensor_range(),
            weapon_strength: default_weapon_strength(),
            computer_max_instructions: default_computer_max_instructions(),
            radiation_probability: 0.0,
            radiation_energy_fraction: default_radiation_energy_fraction(),
            check_energy_conservation: default_check_energy_conservation(),
        }
    }
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_stats: bool,
    pub save_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub universe: UniverseConfig,
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub cell_params: CellParamsConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.universe.width == 0 || self.universe.height == 0 {
            anyhow::bail!("universe width and height must be positive.");
        }
        if self.timing.record_interval_steps == 0 {
            anyhow::bail!("record_interval_steps must be greater than 0.");
        }
        let cp = &self.cell_params;
        if cp.internal_to_kinetic_energy <= 0.0 {
            anyhow::bail!("internal_to_kinetic_energy must be positive.");
        }
        if cp.min_token_energy < 0.0 || cp.cell_min_energy < 0.0 || cp.cell_creation_energy <= 0.0 {
            anyhow::bail!("energy thresholds must be non-negative and cell_creation_energy positive.");
        }
        if cp.max_token_branch_number == 0 {
            anyhow::bail!("max_token_branch_number must be at least 1.");
        }
        if cp.max_tokens_per_cell == 0 {
            anyhow::bail!("max_tokens_per_cell must be at least 1.");
        }
        if cp.token_memory_size < MIN_TOKEN_MEMORY_SIZE || cp.token_memory_size > 256 {
            anyhow::bail!("token_memory_size must lie in [{}, 256].", MIN_TOKEN_MEMORY_SIZE);
        }
        if cp.cell_memory_size == 0 || cp.cell_memory_size > 256 {
            anyhow::bail!("cell_memory_size must lie in [1, 256].");
        }
        if !(0.0..=1.0).contains(&cp.radiation_probability)
            || !(0.0..=1.0).contains(&cp.radiation_energy_fraction)
            || !(0.0..=1.0).contains(&cp.weapon_strength)
        {
            anyhow::bail!("probabilities and fractions must lie in [0, 1].");
        }
        let ic = &self.initial_conditions;
        if ic.cells_per_organism == 0 && ic.num_organisms > 0 {
            anyhow::bail!("cells_per_organism must be greater than 0.");
        }
        if ic.cell_energy < cp.cell_min_energy {
            anyhow::bail!("initial cell_energy is below cell_min_energy; organisms would decay immediately.");
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let cp = &self.cell_params;
        let width = self.universe.width;
        let height = self.universe.height;

        SimParams {
            // World & Grid: one grid slot per unit square
            world_width: width as f32,
            world_height: height as f32,
            grid_dim_x: width,
            grid_dim_y: height,
            num_grid_cells: width * height,
            seed: self.initial_conditions.seed,
            internal_to_kinetic_energy: cp.internal_to_kinetic_energy,
            min_token_energy: cp.min_token_energy,
            cell_min_energy: cp.cell_min_energy,
            cell_creation_energy: cp.cell_creation_energy,
            cell_max_connections: cp.cell_max_connections,
            max_token_branch_number: cp.max_token_branch_number,
            max_tokens_per_cell: cp.max_tokens_per_cell,
            token_memory_size: cp.token_memory_size,
            cell_memory_size: cp.cell_memory_size,
            sensor_range: cp.sensor_range,
            weapon_strength: cp.weapon_strength,
            computer_max_instructions: cp.computer_max_instructions,
            radiation_probability: cp.radiation_probability,
            radiation_energy_fraction: cp.radiation_energy_fraction,
            check_energy_conservation: cp.check_energy_conservation,
        }
    }
}

fn default_tokens_per_organism() -> u32 {
    1
}

fn default_particle_energy() -> f32 {
    20.0
}

fn default_velocity_std_dev() -> f32 {
    0.05
}

fn default_internal_to_kinetic_energy() -> f32 {
    1.0
}

fn default_min_token_energy() -> f32 {
    3.0
}

fn default_cell_min_energy() -> f32 {
    50.0
}

fn default_cell_creation_energy() -> f32 {
    100.0
}

fn default_cell_max_connections() -> u8 {
    6
}

fn default_max_token_branch_number() -> u8 {
    6
}

fn default_max_tokens_per_cell() -> u8 {
    5
}

fn default_token_memory_size() -> usize {
    256
}

fn default_cell_memory_size() -> usize {
    8
}

fn default_sensor_range() -> f32 {
    100.0
}

fn default_weapon_strength() -> f32 {
    0.1
}

fn default_computer_max_instructions() -> usize {
    15
}

fn default_radiation_energy_fraction() -> f32 {
    0.01
}

fn default_check_energy_conservation() -> bool {
    true
}

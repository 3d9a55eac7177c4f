use std::collections::VecDeque;

use alife_common::WorldDescription;
use log::{debug, error};

use crate::error::KernelError;
use crate::simulation::Simulation;

/// Run/pause switch around a simulation, with a bounded history of
/// descriptions for stepping backwards.
pub struct SimulationController {
    simulation: Simulation,
    running: bool,
    history: VecDeque<WorldDescription>,
    history_limit: usize,
}

impl SimulationController {
    /// A paused controller keeping at most `history_limit` past worlds.
    pub fn new(simulation: Simulation, history_limit: usize) -> Self {
        Self { simulation, running: false, history: VecDeque::new(), history_limit }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn set_run(&mut self, run: bool) {
        self.running = run;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Advances one step while running. Returns whether a step was taken.
    pub fn update(&mut self) -> Result<bool, KernelError> {
        if !self.running {
            return Ok(false);
        }
        self.step_forward()?;
        Ok(true)
    }

    /// Records the current world, then advances it by one step.
    ///
    /// A failed step rolls the world back to the recorded description and
    /// pauses the controller before the error is handed on.
    pub fn step_forward(&mut self) -> Result<(), KernelError> {
        let before = self.simulation.to_description();
        match self.simulation.step() {
            Ok(()) => {
                if self.history_limit > 0 {
                    if self.history.len() == self.history_limit {
                        self.history.pop_front();
                    }
                    self.history.push_back(before);
                }
                Ok(())
            }
            Err(e) => {
                error!("Step failed at timestep {}, rolling back: {}", before.timestep, e);
                self.running = false;
                self.simulation = Simulation::from_description(&before, self.simulation.params())?;
                Err(e)
            }
        }
    }

    /// Goes back to the most recently recorded world. Returns false when
    /// there is no history left.
    pub fn step_backward(&mut self) -> Result<bool, KernelError> {
        let Some(previous) = self.history.pop_back() else {
            return Ok(false);
        };
        self.simulation = Simulation::from_description(&previous, self.simulation.params())?;
        debug!("Stepped back to timestep {}", self.simulation.timestep());
        Ok(true)
    }
}

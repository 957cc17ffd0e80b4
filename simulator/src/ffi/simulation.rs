//! PyO3 wrapper for Scheduler
//!
//! This module provides the Python interface to the Rust scheduler.

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use super::types::{
    parse_scenario, run_summary_to_py, state_to_string, tick_report_to_py, to_py_err,
    world_to_py, world_value_to_py,
};
use crate::models::agent::AgentId;
use crate::scenario::Scenario;
use crate::scheduler::checkpoint::StateSnapshot;
use crate::scheduler::engine::Scheduler;

/// Python wrapper for the Rust scheduler
///
/// # Example (from Python)
///
/// ```python
/// from econ_simulator_core_rs import Simulation
///
/// sim = Simulation.new({
///     "config": {"max_ticks": 50, "seed": 7, "observed_keys": ["price.grain"]},
///     "agents": [
///         {"kind": "price_setter", "quotes": {"grain": 1.0}},
///         {"kind": "trader", "demand": {"grain": {"intercept": 10.0, "slope": 1.0}}},
///         {"kind": "trader", "demand": {"grain": {"intercept": -2.0, "slope": 1.0}}},
///     ],
/// })
/// summary = sim.run()
/// print(sim.world()["price.grain"], summary["halt_reason"])
/// ```
#[pyclass(name = "Simulation")]
pub struct PySimulation {
    inner: Scheduler,
    scenario: Scenario,
}

#[pymethods]
impl PySimulation {
    /// Create a simulation from a scenario dict
    ///
    /// # Errors
    ///
    /// Raises ValueError if the scenario is malformed or invalid.
    #[staticmethod]
    fn new(scenario: &Bound<'_, PyDict>) -> PyResult<Self> {
        let scenario = parse_scenario(scenario)?;
        let inner = scenario
            .build()
            .map_err(|e| to_py_err("Failed to create simulation", e))?;
        Ok(PySimulation { inner, scenario })
    }

    /// Create a simulation from a scenario JSON string
    #[staticmethod]
    fn from_json(scenario_json: &str) -> PyResult<Self> {
        let scenario =
            Scenario::from_json(scenario_json).map_err(|e| to_py_err("Invalid scenario", e))?;
        let inner = scenario
            .build()
            .map_err(|e| to_py_err("Failed to create simulation", e))?;
        Ok(PySimulation { inner, scenario })
    }

    /// Resume a simulation from `snapshot_json()` output
    #[staticmethod]
    fn restore(scenario: &Bound<'_, PyDict>, snapshot_json: &str) -> PyResult<Self> {
        let scenario = parse_scenario(scenario)?;
        let snapshot =
            StateSnapshot::from_json(snapshot_json).map_err(|e| to_py_err("Invalid snapshot", e))?;
        let inner = scenario
            .restore(snapshot)
            .map_err(|e| to_py_err("Failed to restore simulation", e))?;
        Ok(PySimulation { inner, scenario })
    }

    /// Execute one simulation tick
    ///
    /// # Returns
    ///
    /// Dictionary containing tick results:
    /// - `tick`: Tick number
    /// - `delivered`: Messages placed in inboxes
    /// - `steps`: Step invocations, cascade rounds included
    /// - `cascade_rounds`: Zero-delay rounds after the regular round
    /// - `writes`: World deltas committed
    /// - `sent`: Messages sequenced onto the bus
    /// - `retired`: Ids of agents that retired
    /// - `halted`: Halt reason if this tick halted the simulation, else None
    ///
    /// # Errors
    ///
    /// Raises RuntimeError if the tick aborts or the simulation is halted.
    fn tick(&mut self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        let report = self
            .inner
            .tick()
            .map_err(|e| to_py_err("Tick execution failed", e))?;
        tick_report_to_py(py, &report)
    }

    /// Run until halted; aborted ticks are listed under `aborted`
    fn run(&mut self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        let summary = self
            .inner
            .run()
            .map_err(|e| to_py_err("Run failed", e))?;
        run_summary_to_py(py, &summary)
    }

    /// Stop at the current tick boundary
    fn halt(&mut self) {
        self.inner.halt();
    }

    fn current_tick(&self) -> u64 {
        self.inner.current_tick()
    }

    /// "idle", "running", or "halted: <reason>"
    fn state(&self) -> String {
        state_to_string(self.inner.state())
    }

    /// Copy of the committed world state
    fn world(&self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        world_to_py(py, self.inner.world())
    }

    /// Recorded `(tick, value)` points for an observed world key
    fn series(&self, py: Python<'_>, key: &str) -> PyResult<Py<PyList>> {
        let list = PyList::empty_bound(py);
        for (tick, value) in self.inner.outputs().series(key) {
            list.append((*tick, world_value_to_py(py, value)))?;
        }
        Ok(list.unbind())
    }

    /// Remove an agent between ticks
    ///
    /// # Errors
    ///
    /// Raises RuntimeError if no live agent has this id.
    fn remove_agent(&mut self, agent_id: u64) -> PyResult<()> {
        self.inner
            .remove_agent(AgentId::new(agent_id))
            .map(|_| ())
            .map_err(|e| to_py_err("Failed to remove agent", e))
    }

    /// Live agent ids in ascending order
    fn agent_ids(&self) -> Vec<u64> {
        self.inner.agent_ids().iter().map(|id| id.value()).collect()
    }

    fn event_count(&self) -> usize {
        self.inner.event_log().len()
    }

    /// Serialize the current state for `Simulation.restore`
    fn snapshot_json(&self) -> PyResult<String> {
        self.inner
            .snapshot()
            .and_then(|snapshot| snapshot.to_json())
            .map_err(|e| to_py_err("Snapshot failed", e))
    }

    /// Scenario this simulation was built from, as JSON
    fn scenario_json(&self) -> PyResult<String> {
        self.scenario
            .to_json()
            .map_err(|e| to_py_err("Scenario serialization failed", e))
    }
}

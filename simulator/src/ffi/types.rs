//! Type conversion utilities for FFI boundary
//!
//! Converts between Rust types and PyO3-compatible types (PyDict, PyList, etc.)

use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyTuple};
use std::collections::BTreeMap;

use crate::core::error::SimulationError;
use crate::models::world::{WorldState, WorldValue};
use crate::scenario::{AgentSpec, Scenario};
use crate::scheduler::config::{SimulationConfig, DEFAULT_MAX_CASCADE_DEPTH};
use crate::scheduler::engine::{RunSummary, SchedulerState, TickReport};

// ========================================================================
// PyDict Extraction Helpers
// ========================================================================

fn value_error(msg: impl Into<String>) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(msg.into())
}

/// Extract a required field from a Python dict with clear error messages.
///
/// # Errors
/// Returns PyValueError if the field is missing; conversion errors pass
/// through.
fn extract_required<T>(dict: &Bound<'_, PyDict>, key: &str) -> PyResult<T>
where
    T: for<'py> FromPyObject<'py>,
{
    dict.get_item(key)?
        .ok_or_else(|| value_error(format!("Missing required field '{}'", key)))?
        .extract()
}

/// Extract an optional field from a Python dict.
///
/// Missing keys and `None` both give `Ok(None)`.
fn extract_optional<T>(dict: &Bound<'_, PyDict>, key: &str) -> PyResult<Option<T>>
where
    T: for<'py> FromPyObject<'py>,
{
    match dict.get_item(key)? {
        Some(value) if !value.is_none() => Ok(Some(value.extract()?)),
        _ => Ok(None),
    }
}

/// Extract a field with a default value if missing.
fn extract_with_default<T>(dict: &Bound<'_, PyDict>, key: &str, default: T) -> PyResult<T>
where
    T: for<'py> FromPyObject<'py>,
{
    Ok(extract_optional(dict, key)?.unwrap_or(default))
}

/// Borrow a nested dict or list field without copying it
fn extract_container<'py, T>(
    dict: &Bound<'py, PyDict>,
    key: &str,
) -> PyResult<Option<Bound<'py, T>>>
where
    T: pyo3::PyTypeCheck,
{
    match dict.get_item(key)? {
        Some(value) if !value.is_none() => value
            .downcast_into::<T>()
            .map(Some)
            .map_err(|_| value_error(format!("Field '{}' has the wrong type", key))),
        _ => Ok(None),
    }
}

/// Map a crate error onto the matching Python exception
pub fn to_py_err(context: &str, err: SimulationError) -> PyErr {
    match err {
        SimulationError::InvalidConfig(_) | SimulationError::StateValidation(_) => {
            value_error(format!("{}: {}", context, err))
        }
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}: {}", context, err)),
    }
}

// ========================================================================
// Python -> Rust
// ========================================================================

/// Convert a plain Python value (dict, list, str, number, bool, None) to JSON
pub fn py_to_json(value: &Bound<'_, PyAny>) -> PyResult<serde_json::Value> {
    use serde_json::Value;

    if value.is_none() {
        return Ok(Value::Null);
    }
    // bool before int: Python bools are ints
    if let Ok(flag) = value.downcast::<PyBool>() {
        return Ok(Value::Bool(flag.is_true()));
    }
    if let Ok(int) = value.extract::<i64>() {
        return Ok(Value::from(int));
    }
    if let Ok(float) = value.extract::<f64>() {
        return serde_json::Number::from_f64(float)
            .map(Value::Number)
            .ok_or_else(|| value_error(format!("non-finite number {}", float)));
    }
    if let Ok(text) = value.extract::<String>() {
        return Ok(Value::String(text));
    }
    if let Ok(dict) = value.downcast::<PyDict>() {
        let mut map = serde_json::Map::new();
        for (key, item) in dict.iter() {
            let key: String = key
                .extract()
                .map_err(|_| value_error("dict keys must be strings"))?;
            map.insert(key, py_to_json(&item)?);
        }
        return Ok(Value::Object(map));
    }
    if let Ok(list) = value.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| py_to_json(&item))
            .collect::<PyResult<Vec<_>>>()
            .map(Value::Array);
    }
    if let Ok(tuple) = value.downcast::<PyTuple>() {
        return tuple
            .iter()
            .map(|item| py_to_json(&item))
            .collect::<PyResult<Vec<_>>>()
            .map(Value::Array);
    }
    Err(value_error("unsupported Python value in scenario"))
}

fn py_to_world_value(value: &Bound<'_, PyAny>) -> PyResult<WorldValue> {
    if let Ok(flag) = value.downcast::<PyBool>() {
        return Ok(WorldValue::Flag(flag.is_true()));
    }
    if let Ok(int) = value.extract::<i64>() {
        return Ok(WorldValue::Int(int));
    }
    if let Ok(float) = value.extract::<f64>() {
        return Ok(WorldValue::Float(float));
    }
    if let Ok(text) = value.extract::<String>() {
        return Ok(WorldValue::Text(text));
    }
    Err(value_error("world values must be bool, int, float or str"))
}

/// Convert Python dict to SimulationConfig
///
/// # Errors
///
/// Returns PyErr if:
/// - Required fields missing
/// - Type conversions fail
/// - Values out of valid range
pub fn parse_simulation_config(py_config: &Bound<'_, PyDict>) -> PyResult<SimulationConfig> {
    let max_ticks: u64 = extract_required(py_config, "max_ticks")?;
    let seed: u64 = extract_required(py_config, "seed")?;

    let mut initial_world = BTreeMap::new();
    if let Some(world) = extract_container::<PyDict>(py_config, "initial_world")? {
        for (key, value) in world.iter() {
            let key: String = key
                .extract()
                .map_err(|_| value_error("initial_world keys must be strings"))?;
            initial_world.insert(key, py_to_world_value(&value)?);
        }
    }

    let max_cascade_depth =
        extract_with_default(py_config, "max_cascade_depth", DEFAULT_MAX_CASCADE_DEPTH)?;
    let config = SimulationConfig {
        max_ticks,
        seed,
        max_cascade_depth,
        parallel_steps: extract_with_default(py_config, "parallel_steps", false)?,
        initial_world,
        observed_keys: extract_with_default(py_config, "observed_keys", Vec::new())?,
    };
    config.validate().map_err(|e| to_py_err("Invalid config", e))?;
    Ok(config)
}

/// Convert Python dict `{"config": {...}, "agents": [...]}` to a Scenario
pub fn parse_scenario(py_scenario: &Bound<'_, PyDict>) -> PyResult<Scenario> {
    let config_dict = extract_container::<PyDict>(py_scenario, "config")?
        .ok_or_else(|| value_error("Missing required field 'config'"))?;
    let config = parse_simulation_config(&config_dict)?;

    let agents_list = extract_container::<PyList>(py_scenario, "agents")?
        .ok_or_else(|| value_error("Missing required field 'agents'"))?;
    let mut agents = Vec::with_capacity(agents_list.len());
    for (index, item) in agents_list.iter().enumerate() {
        let spec: AgentSpec = serde_json::from_value(py_to_json(&item)?)
            .map_err(|e| value_error(format!("agent {}: {}", index, e)))?;
        agents.push(spec);
    }

    let scenario = Scenario { config, agents };
    scenario.validate().map_err(|e| to_py_err("Invalid scenario", e))?;
    Ok(scenario)
}

// ========================================================================
// Rust -> Python
// ========================================================================

pub fn world_value_to_py(py: Python<'_>, value: &WorldValue) -> PyObject {
    match value {
        WorldValue::Flag(flag) => flag.into_py(py),
        WorldValue::Int(int) => int.into_py(py),
        WorldValue::Float(float) => float.into_py(py),
        WorldValue::Text(text) => text.into_py(py),
    }
}

pub fn world_to_py(py: Python<'_>, world: &WorldState) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    for (key, value) in world.iter() {
        dict.set_item(key, world_value_to_py(py, value))?;
    }
    Ok(dict.unbind())
}

pub fn state_to_string(state: &SchedulerState) -> String {
    match state {
        SchedulerState::Idle => "idle".to_string(),
        SchedulerState::Running => "running".to_string(),
        SchedulerState::Halted(reason) => format!("halted: {}", reason),
    }
}

/// Convert TickReport to Python dict
pub fn tick_report_to_py(py: Python<'_>, report: &TickReport) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("tick", report.tick)?;
    dict.set_item("delivered", report.delivered)?;
    dict.set_item("steps", report.steps)?;
    dict.set_item("cascade_rounds", report.cascade_rounds)?;
    dict.set_item("writes", report.writes)?;
    dict.set_item("sent", report.sent)?;
    let retired: Vec<u64> = report.retired.iter().map(|id| id.value()).collect();
    dict.set_item("retired", retired)?;
    dict.set_item("halted", report.halted.as_ref().map(|r| r.to_string()))?;
    Ok(dict.unbind())
}

/// Convert RunSummary to Python dict
pub fn run_summary_to_py(py: Python<'_>, summary: &RunSummary) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("completed", summary.completed)?;
    dict.set_item("final_tick", summary.final_tick)?;
    dict.set_item("halt_reason", summary.halt_reason.to_string())?;

    let aborted = PyList::empty_bound(py);
    for (tick, err) in &summary.aborted {
        let entry = PyDict::new_bound(py);
        entry.set_item("tick", *tick)?;
        entry.set_item("kind", err.kind())?;
        entry.set_item("message", err.to_string())?;
        aborted.append(entry)?;
    }
    dict.set_item("aborted", aborted)?;
    Ok(dict.unbind())
}

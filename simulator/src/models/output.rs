//! Named time-series outputs.
//!
//! Observed world keys are sampled after every committed tick, giving a
//! per-key history such as a market's clearing prices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::time::Tick;
use crate::models::world::{WorldState, WorldValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    series: BTreeMap<String, Vec<(Tick, WorldValue)>>,
}

impl Outputs {
    /// Track the given keys; keys absent from the world are skipped when sampling
    pub fn observing<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let series = keys.into_iter().map(|k| (k.into(), Vec::new())).collect();
        Self { series }
    }

    pub(crate) fn sample(&mut self, tick: Tick, world: &WorldState) {
        for (key, points) in self.series.iter_mut() {
            if let Some(value) = world.get(key) {
                points.push((tick, value.clone()));
            }
        }
    }

    /// Recorded points for `key`, empty if the key is not observed
    pub fn series(&self, key: &str) -> &[(Tick, WorldValue)] {
        self.series.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

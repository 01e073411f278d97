//! Reference plane resolution.
//!
//! The reference plane of a multi-dimensional image is the middle plane of
//! each axis taken independently: for every axis the distinct values are
//! sorted and the one at index `len / 2` wins. Pure and deterministic.

use crate::config::ReferenceFallback;
use crate::error::{CatalogError, Result};
use crate::model::Coordinate;
use serde::Serialize;
use std::collections::BTreeSet;

/// The distinct sorted values of each axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Axes {
    pub channels: Vec<i32>,
    pub z_stacks: Vec<i32>,
    pub times: Vec<i32>,
}

impl Axes {
    pub fn from_coordinates<'a>(coordinates: impl IntoIterator<Item = &'a Coordinate>) -> Self {
        let mut channels = BTreeSet::new();
        let mut z_stacks = BTreeSet::new();
        let mut times = BTreeSet::new();
        for c in coordinates {
            channels.insert(c.channel);
            z_stacks.insert(c.z_stack);
            times.insert(c.time);
        }
        Self {
            channels: channels.into_iter().collect(),
            z_stacks: z_stacks.into_iter().collect(),
            times: times.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() || self.z_stacks.is_empty() || self.times.is_empty()
    }

    /// The per-axis middle values.
    pub fn median(&self) -> Result<Coordinate> {
        if self.is_empty() {
            return Err(CatalogError::InvalidArgument(
                "cannot retrieve reference plane: image has no planes".to_string(),
            ));
        }
        Ok(Coordinate::new(
            self.channels[self.channels.len() / 2],
            self.z_stacks[self.z_stacks.len() / 2],
            self.times[self.times.len() / 2],
        ))
    }

    /// Position of each component of `c` in its axis.
    fn index_of(&self, c: &Coordinate) -> (usize, usize, usize) {
        let pos = |axis: &[i32], value: i32| axis.binary_search(&value).unwrap_or_else(|i| i);
        (
            pos(&self.channels, c.channel),
            pos(&self.z_stacks, c.z_stack),
            pos(&self.times, c.time),
        )
    }
}

/// Resolve the reference coordinate among `coordinates`.
///
/// With [`ReferenceFallback::Strict`] a missing median triple is `NotFound`.
/// With [`ReferenceFallback::Nearest`] the existing plane closest to it in
/// axis-index space (Manhattan distance) is taken, lowest index first on ties.
pub fn resolve(coordinates: &[Coordinate], fallback: ReferenceFallback) -> Result<Coordinate> {
    let axes = Axes::from_coordinates(coordinates);
    let target = axes.median()?;
    if coordinates.contains(&target) {
        return Ok(target);
    }

    match fallback {
        ReferenceFallback::Strict => Err(CatalogError::not_found("plane", target)),
        ReferenceFallback::Nearest => {
            let (tc, tz, tt) = axes.index_of(&target);
            coordinates
                .iter()
                .map(|c| {
                    let (ic, iz, it) = axes.index_of(c);
                    let distance = ic.abs_diff(tc) + iz.abs_diff(tz) + it.abs_diff(tt);
                    ((distance, ic, iz, it), *c)
                })
                .min_by_key(|(key, _)| *key)
                .map(|(_, c)| c)
                .ok_or_else(|| CatalogError::not_found("plane", target))
        }
    }
}

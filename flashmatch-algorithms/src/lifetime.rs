//! Electron-lifetime equalization of calorimetric hits.
//!
//! Anode-cathode crossing tracks carry their own interaction time: the
//! latest hit in each TPC sits at the cathode. From that `t0` each hit's
//! drift time is known and its dQ/dx is scaled by `exp(t / τ)` using the
//! lifetime measured for its run, cryostat and TPC.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use flashmatch_core::{Error, Result};
use rayon::prelude::*;
use std::collections::HashMap;

/// Drift window, in ticks, of each (cryostat, TPC side) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CathodeTicks {
    /// Cryostat 0 (east), east TPCs.
    pub east_east: f64,
    /// Cryostat 0 (east), west TPCs.
    pub east_west: f64,
    /// Cryostat 1 (west), east TPCs.
    pub west_east: f64,
    /// Cryostat 1 (west), west TPCs.
    pub west_west: f64,
}

impl CathodeTicks {
    /// Cathode ticks of the east and west TPC pairs of `cryostat`.
    #[must_use]
    pub fn for_cryostat(&self, cryostat: u8) -> (f64, f64) {
        if cryostat == 0 {
            (self.east_east, self.east_west)
        } else {
            (self.west_east, self.west_west)
        }
    }
}

/// Timing constants of the equalization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EqualizationConfig {
    /// Duration of one TPC tick (ns).
    pub tick_period: f64,
    /// Tick of the anode plane.
    pub anode_tick: f64,
    /// Drift windows.
    pub cathode: CathodeTicks,
}

/// Lifetimes of one run (ms), indexed by [`RunLifetimes::slot`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunLifetimes(pub [f64; 4]);

impl RunLifetimes {
    /// Index of (cryostat, east TPC) into the lifetime array.
    #[must_use]
    pub fn slot(cryostat: u8, tpc_east: bool) -> usize {
        match (cryostat == 0, tpc_east) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    }

    /// Lifetime for a hit (ms).
    #[must_use]
    pub fn get(&self, cryostat: u8, tpc_east: bool) -> f64 {
        self.0[Self::slot(cryostat, tpc_east)]
    }
}

/// A collection-plane hit on a reconstructed track.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackHit {
    /// Run number.
    pub run: u32,
    /// Cryostat index.
    pub cryostat: u8,
    /// TPC index within the cryostat; 0 and 1 are the east TPCs.
    pub tpc: u8,
    /// Wire number.
    pub wire: u32,
    /// Hit peak time (ticks).
    pub time: f64,
    /// Uncorrected dQ/dx.
    pub dqdx: f64,
    /// Track pitch at the hit (cm).
    pub pitch: f64,
    /// Latest hit time of the track in the east TPCs (ticks).
    pub track_max_time_east: f64,
    /// Latest hit time of the track in the west TPCs (ticks).
    pub track_max_time_west: f64,
    /// Whether the track passed the anode-cathode crossing selection.
    pub selected: bool,
}

impl TrackHit {
    /// True for hits in the east TPCs of a cryostat.
    #[must_use]
    pub fn tpc_east(&self) -> bool {
        self.tpc <= 1
    }
}

/// A hit with its lifetime-corrected dQ/dx.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EqualizedHit {
    /// Run number.
    pub run: u32,
    /// Cryostat index.
    pub cryostat: u8,
    /// Whether the hit is in an east TPC.
    pub tpc_east: bool,
    /// Wire number.
    pub wire: u32,
    /// Hit peak time (ticks).
    pub time: f64,
    /// Track pitch (cm).
    pub pitch: f64,
    /// Track crossing time (ns).
    pub crossing_t0: f64,
    /// Drift time after the anode (µs).
    pub drift_time: f64,
    /// Input dQ/dx.
    pub dqdx_uncorrected: f64,
    /// Lifetime-corrected dQ/dx.
    pub dqdx_corrected: f64,
}

impl EqualizationConfig {
    /// Crossing time of the track a hit belongs to (ns): the mean of the
    /// east and west cathode-arrival times minus their drift windows.
    #[must_use]
    pub fn crossing_t0(&self, hit: &TrackHit) -> f64 {
        let (east, west) = self.cathode.for_cryostat(hit.cryostat);
        let t0_east = hit.track_max_time_east - east;
        let t0_west = hit.track_max_time_west - west;
        (t0_east + t0_west) / 2.0 * self.tick_period
    }

    /// Drift time of the hit after the anode (µs).
    #[must_use]
    pub fn drift_time(&self, hit: &TrackHit, crossing_t0: f64) -> f64 {
        (hit.time * self.tick_period - crossing_t0 - self.anode_tick * self.tick_period) / 1000.0
    }

    /// Equalize one hit with the lifetimes of its run.
    #[must_use]
    pub fn equalize_hit(&self, hit: &TrackHit, lifetimes: &RunLifetimes) -> EqualizedHit {
        let crossing_t0 = self.crossing_t0(hit);
        let drift_time = self.drift_time(hit, crossing_t0);
        let tau_us = lifetimes.get(hit.cryostat, hit.tpc_east()) * 1e3;
        EqualizedHit {
            run: hit.run,
            cryostat: hit.cryostat,
            tpc_east: hit.tpc_east(),
            wire: hit.wire,
            time: hit.time,
            pitch: hit.pitch,
            crossing_t0,
            drift_time,
            dqdx_uncorrected: hit.dqdx,
            dqdx_corrected: hit.dqdx * (drift_time / tau_us).exp(),
        }
    }

    /// Keep hits of selected tracks with positive dQ/dx and equalize them.
    ///
    /// # Errors
    /// Returns [`Error::MissingLifetime`] for a kept hit whose run has no
    /// lifetime entry.
    pub fn equalize(
        &self,
        hits: &[TrackHit],
        lifetimes: &HashMap<u32, RunLifetimes>,
    ) -> Result<Vec<EqualizedHit>> {
        hits.par_iter()
            .filter(|hit| hit.selected && hit.dqdx > 0.0)
            .map(|hit| -> Result<EqualizedHit> {
                let run = lifetimes
                    .get(&hit.run)
                    .ok_or(Error::MissingLifetime(hit.run))?;
                Ok(self.equalize_hit(hit, run))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> EqualizationConfig {
        EqualizationConfig {
            tick_period: 400.0,
            anode_tick: 850.0,
            cathode: CathodeTicks {
                east_east: 3200.0,
                east_west: 3210.0,
                west_east: 3190.0,
                west_west: 3205.0,
            },
        }
    }

    fn hit(cryostat: u8, tpc: u8, time: f64) -> TrackHit {
        TrackHit {
            run: 9000,
            cryostat,
            tpc,
            wire: 100,
            time,
            dqdx: 1000.0,
            pitch: 0.3,
            track_max_time_east: 4200.0,
            track_max_time_west: 4210.0,
            selected: true,
        }
    }

    #[test]
    fn test_crossing_time_uses_cryostat_windows() {
        let c = config();
        // cryostat 0: (1000 + 1000) / 2 ticks
        assert_relative_eq!(c.crossing_t0(&hit(0, 0, 0.0)), 1000.0 * 400.0);
        // cryostat 1: (1010 + 1005) / 2 ticks
        assert_relative_eq!(c.crossing_t0(&hit(1, 2, 0.0)), 1007.5 * 400.0);
    }

    #[test]
    fn test_correction_grows_with_drift_time() {
        let c = config();
        let lifetimes = RunLifetimes([3.0, 4.0, 5.0, 6.0]);
        // hit 1000 ticks after anode + t0: 400 µs
        let h = hit(0, 0, 850.0 + 1000.0 + 1000.0);
        let eq = c.equalize_hit(&h, &lifetimes);
        assert_relative_eq!(eq.drift_time, 400.0, epsilon = 1e-9);
        assert_relative_eq!(eq.dqdx_corrected, 1000.0 * (400.0f64 / 3000.0).exp(), epsilon = 1e-6);
        assert!(eq.tpc_east);
    }

    #[test]
    fn test_lifetime_slots() {
        let lifetimes = RunLifetimes([1.0, 2.0, 3.0, 4.0]);
        assert_relative_eq!(lifetimes.get(0, true), 1.0);
        assert_relative_eq!(lifetimes.get(0, false), 2.0);
        assert_relative_eq!(lifetimes.get(1, true), 3.0);
        assert_relative_eq!(lifetimes.get(1, false), 4.0);
        assert!(!hit(0, 2, 0.0).tpc_east());
    }

    #[test]
    fn test_equalize_filters_and_requires_lifetime() {
        let c = config();
        let mut unselected = hit(0, 0, 3000.0);
        unselected.selected = false;
        let mut negative = hit(0, 0, 3000.0);
        negative.dqdx = -1.0;
        let hits = vec![hit(0, 0, 3000.0), unselected, negative, hit(1, 3, 3000.0)];

        let mut lifetimes = HashMap::new();
        lifetimes.insert(9000, RunLifetimes([3.0, 3.0, 3.0, 3.0]));
        let out = c.equalize(&hits, &lifetimes).unwrap();
        assert_eq!(out.len(), 2);

        let empty = HashMap::new();
        assert_eq!(c.equalize(&hits, &empty), Err(Error::MissingLifetime(9000)));
    }
}

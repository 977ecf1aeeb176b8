//! Frequency-sorted packet storage.

use crate::config::Rescaling;
use crate::data::{DataSource, ENERGIES, NUS};
use pkt_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One simulated packet after rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Rescaled energy, strictly positive.
    pub energy: f64,
    /// Rescaled emission frequency.
    pub nu: f64,
}

/// Packets sorted ascending by frequency.
///
/// Order does not matter for the likelihood, only for [`SampleStore::sum_x`].
#[derive(Debug, Clone)]
pub struct SampleStore {
    samples: Vec<Sample>,
    energy_scale: f64,
    frequency_scale: f64,
}

impl SampleStore {
    /// Build a store from raw simulation output.
    ///
    /// Drops packets with non-positive energy, sorts by frequency, then maps
    /// `e -> 1 - e / energy_scale` with `energy_scale = (1 + margin) * max(e)`
    /// and `nu -> nu / frequency_scale`.
    pub fn from_raw(energies: &[f64], nus: &[f64], rescaling: &Rescaling) -> Result<Self> {
        if energies.len() != nus.len() {
            return Err(Error::Validation(format!(
                "energies and nus differ in length: {} != {}",
                energies.len(),
                nus.len()
            )));
        }

        let mut samples: Vec<Sample> = energies
            .iter()
            .zip(nus)
            .filter(|(e, _)| **e > 0.0)
            .map(|(&energy, &nu)| Sample { energy, nu })
            .collect();
        if samples.is_empty() {
            return Err(Error::Validation(format!(
                "no positive-energy packets among {} inputs",
                energies.len()
            )));
        }
        samples.sort_by(|a, b| a.nu.total_cmp(&b.nu));

        let max_energy = samples.iter().map(|s| s.energy).fold(f64::NEG_INFINITY, f64::max);
        let energy_scale = (1.0 + rescaling.energy_margin) * max_energy;
        let frequency_scale = rescaling.frequency_scale;
        let max_nu = samples.last().map_or(f64::NAN, |s| s.nu);

        log::info!(
            "retained {} of {} packets; max energy {max_energy:e}, max frequency {max_nu:e}",
            samples.len(),
            energies.len()
        );

        for s in &mut samples {
            s.energy = 1.0 - s.energy / energy_scale;
            s.nu /= frequency_scale;
        }

        let store = Self { samples, energy_scale, frequency_scale };
        log::info!(
            "rescaled with energy scale {energy_scale:e}, frequency scale {frequency_scale:e}; \
             max energy {:e}, max frequency {:e}",
            store.samples.iter().map(|s| s.energy).fold(f64::NEG_INFINITY, f64::max),
            max_nu / frequency_scale
        );
        Ok(store)
    }

    /// Read `run` from a data source and build a store.
    pub fn load(
        source: &impl DataSource,
        run: usize,
        max_elements: usize,
        rescaling: &Rescaling,
    ) -> Result<Self> {
        let energies = source.read(ENERGIES, run, max_elements)?;
        let nus = source.read(NUS, run, max_elements)?;
        Self::from_raw(&energies, &nus, rescaling)
    }

    /// Build a store from packets that are already on the model scale.
    pub fn from_points(mut samples: Vec<Sample>) -> Result<Self> {
        if let Some(bad) = samples.iter().find(|s| !(s.energy > 0.0)) {
            return Err(Error::Validation(format!(
                "sample energies must be > 0, got {} at nu={}",
                bad.energy, bad.nu
            )));
        }
        samples.sort_by(|a, b| a.nu.total_cmp(&b.nu));
        Ok(Self { samples, energy_scale: 1.0, frequency_scale: 1.0 })
    }

    /// Number of packets.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the store holds no packets.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Packets in frequency order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Divisor applied to raw energies (`1.0` for pre-scaled stores).
    pub fn energy_scale(&self) -> f64 {
        self.energy_scale
    }

    /// Divisor applied to raw frequencies (`1.0` for pre-scaled stores).
    pub fn frequency_scale(&self) -> f64 {
        self.frequency_scale
    }

    /// Count and energy sum of packets with `numin <= nu < numax`.
    pub fn sum_x(&self, numin: f64, numax: f64) -> (u32, f64) {
        let lo = self.samples.partition_point(|s| s.nu < numin);
        let hi = self.samples.partition_point(|s| s.nu < numax).max(lo);
        let bin = &self.samples[lo..hi];
        let x: f64 = bin.iter().map(|s| s.energy).sum();
        let n = bin.len() as u32;
        log::debug!("found {n} packets in bin [{numin}, {numax}) with X = {x}");
        (n, x)
    }
}

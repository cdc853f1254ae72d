//! Received power and noise for frames crossing the wireless link.
//!
//! Mean power follows a log-distance path loss model; each frame then gets
//! an independent Nakagami-m power gain drawn from Gamma(m, 1/m).

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Gamma};

use crate::config::ConfigError;

pub const TX_POWER_DBM: f64 = 25.0;
pub const RX_GAIN_DB: f64 = 5.0;
/// Path loss at the 1 m reference distance (free space, 5.15 GHz).
pub const REFERENCE_LOSS_DB: f64 = 46.6777;
pub const PATH_LOSS_EXPONENT: f64 = 3.0;
/// Thermal noise over 20 MHz plus a 7 dB noise figure.
pub const NOISE_FLOOR_DBM: f64 = -93.97;
/// Frames weaker than this are not decoded.
pub const RX_SENSITIVITY_DBM: f64 = -82.0;

/// Nakagami shape switches at these distances.
pub const FADING_DISTANCE_1: f64 = 80.0;
pub const FADING_DISTANCE_2: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadingShape {
    pub m0: f64,
    pub m1: f64,
    pub m2: f64,
}

impl FadingShape {
    pub fn for_distance(&self, distance: f64) -> f64 {
        if distance < FADING_DISTANCE_1 {
            self.m0
        } else if distance < FADING_DISTANCE_2 {
            self.m1
        } else {
            self.m2
        }
    }
}

/// Outcome of one frame arriving at the far end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reception {
    pub signal_dbm: f64,
    pub noise_dbm: f64,
    pub decoded: bool,
}

impl Reception {
    pub fn snr_db(&self) -> f64 {
        self.signal_dbm - self.noise_dbm
    }
}

pub struct RadioModel {
    mean_rx_dbm: f64,
    fading: Gamma<f64>,
    rng: StdRng,
}

impl RadioModel {
    pub fn new(distance: f64, shape: FadingShape, seed: u64) -> Result<Self, ConfigError> {
        let m = shape.for_distance(distance);
        let fading = Gamma::new(m, 1.0 / m).map_err(|_| ConfigError::NotPositive {
            name: "fading shape",
            value: m,
        })?;

        Ok(Self {
            mean_rx_dbm: mean_rx_power_dbm(distance),
            fading,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Received power before fading.
    pub fn mean_rx_dbm(&self) -> f64 {
        self.mean_rx_dbm
    }

    /// Draw the reception of one frame.
    pub fn sample(&mut self) -> Reception {
        let gain = self.fading.sample(&mut self.rng).max(f64::MIN_POSITIVE);
        let signal_dbm = self.mean_rx_dbm + 10.0 * gain.log10();
        Reception {
            signal_dbm,
            noise_dbm: NOISE_FLOOR_DBM,
            decoded: signal_dbm >= RX_SENSITIVITY_DBM,
        }
    }
}

/// Log-distance path loss applied to the fixed transmit power. Distances
/// below the 1 m reference get the reference loss.
pub fn mean_rx_power_dbm(distance: f64) -> f64 {
    let loss = REFERENCE_LOSS_DB + 10.0 * PATH_LOSS_EXPONENT * distance.max(1.0).log10();
    TX_POWER_DBM + RX_GAIN_DB - loss
}

//! Synthetic compositions around an anchor.

use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{StandardNormal, StudentT};

use super::{CancelToken, NoiseShape, UncertaintyModel};
use crate::model::{Apex, TernaryPoint};
use crate::{Error, Result};

/// Samples between cancellation checks.
const CHECK_EVERY: usize = 1024;

/// Unit-variance noise source for one shape.
enum Noise {
    Gaussian,
    Uniform(Uniform<f64>),
    StudentT { dist: StudentT<f64>, unit: f64 },
}

impl Noise {
    fn new(shape: NoiseShape) -> Result<Self> {
        Ok(match shape {
            NoiseShape::Gaussian => Noise::Gaussian,
            NoiseShape::Uniform => {
                let half_width = 3.0_f64.sqrt();
                Noise::Uniform(Uniform::new_inclusive(-half_width, half_width))
            }
            NoiseShape::StudentT { dof } => {
                if !(dof.is_finite() && dof > 2.0) {
                    return Err(Error::InvalidConfig(format!("Student-t noise needs dof > 2, got {dof}")));
                }
                let dist = StudentT::new(dof).map_err(|e| Error::InvalidConfig(format!("Student-t noise: {e}")))?;
                Noise::StudentT { dist, unit: ((dof - 2.0) / dof).sqrt() }
            }
        })
    }

    fn draw(&self, rng: &mut StdRng) -> f64 {
        match self {
            Noise::Gaussian => rng.sample(StandardNormal),
            Noise::Uniform(dist) => rng.sample(dist),
            Noise::StudentT { dist, unit } => rng.sample(dist) * unit,
        }
    }
}

/// Outcome of a sampling run.
#[derive(Debug, Clone)]
pub struct Draws {
    /// Usable raw samples; negative components already clipped to zero.
    pub samples: Vec<TernaryPoint>,
    /// Draws discarded because every component collapsed to zero.
    pub collapsed: usize,
}

/// Perturb each raw component of `anchor` independently, `n` times.
pub fn draw(anchor: &TernaryPoint, model: &UncertaintyModel, n: usize, seed: u64, cancel: &CancelToken) -> Result<Draws> {
    let noise = Noise::new(model.shape)?;
    let sigma = Apex::ALL.map(|apex| model.sigma(apex, anchor.get(apex)));
    let center = Apex::ALL.map(|apex| anchor.get(apex));
    let mut rng = StdRng::seed_from_u64(seed);

    let mut samples = Vec::with_capacity(n);
    let mut collapsed = 0;
    for k in 0..n {
        if k % CHECK_EVERY == 0 && cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut c = [0.0; 3];
        for axis in 0..3 {
            let v = if sigma[axis] > 0.0 { center[axis] + sigma[axis] * noise.draw(&mut rng) } else { center[axis] };
            c[axis] = v.max(0.0);
        }
        if c[0] + c[1] + c[2] > 0.0 {
            samples.push(TernaryPoint::new(c[0], c[1], c[2]));
        } else {
            collapsed += 1;
        }
    }
    Ok(Draws { samples, collapsed })
}

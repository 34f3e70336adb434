//! Normalizer - per-channel intensity rescaling
//!
//! Each modality is clipped at the configured percentiles and mapped linearly
//! onto `[out_min, out_max]`, then stacked in the configured channel order.
//! Pure arithmetic over sorted copies: identical input gives identical output.

use std::collections::BTreeMap;

use contracts::{
    ImagingVolume, InputError, Modality, NormalizationConfig, NormalizationScope, NormalizedTensor,
};
use ndarray::{Array4, ArrayView, ArrayViewMut, Axis, Dimension, Zip};
use tracing::{debug, instrument};

/// Clip window of one channel (or slice)
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClipWindow {
    lo: f64,
    hi: f64,
}

/// Intensity normalizer, configured once per pipeline
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizationConfig,
    modalities: Vec<Modality>,
}

impl Normalizer {
    pub fn new(config: NormalizationConfig, modalities: Vec<Modality>) -> Self {
        Self { config, modalities }
    }

    /// Configured channel order
    pub fn modalities(&self) -> &[Modality] {
        &self.modalities
    }

    /// Build the channel-stacked tensor
    ///
    /// # Errors
    /// - `NoVolumes` for an empty mapping
    /// - `MissingModality` when a configured channel is absent
    /// - `MisalignedVolumes` when selected channels disagree on shape
    #[instrument(name = "normalize", skip(self, volumes), fields(channels = self.modalities.len()))]
    pub fn normalize(
        &self,
        volumes: &BTreeMap<Modality, ImagingVolume>,
    ) -> Result<NormalizedTensor, InputError> {
        if volumes.is_empty() {
            return Err(InputError::NoVolumes);
        }

        let mut selected = Vec::with_capacity(self.modalities.len());
        for modality in &self.modalities {
            let volume = volumes
                .get(modality)
                .ok_or_else(|| InputError::MissingModality {
                    modality: modality.clone(),
                    expected: self.modalities.clone(),
                })?;
            selected.push(volume);
        }
        for extra in volumes.keys().filter(|m| !self.modalities.contains(m)) {
            debug!(modality = %extra, "ignoring unconfigured modality");
        }

        let Some(first) = selected.first().copied() else {
            return Err(InputError::NoVolumes);
        };
        let [nx, ny, nz] = first.shape();
        for volume in &selected[1..] {
            if volume.shape() != first.shape() {
                return Err(InputError::MisalignedVolumes {
                    modality: volume.modality.clone(),
                    shape: volume.shape(),
                    spacing: volume.spacing,
                    expected_shape: first.shape(),
                    expected_spacing: first.spacing,
                });
            }
        }

        let mut data = Array4::<f32>::zeros((selected.len(), nx, ny, nz));
        for (channel, volume) in selected.iter().enumerate() {
            let mut out = data.index_axis_mut(Axis(0), channel);
            match self.config.scope {
                NormalizationScope::PerVolume => {
                    let window = self.rescale(volume.data.view(), out.view_mut());
                    debug!(modality = %volume.modality, lo = window.lo, hi = window.hi, "channel normalized");
                }
                NormalizationScope::PerSlice => {
                    let axis = Axis(self.config.slice_axis.min(2));
                    for (src, dst) in volume.data.axis_iter(axis).zip(out.axis_iter_mut(axis)) {
                        self.rescale(src, dst);
                    }
                }
            }
        }

        Ok(NormalizedTensor {
            channels: self.modalities.clone(),
            data,
            spacing: first.spacing,
            orientation: first.orientation,
            range: (self.config.out_min, self.config.out_max),
        })
    }

    /// Rescale `src` into `dst`, returning the clip window used
    fn rescale<D: Dimension>(
        &self,
        src: ArrayView<'_, f32, D>,
        dst: ArrayViewMut<'_, f32, D>,
    ) -> ClipWindow {
        let out_min = f64::from(self.config.out_min);
        let out_max = f64::from(self.config.out_max);
        let foreground_only = self.config.foreground_only;

        let mut samples: Vec<f64> = src
            .iter()
            .filter(|v| v.is_finite() && !(foreground_only && **v == 0.0))
            .map(|v| f64::from(*v))
            .collect();
        samples.sort_by(f64::total_cmp);

        let window = ClipWindow {
            lo: percentile(&samples, self.config.lower_percentile),
            hi: percentile(&samples, self.config.upper_percentile),
        };
        let span = window.hi - window.lo;

        Zip::from(dst).and(&src).for_each(|out, &v| {
            let background = !v.is_finite() || (foreground_only && v == 0.0);
            *out = if background || samples.is_empty() || span <= 0.0 {
                out_min as f32
            } else {
                let clipped = f64::from(v).clamp(window.lo, window.hi);
                (out_min + (clipped - window.lo) / span * (out_max - out_min)) as f32
            };
        });

        window
    }
}

/// Linear-interpolated percentile of sorted samples, `p` in 0..=100
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

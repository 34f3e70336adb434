//! Per-voxel class selection

use contracts::{InvariantViolation, LabelVolume, PredictionTensor, TissueClass};
use ndarray::{Array3, Axis, Zip};

/// Highest-scoring class per voxel.
///
/// Ties go to the lowest class id and NaN scores never win; a voxel whose
/// scores are all NaN is background. A winner outside the taxonomy is an
/// invariant violation.
pub fn argmax(prediction: &PredictionTensor) -> Result<LabelVolume, InvariantViolation> {
    let [nx, ny, nz] = prediction.spatial_shape();
    let mut winners = Array3::<usize>::zeros((nx, ny, nz));
    let mut best = Array3::<f32>::from_elem((nx, ny, nz), f32::NAN);

    for (class_id, class_scores) in prediction.scores.axis_iter(Axis(0)).enumerate() {
        Zip::from(&mut winners)
            .and(&mut best)
            .and(&class_scores)
            .for_each(|winner, best, &score| {
                // strict '>' keeps the earlier (lower) id on ties
                if !score.is_nan() && (best.is_nan() || score > *best) {
                    *best = score;
                    *winner = class_id;
                }
            });
    }

    let mut labels = Array3::<u8>::zeros((nx, ny, nz));
    for ((x, y, z), &winner) in winners.indexed_iter() {
        let class = TissueClass::from_id(winner).ok_or(InvariantViolation::InvalidClassId {
            class_id: winner,
            voxel: [x, y, z],
        })?;
        labels[[x, y, z]] = class.id();
    }

    Ok(LabelVolume {
        labels,
        spacing: prediction.spacing,
        orientation: prediction.orientation,
    })
}

/// Verify every voxel holds a taxonomy id
pub fn check_labels(labels: &LabelVolume) -> Result<(), InvariantViolation> {
    match labels
        .labels
        .indexed_iter()
        .find(|(_, &id)| TissueClass::from_id(id as usize).is_none())
    {
        Some(((x, y, z), &id)) => Err(InvariantViolation::InvalidClassId {
            class_id: id as usize,
            voxel: [x, y, z],
        }),
        None => Ok(()),
    }
}

//! Connected components per tissue class

use std::collections::VecDeque;

use contracts::{Connectivity, TissueClass};
use ndarray::Array3;

/// One connected region of a single class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub class_id: u8,
    pub voxels: u64,
    /// First voxel reached in scan order
    pub seed: [usize; 3],
}

/// Component summary for one class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassComponents {
    pub count: usize,
    pub largest_voxels: u64,
}

fn offsets(connectivity: Connectivity) -> Vec<[isize; 3]> {
    let mut offsets = Vec::with_capacity(26);
    for dx in -1isize..=1 {
        for dy in -1isize..=1 {
            for dz in -1isize..=1 {
                let manhattan = dx.abs() + dy.abs() + dz.abs();
                let keep = match connectivity {
                    Connectivity::Face => manhattan == 1,
                    Connectivity::Full => manhattan > 0,
                };
                if keep {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

/// Label every non-background component.
///
/// Returns the component list (scan order) and a map from voxel to
/// component index + 1 (0 = background).
pub fn label_components(
    labels: &Array3<u8>,
    connectivity: Connectivity,
) -> (Vec<Component>, Array3<u32>) {
    let dim = labels.dim();
    let shape = [dim.0, dim.1, dim.2];
    let neighbours = offsets(connectivity);
    let mut membership = Array3::<u32>::zeros(dim);
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for ((x, y, z), &class_id) in labels.indexed_iter() {
        if class_id == TissueClass::Background.id() || membership[[x, y, z]] != 0 {
            continue;
        }

        let tag = components.len() as u32 + 1;
        let mut voxels = 0u64;
        membership[[x, y, z]] = tag;
        queue.push_back([x, y, z]);

        while let Some(voxel) = queue.pop_front() {
            voxels += 1;
            for offset in &neighbours {
                let Some(next) = step(voxel, *offset, shape) else {
                    continue;
                };
                if labels[next] == class_id && membership[next] == 0 {
                    membership[next] = tag;
                    queue.push_back(next);
                }
            }
        }

        components.push(Component {
            class_id,
            voxels,
            seed: [x, y, z],
        });
    }

    (components, membership)
}

fn step(voxel: [usize; 3], offset: [isize; 3], shape: [usize; 3]) -> Option<[usize; 3]> {
    let mut next = [0usize; 3];
    for axis in 0..3 {
        let v = voxel[axis].checked_add_signed(offset[axis])?;
        if v >= shape[axis] {
            return None;
        }
        next[axis] = v;
    }
    Some(next)
}

/// Reassign components smaller than `min_voxels` to background.
///
/// Returns the number of voxels cleared. `min_voxels == 0` is a no-op.
pub fn remove_small_components(
    labels: &mut Array3<u8>,
    connectivity: Connectivity,
    min_voxels: u64,
) -> u64 {
    if min_voxels == 0 {
        return 0;
    }
    let (components, membership) = label_components(labels, connectivity);
    let small: Vec<bool> = components.iter().map(|c| c.voxels < min_voxels).collect();
    if !small.contains(&true) {
        return 0;
    }

    let mut cleared = 0;
    ndarray::Zip::from(labels)
        .and(&membership)
        .for_each(|label, &tag| {
            if tag != 0 && small[tag as usize - 1] {
                *label = TissueClass::Background.id();
                cleared += 1;
            }
        });
    cleared
}

/// Component count and largest size per class id
pub fn summarize(components: &[Component]) -> [ClassComponents; TissueClass::COUNT] {
    let mut summary = [ClassComponents::default(); TissueClass::COUNT];
    for component in components {
        if let Some(entry) = summary.get_mut(component.class_id as usize) {
            entry.count += 1;
            entry.largest_voxels = entry.largest_voxels.max(component.voxels);
        }
    }
    summary
}

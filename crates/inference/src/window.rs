//! Window enumeration
//!
//! Turns a `WindowSpec` and a volume shape into an ordered list of inference
//! units. The order is fixed (x outermost, z innermost) so accumulation is
//! reproducible.

use contracts::WindowSpec;

/// One inference unit's placement inside the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Position in enumeration order
    pub index: usize,
    /// Voxel origin `[x, y, z]`
    pub origin: [usize; 3],
    /// Part of the window that lies inside the volume
    pub extent: [usize; 3],
    /// Size of the unit handed to the classifier (`>= extent`, padded)
    pub size: [usize; 3],
}

impl Window {
    /// Whether the unit needs padding beyond the volume edge
    pub fn is_padded(&self) -> bool {
        self.extent != self.size
    }
}

/// Patch origins along one axis: `0, stride, 2·stride, …` plus one flush with the far edge
pub fn axis_origins(dim: usize, size: usize, stride: usize) -> Vec<usize> {
    if dim <= size {
        return vec![0];
    }
    let last = dim - size;
    let mut origins: Vec<usize> = (0..=last).step_by(stride.max(1)).collect();
    if origins.last() != Some(&last) {
        origins.push(last);
    }
    origins
}

/// Enumerate windows covering a `shape` volume
pub fn enumerate(spec: &WindowSpec, shape: [usize; 3]) -> Vec<Window> {
    match *spec {
        WindowSpec::WholeVolume => vec![Window {
            index: 0,
            origin: [0; 3],
            extent: shape,
            size: shape,
        }],
        WindowSpec::Slice { axis } => {
            let axis = axis.min(2);
            let mut extent = shape;
            extent[axis] = 1;
            (0..shape[axis])
                .map(|i| {
                    let mut origin = [0; 3];
                    origin[axis] = i;
                    Window {
                        index: i,
                        origin,
                        extent,
                        size: extent,
                    }
                })
                .collect()
        }
        WindowSpec::Patch { size, stride } => {
            let xs = axis_origins(shape[0], size[0], stride[0]);
            let ys = axis_origins(shape[1], size[1], stride[1]);
            let zs = axis_origins(shape[2], size[2], stride[2]);

            let mut windows = Vec::with_capacity(xs.len() * ys.len() * zs.len());
            for &x in &xs {
                for &y in &ys {
                    for &z in &zs {
                        let origin = [x, y, z];
                        let extent: [usize; 3] =
                            std::array::from_fn(|a| size[a].min(shape[a] - origin[a]));
                        windows.push(Window {
                            index: windows.len(),
                            origin,
                            extent,
                            size,
                        });
                    }
                }
            }
            windows
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_origins_flush_last() {
        assert_eq!(axis_origins(10, 4, 4), vec![0, 4, 6]);
        assert_eq!(axis_origins(8, 4, 4), vec![0, 4]);
        assert_eq!(axis_origins(8, 4, 2), vec![0, 2, 4]);
        assert_eq!(axis_origins(3, 4, 2), vec![0]);
    }

    #[test]
    fn test_whole_volume() {
        let windows = enumerate(&WindowSpec::WholeVolume, [5, 6, 7]);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].extent, [5, 6, 7]);
        assert!(!windows[0].is_padded());
    }

    #[test]
    fn test_slices_along_axis() {
        let windows = enumerate(&WindowSpec::Slice { axis: 1 }, [4, 3, 2]);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].origin, [0, 2, 0]);
        assert_eq!(windows[2].size, [4, 1, 2]);
    }

    #[test]
    fn test_patches_cover_volume_in_order() {
        let spec = WindowSpec::Patch {
            size: [4, 4, 4],
            stride: [3, 4, 4],
        };
        let shape = [9, 4, 2];
        let windows = enumerate(&spec, shape);
        // x: 0, 3, 5; y: 0; z: 0 (padded)
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].origin, [3, 0, 0]);
        assert_eq!(windows[2].origin, [5, 0, 0]);
        assert_eq!(windows[2].extent, [4, 4, 2]);
        assert!(windows[2].is_padded());
        assert!(windows.iter().enumerate().all(|(i, w)| w.index == i));

        let mut covered = vec![0u32; shape.iter().product()];
        for w in &windows {
            for x in w.origin[0]..w.origin[0] + w.extent[0] {
                for y in w.origin[1]..w.origin[1] + w.extent[1] {
                    for z in w.origin[2]..w.origin[2] + w.extent[2] {
                        covered[(x * shape[1] + y) * shape[2] + z] += 1;
                    }
                }
            }
        }
        assert!(covered.iter().all(|&c| c > 0));
    }
}

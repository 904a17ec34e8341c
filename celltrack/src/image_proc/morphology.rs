//! Binary morphology with disk-shaped structuring elements.

use ndarray::{Array2, ArrayView2};

use crate::stack::Mask;

/// Half-width of each footprint row, for row offsets `-radius..=radius`.
///
/// A pixel `(dy, dx)` belongs to the disk when `dy² + dx² <= radius²`.
fn disk_half_widths(radius: usize) -> Vec<usize> {
    let r2 = radius * radius;
    (0..=2 * radius)
        .map(|i| {
            let dy = i.abs_diff(radius);
            let rem = r2 - dy * dy;
            let mut w = (rem as f64).sqrt() as usize;
            while w * w > rem {
                w -= 1;
            }
            while (w + 1) * (w + 1) <= rem {
                w += 1;
            }
            w
        })
        .collect()
}

/// Disk structuring element of the given radius, `(2r+1) x (2r+1)`.
pub fn disk(radius: usize) -> Mask {
    let widths = disk_half_widths(radius);
    Array2::from_shape_fn((2 * radius + 1, 2 * radius + 1), |(r, c)| {
        c.abs_diff(radius) <= widths[r]
    })
}

/// Erode `mask` with a disk of `radius` pixels.
///
/// A pixel survives when every footprint pixel around it is foreground.
/// Pixels outside the frame count as foreground, so objects touching the
/// border are not eaten from the edge. Radius 0 returns a copy.
pub fn binary_erosion(mask: ArrayView2<bool>, radius: usize) -> Mask {
    if radius == 0 {
        return mask.to_owned();
    }
    let (rows, cols) = mask.dim();

    // Length of the foreground run starting at each pixel and extending right;
    // a run reaching the right edge is unbounded.
    let mut run = Array2::<usize>::zeros((rows, cols));
    for r in 0..rows {
        let mut next = usize::MAX;
        for c in (0..cols).rev() {
            next = if mask[[r, c]] { next.saturating_add(1) } else { 0 };
            run[[r, c]] = next;
        }
    }

    let widths = disk_half_widths(radius);
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        if !mask[[r, c]] {
            return false;
        }
        widths.iter().enumerate().all(|(i, &w)| {
            let rr = r as isize + i as isize - radius as isize;
            if rr < 0 || rr >= rows as isize {
                return true;
            }
            let start = c.saturating_sub(w);
            let end = c + w;
            run[[rr as usize, start]] >= end - start + 1
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn brute_force_erosion(mask: ArrayView2<bool>, radius: usize) -> Mask {
        let footprint = disk(radius);
        let (rows, cols) = mask.dim();
        let r = radius as isize;
        Array2::from_shape_fn((rows, cols), |(y, x)| {
            footprint.indexed_iter().all(|((fy, fx), &on)| {
                if !on {
                    return true;
                }
                let yy = y as isize + fy as isize - r;
                let xx = x as isize + fx as isize - r;
                if yy < 0 || xx < 0 || yy >= rows as isize || xx >= cols as isize {
                    return true;
                }
                mask[[yy as usize, xx as usize]]
            })
        })
    }

    #[test]
    fn test_disk_shapes() {
        assert_eq!(disk(0), arr2(&[[true]]));
        assert_eq!(
            disk(1),
            arr2(&[
                [false, true, false],
                [true, true, true],
                [false, true, false],
            ])
        );
        // Area of a radius-6 disk footprint
        assert_eq!(disk(6).iter().filter(|&&v| v).count(), 113);
    }

    #[test]
    fn test_erosion_matches_brute_force() {
        let mask = Array2::from_shape_fn((30, 37), |(r, c)| {
            let in_blob = (r as f64 - 12.0).powi(2) + (c as f64 - 15.0).powi(2) < 81.0;
            let in_bar = (20..24).contains(&r) && c > 3;
            let speckle = (r * 7 + c * 13) % 11 == 0;
            (in_blob || in_bar) && !speckle || (r < 3 && c < 5)
        });

        for radius in 1..=4 {
            assert_eq!(
                binary_erosion(mask.view(), radius),
                brute_force_erosion(mask.view(), radius),
                "radius {radius}"
            );
        }
    }

    #[test]
    fn test_erosion_shrinks_thin_lines_away() {
        let mut mask = Array2::from_elem((9, 9), false);
        for c in 0..9 {
            mask[[4, c]] = true;
        }
        let eroded = binary_erosion(mask.view(), 1);
        assert!(eroded.iter().all(|&v| !v));
    }

    #[test]
    fn test_full_mask_survives_erosion() {
        let mask = Array2::from_elem((6, 6), true);
        assert_eq!(binary_erosion(mask.view(), 3), mask);
    }
}

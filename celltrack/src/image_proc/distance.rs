//! Exact Euclidean distance transform of a binary mask.
//!
//! Two separable passes: a forward/backward scan down each column gives the
//! 1D distance to the nearest background pixel, then each row takes the lower
//! envelope of parabolas rooted at those column distances (Felzenszwalb &
//! Huttenlocher, "Distance Transforms of Sampled Functions", 2012).

use ndarray::{Array2, ArrayView2, Axis};

/// Squared distance from every pixel to the nearest background pixel.
///
/// Background pixels are `0`. If the mask has no background at all every
/// pixel is `f64::INFINITY`.
pub fn squared_distance_transform(mask: ArrayView2<bool>) -> Array2<f64> {
    let (rows, cols) = mask.dim();
    let mut columns = Array2::from_elem((rows, cols), f64::INFINITY);

    for (mask_col, mut out_col) in mask
        .axis_iter(Axis(1))
        .zip(columns.axis_iter_mut(Axis(1)))
    {
        let mut last_background: Option<usize> = None;
        for r in 0..rows {
            if !mask_col[r] {
                last_background = Some(r);
            }
            if let Some(b) = last_background {
                out_col[r] = (r - b) as f64;
            }
        }
        last_background = None;
        for r in (0..rows).rev() {
            if !mask_col[r] {
                last_background = Some(r);
            }
            if let Some(b) = last_background {
                let d = (b - r) as f64;
                if d < out_col[r] {
                    out_col[r] = d;
                }
            }
        }
        out_col.mapv_inplace(|d| d * d);
    }

    let mut output = Array2::from_elem((rows, cols), f64::INFINITY);
    let mut sites: Vec<usize> = Vec::with_capacity(cols);
    let mut bounds: Vec<f64> = Vec::with_capacity(cols + 1);

    for (f, mut out_row) in columns.axis_iter(Axis(0)).zip(output.axis_iter_mut(Axis(0))) {
        sites.clear();
        bounds.clear();

        // Lower envelope over the finite parabolas only
        for q in 0..cols {
            if !f[q].is_finite() {
                continue;
            }
            loop {
                let Some(&p) = sites.last() else {
                    sites.push(q);
                    bounds.push(f64::NEG_INFINITY);
                    break;
                };
                let s = ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64))
                    / (2.0 * (q as f64 - p as f64));
                if sites.len() > 1 && s <= *bounds.last().unwrap_or(&f64::NEG_INFINITY) {
                    sites.pop();
                    bounds.pop();
                } else {
                    sites.push(q);
                    bounds.push(s);
                    break;
                }
            }
        }

        if sites.is_empty() {
            continue;
        }

        let mut k = 0;
        for x in 0..cols {
            while k + 1 < sites.len() && bounds[k + 1] < x as f64 {
                k += 1;
            }
            let p = sites[k];
            let dx = x as f64 - p as f64;
            out_row[x] = dx * dx + f[p];
        }
    }

    output
}

/// Euclidean distance from every pixel to the nearest background pixel.
pub fn distance_transform(mask: ArrayView2<bool>) -> Array2<f64> {
    squared_distance_transform(mask).mapv(f64::sqrt)
}

//! Fast-marching inpainting (Telea).
//!
//! Masked pixels are filled in order of increasing distance from the mask
//! boundary. Each known pixel `q` within `radius` of the target `p` contributes
//! its first-order estimate `I(q) + grad I(q) . (p - q)`, weighted by direction
//! (alignment with the distance gradient), geometric distance and level-set
//! distance. As in OpenCV, the gradient part enters normalized: the fill is the
//! weighted mean plus `(Jx + Jy) / |J|`, with `J` the weighted sum of
//! `grad I(q) * (p - q)` per axis.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use derma_core::{CoreError, Result};
use image::{GrayImage, RgbImage};

const FAR: f32 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    t: f32,
    idx: usize,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    // Min-heap on arrival time, then on index for a deterministic order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

struct Field {
    width: usize,
    height: usize,
    flags: Vec<Flag>,
    t: Vec<f32>,
}

impl Field {
    fn flag(&self, x: isize, y: isize) -> Option<Flag> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(self.flags[y as usize * self.width + x as usize])
    }

    fn time(&self, x: isize, y: isize) -> f32 {
        self.t[y as usize * self.width + x as usize]
    }

    fn is_known(&self, x: isize, y: isize) -> bool {
        self.flag(x, y) == Some(Flag::Known)
    }

    fn not_inside(&self, x: isize, y: isize) -> bool {
        matches!(self.flag(x, y), Some(Flag::Known | Flag::Band))
    }

    /// First-order upwind solution of |grad T| = 1 from two neighbours.
    fn solve(&self, x1: isize, y1: isize, x2: isize, y2: isize) -> f32 {
        match (self.is_known(x1, y1), self.is_known(x2, y2)) {
            (true, true) => {
                let (t1, t2) = (self.time(x1, y1), self.time(x2, y2));
                let d = 2.0 - (t1 - t2) * (t1 - t2);
                if d < 0.0 {
                    return 1.0 + t1.min(t2);
                }
                let r = d.sqrt();
                let s = (t1 + t2 - r) / 2.0;
                if s >= t1 && s >= t2 {
                    s
                } else {
                    let s = s + r;
                    if s >= t1 && s >= t2 {
                        s
                    } else {
                        FAR
                    }
                }
            }
            (true, false) => 1.0 + self.time(x1, y1),
            (false, true) => 1.0 + self.time(x2, y2),
            (false, false) => FAR,
        }
    }

    fn arrival_time(&self, x: isize, y: isize) -> f32 {
        self.solve(x - 1, y, x, y - 1)
            .min(self.solve(x + 1, y, x, y - 1))
            .min(self.solve(x - 1, y, x, y + 1))
            .min(self.solve(x + 1, y, x, y + 1))
    }

    fn axis_gradient(&self, x: isize, y: isize, dx: isize, dy: isize) -> f32 {
        let t = self.time(x, y);
        let fwd = self.not_inside(x + dx, y + dy);
        let bwd = self.not_inside(x - dx, y - dy);
        match (fwd, bwd) {
            (true, true) => (self.time(x + dx, y + dy) - self.time(x - dx, y - dy)) * 0.5,
            (true, false) => self.time(x + dx, y + dy) - t,
            (false, true) => t - self.time(x - dx, y - dy),
            (false, false) => 0.0,
        }
    }

    /// Finite difference of channel `c` along one axis, over pixels that are not inside.
    fn intensity_gradient(&self, image: &RgbImage, x: isize, y: isize, dx: isize, dy: isize, c: usize) -> f32 {
        let at = |x: isize, y: isize| f32::from(image.get_pixel(x as u32, y as u32).0[c]);
        let fwd = self.not_inside(x + dx, y + dy);
        let bwd = self.not_inside(x - dx, y - dy);
        match (fwd, bwd) {
            (true, true) => (at(x + dx, y + dy) - at(x - dx, y - dy)) * 0.5,
            (true, false) => at(x + dx, y + dy) - at(x, y),
            (false, true) => at(x, y) - at(x - dx, y - dy),
            (false, false) => 0.0,
        }
    }
}

/// Inpaint `image` at every non-zero pixel of `mask`.
///
/// # Errors
///
/// Fails if the mask and image sizes differ, or if the mask leaves no known
/// pixel to propagate from.
pub fn inpaint_telea(image: &RgbImage, mask: &GrayImage, radius: f32) -> Result<RgbImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(CoreError::degraded(
            "inpaint",
            format!(
                "mask is {:?}, image is {:?}",
                mask.dimensions(),
                image.dimensions()
            ),
        ));
    }
    let (width, height) = (image.width() as usize, image.height() as usize);
    let masked = mask.as_raw().iter().filter(|&&v| v != 0).count();
    if masked == 0 {
        return Ok(image.clone());
    }
    if masked == width * height {
        return Err(CoreError::degraded("inpaint", "mask covers the whole image"));
    }

    let mut field = Field {
        width,
        height,
        flags: mask
            .as_raw()
            .iter()
            .map(|&v| if v != 0 { Flag::Inside } else { Flag::Known })
            .collect(),
        t: mask
            .as_raw()
            .iter()
            .map(|&v| if v != 0 { FAR } else { 0.0 })
            .collect(),
    };

    let mut heap = BinaryHeap::new();
    for y in 0..height as isize {
        for x in 0..width as isize {
            if field.flag(x, y) != Some(Flag::Known) {
                continue;
            }
            let touches_mask = NEIGHBOURS
                .iter()
                .any(|(dx, dy)| field.flag(x + dx, y + dy) == Some(Flag::Inside));
            if touches_mask {
                let idx = y as usize * width + x as usize;
                field.flags[idx] = Flag::Band;
                heap.push(Node { t: 0.0, idx });
            }
        }
    }

    let mut out = image.clone();
    let radius = radius.max(1.0);
    let reach = radius.ceil() as isize;
    let radius_sq = radius * radius;

    while let Some(Node { idx, .. }) = heap.pop() {
        if field.flags[idx] == Flag::Known {
            continue;
        }
        field.flags[idx] = Flag::Known;
        let (cx, cy) = ((idx % width) as isize, (idx / width) as isize);

        for (dx, dy) in NEIGHBOURS {
            let (x, y) = (cx + dx, cy + dy);
            if field.flag(x, y) != Some(Flag::Inside) {
                continue;
            }
            let nidx = y as usize * width + x as usize;
            let t = field.arrival_time(x, y);
            field.t[nidx] = t;

            let grad_x = field.axis_gradient(x, y, 1, 0);
            let grad_y = field.axis_gradient(x, y, 0, 1);

            let mut acc = [0.0f32; 3];
            let mut jx = [0.0f32; 3];
            let mut jy = [0.0f32; 3];
            let mut total = 0.0f32;
            for ky in (y - reach)..=(y + reach) {
                for kx in (x - reach)..=(x + reach) {
                    if !field.not_inside(kx, ky) {
                        continue;
                    }
                    let (rx, ry) = ((x - kx) as f32, (y - ky) as f32);
                    let len_sq = rx * rx + ry * ry;
                    if len_sq == 0.0 || len_sq > radius_sq {
                        continue;
                    }
                    let mut dir = rx * grad_x + ry * grad_y;
                    if dir.abs() <= 0.01 {
                        dir = 1.0e-6;
                    }
                    let dst = 1.0 / (len_sq * len_sq.sqrt());
                    let lev = 1.0 / (1.0 + (field.time(kx, ky) - t).abs());
                    let w = (dir * dst * lev).abs();

                    let px = out.get_pixel(kx as u32, ky as u32).0;
                    for c in 0..3 {
                        acc[c] += w * f32::from(px[c]);
                        jx[c] += w * field.intensity_gradient(&out, kx, ky, 1, 0, c) * rx;
                        jy[c] += w * field.intensity_gradient(&out, kx, ky, 0, 1, c) * ry;
                    }
                    total += w;
                }
            }

            if total > 0.0 {
                let mut filled = [0u8; 3];
                for c in 0..3 {
                    let norm = (jx[c] * jx[c] + jy[c] * jy[c]).sqrt() + 1.0e-20;
                    let value = acc[c] / total + (jx[c] + jy[c]) / norm;
                    filled[c] = value.round().clamp(0.0, 255.0) as u8;
                }
                out.put_pixel(x as u32, y as u32, image::Rgb(filled));
            }
            field.flags[nidx] = Flag::Band;
            heap.push(Node { t, idx: nidx });
        }
    }

    Ok(out)
}

const NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (0, -1), (1, 0), (0, 1)];

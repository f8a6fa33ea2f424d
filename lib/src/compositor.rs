use crate::{
    image_float::{ImageFloat, Pixel},
    layout::{PatchLayout, PlacedPatch},
    mask::{Mask, MaskValue},
    Error,
};
use rstar::{RTree, RTreeObject, AABB};

/// How the committed patches are painted into the output
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PatchType {
    /// Each patch copies the pixels of its source patch
    Normal,
    /// Each patch is a solid color, going through the rainbow from red for
    /// the first committed patch to violet for the last
    DebugPatchOrder,
}

impl Default for PatchType {
    fn default() -> Self {
        Self::Normal
    }
}

const RAINBOW: [Pixel; 7] = [
    Pixel::new(1.0, 0.0, 0.0), // red
    Pixel::new(1.0, 0.65, 0.0), // orange
    Pixel::new(1.0, 1.0, 0.0), // yellow
    Pixel::new(0.0, 0.5, 0.0), // green
    Pixel::new(0.0, 0.0, 1.0), // blue
    Pixel::new(0.3, 0.0, 0.51), // indigo
    Pixel::new(0.93, 0.51, 0.93), // violet
];

/// Maps `alpha` in `[0, 1]` onto a red to violet rainbow
pub fn rainbow_color(alpha: f32) -> Pixel {
    let alpha = alpha.max(0.0).min(1.0);
    let scaled = alpha * (RAINBOW.len() - 1) as f32;
    let low = (scaled as usize).min(RAINBOW.len() - 2);

    RAINBOW[low].lerp(RAINBOW[low + 1], scaled - low as f32)
}

/// The output rectangle a placed patch covers, inclusive on both ends
struct Footprint {
    rank: usize,
    min: [i32; 2],
    max: [i32; 2],
}

impl RTreeObject for Footprint {
    type Envelope = AABB<[i32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// Blends the placed patches of `layout` over the unknown pixels of `mask`,
/// every other pixel being copied from `source` as is.
///
/// A patch pixel is weighted by its distance to the nearest edge of the
/// patch, so seams between overlapping patches are feathered.
pub(crate) fn composite(
    source: &ImageFloat,
    mask: &Mask,
    layout: &PatchLayout,
    patch_type: PatchType,
) -> Result<ImageFloat, Error> {
    debug_assert_eq!(source.dims(), mask.dims());

    let patch = layout.patch_dims();
    let (pw, ph) = (patch.width as i32, patch.height as i32);
    let (hw, hh) = (pw / 2, ph / 2);
    let patches = layout.patches();

    let footprints = patches
        .iter()
        .enumerate()
        .map(|(rank, p)| Footprint {
            rank,
            min: [p.x - hw, p.y - hh],
            max: [p.x - hw + pw - 1, p.y - hh + ph - 1],
        })
        .collect();
    let tree = RTree::bulk_load(footprints);

    let colors: Vec<Pixel> = match patch_type {
        PatchType::Normal => Vec::new(),
        PatchType::DebugPatchOrder => {
            let n = patches.len();
            (0..n)
                .map(|rank| {
                    let alpha = if n > 1 {
                        rank as f32 / (n - 1) as f32
                    } else {
                        0.0
                    };
                    rainbow_color(alpha)
                })
                .collect()
        }
    };

    let mut out = ImageFloat::default();
    source.copy_to(&mut out);

    let mut hits: Vec<usize> = Vec::new();
    for y in 0..source.height() {
        for x in 0..source.width() {
            if mask.get(x, y) != MaskValue::Unknown {
                continue;
            }

            let (x, y) = (x as i32, y as i32);

            // a fixed summation order keeps the output independent of the
            // tree's internal layout
            hits.clear();
            hits.extend(
                tree.locate_in_envelope_intersecting(&AABB::from_point([x, y]))
                    .map(|fp| fp.rank),
            );
            hits.sort_unstable();

            let mut sum = Pixel::BLACK;
            let mut weight_sum = 0.0;
            for rank in &hits {
                let PlacedPatch { x: px, y: py, label } = patches[*rank];
                let (i, j) = (x - (px - hw), y - (py - hh));
                let weight = edge_distance(i, pw).min(edge_distance(j, ph));

                let color = match patch_type {
                    PatchType::Normal => source.pixel_i(label.x - hw + i, label.y - hh + j),
                    PatchType::DebugPatchOrder => colors[*rank],
                };

                sum = sum + color * weight;
                weight_sum += weight;
            }

            debug_assert!(weight_sum > 0.0, "unknown pixel {},{} is not covered", x, y);
            if weight_sum > 0.0 {
                out.set_pixel(x as u32, y as u32, sum / weight_sum);
            }
        }
    }

    Ok(out)
}

/// Distance from the center of pixel `i` to the nearest border of a `len`
/// pixels wide span
#[inline]
fn edge_distance(i: i32, len: i32) -> f32 {
    let i = i as f32 + 0.5;
    i.min(len as f32 - i)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{label::Label, Dims};

    fn close(a: Pixel, b: Pixel) -> bool {
        (a.r - b.r).abs() < 1e-5 && (a.g - b.g).abs() < 1e-5 && (a.b - b.b).abs() < 1e-5
    }

    #[test]
    fn rainbow_ends() {
        assert_eq!(rainbow_color(0.0), Pixel::new(1.0, 0.0, 0.0));
        assert!(close(rainbow_color(1.0), Pixel::new(0.93, 0.51, 0.93)));
        assert!(close(rainbow_color(0.5), Pixel::new(0.0, 0.5, 0.0)));

        // halfway between red and orange
        assert!(close(rainbow_color(1.0 / 12.0), Pixel::new(1.0, 0.325, 0.0)));
    }

    #[test]
    fn feathering_weights() {
        assert_eq!(edge_distance(0, 5), 0.5);
        assert_eq!(edge_distance(2, 5), 2.5);
        assert_eq!(edge_distance(4, 5), 0.5);
    }

    #[test]
    fn blends_overlapping_patches() {
        // left half black, right half white, with a single unknown pixel
        let source = ImageFloat::from_fn(12, 5, |x, _| {
            if x < 6 {
                Pixel::BLACK
            } else {
                Pixel::gray(1.0)
            }
        })
        .unwrap();
        let mask = Mask::from_fn(12, 5, |x, y| {
            if x == 2 && y == 2 {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap();

        // one patch sourced from the black side, the other from the white one
        let layout = PatchLayout::new(
            source.dims(),
            Dims::square(3),
            vec![
                PlacedPatch {
                    x: 2,
                    y: 2,
                    label: Label::new(1, 2),
                },
                PlacedPatch {
                    x: 3,
                    y: 2,
                    label: Label::new(9, 2),
                },
            ],
        );

        let out = composite(&source, &mask, &layout, PatchType::Normal).unwrap();

        // the first patch covers the pixel with its center (weight 1.5), the
        // second with its left column (weight 0.5)
        assert!(close(out.pixel(2, 2), Pixel::gray(0.25)));

        for y in 0..5 {
            for x in 0..12 {
                if (x, y) != (2, 2) {
                    assert_eq!(out.pixel(x, y), source.pixel(x, y));
                }
            }
        }
    }
}

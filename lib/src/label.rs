use crate::{
    mask::{Mask, MaskValue},
    Dims, Error,
};

/// A candidate source patch, identified by the coordinate of its center
/// pixel on the current pyramid level
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label {
    pub x: i32,
    pub y: i32,
}

impl Label {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    fn row_major_key(self) -> (i32, i32) {
        (self.y, self.x)
    }
}

/// Returns true if the patch centered on `label` lies entirely on known
/// pixels of `mask`
#[inline]
pub(crate) fn is_valid(mask: &Mask, patch: Dims, label: Label) -> bool {
    let (hw, hh) = (patch.width as i32 / 2, patch.height as i32 / 2);
    mask.region_is_all(
        label.x - hw,
        label.y - hh,
        patch.width,
        patch.height,
        MaskValue::Known,
    )
}

/// The pool of every valid source patch on a pyramid level, in row-major
/// order of their centers
pub(crate) struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    pub(crate) fn enumerate(mask: &Mask, patch: Dims) -> Result<Self, Error> {
        let (hw, hh) = (patch.width as i32 / 2, patch.height as i32 / 2);
        let (w, h) = (mask.width() as i32, mask.height() as i32);

        let mut labels = Vec::new();
        for y in hh..h - hh {
            for x in hw..w - hw {
                let label = Label::new(x, y);
                if is_valid(mask, patch, label) {
                    if labels.len() == labels.capacity() {
                        labels.try_reserve(labels.len().max(64))?;
                    }
                    labels.push(label);
                }
            }
        }

        Ok(Self { labels })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[Label] {
        &self.labels
    }
}

/// Collects the valid labels within Chebyshev distance `radius` of each of
/// the `centers`, sorted in row-major order without duplicates
pub(crate) fn refine(mask: &Mask, patch: Dims, centers: &[Label], radius: u32) -> Vec<Label> {
    let r = radius as i32;
    let mut labels = Vec::with_capacity(centers.len() * ((2 * r + 1) * (2 * r + 1)) as usize);

    for center in centers {
        for y in center.y - r..=center.y + r {
            for x in center.x - r..=center.x + r {
                let label = Label::new(x, y);
                if is_valid(mask, patch, label) {
                    labels.push(label);
                }
            }
        }
    }

    labels.sort_unstable_by_key(|l| l.row_major_key());
    labels.dedup();
    labels
}

#[cfg(test)]
mod test {
    use super::*;

    fn square_hole(size: u32, from: u32, to: u32) -> Mask {
        Mask::from_fn(size, size, |x, y| {
            if (from..to).contains(&x) && (from..to).contains(&y) {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap()
    }

    #[test]
    fn enumerates_patches_clear_of_the_hole() {
        let mask = square_hole(8, 3, 5);
        let labels = LabelSet::enumerate(&mask, Dims::square(3)).unwrap();

        assert!(!labels.is_empty());
        for l in labels.as_slice() {
            assert!(l.x >= 1 && l.x <= 6 && l.y >= 1 && l.y <= 6);
            // the 3x3 patch must not touch the 3..5 hole
            let touches = (l.x - 1..=l.x + 1).any(|x| (3..5).contains(&x))
                && (l.y - 1..=l.y + 1).any(|y| (3..5).contains(&y));
            assert!(!touches, "{:?} overlaps the hole", l);
        }

        // 6x6 possible centers, minus those within 1 pixel of the 2x2 hole
        assert_eq!(labels.len(), 36 - 16);

        let keys: Vec<_> = labels.as_slice().iter().map(|l| l.row_major_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn ignored_pixels_are_not_sources() {
        let mask = Mask::from_fn(5, 5, |x, _| {
            if x == 4 {
                MaskValue::Ignored
            } else {
                MaskValue::Known
            }
        })
        .unwrap();

        let labels = LabelSet::enumerate(&mask, Dims::square(3)).unwrap();
        assert!(labels.as_slice().iter().all(|l| l.x <= 2));
        assert_eq!(labels.len(), 6);
    }

    #[test]
    fn refine_window() {
        let mask = Mask::filled(10, 10, MaskValue::Known).unwrap();
        let patch = Dims::square(3);

        let labels = refine(&mask, patch, &[Label::new(5, 5)], 1);
        assert_eq!(labels.len(), 9);

        // clipped by the border, and deduplicated between the 2 windows
        let labels = refine(&mask, patch, &[Label::new(1, 1), Label::new(2, 1)], 1);
        assert_eq!(
            labels,
            vec![
                Label::new(1, 1),
                Label::new(2, 1),
                Label::new(3, 1),
                Label::new(1, 2),
                Label::new(2, 2),
                Label::new(3, 2),
            ]
        );
    }
}

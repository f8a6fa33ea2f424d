use crate::{
    image_float::{ImageFloat, Pixel},
    label::Label,
    mask::{Mask, MaskValue},
    node::NeighborEdge,
    parallel, Dims, Error,
};

/// The part of two neighboring patches that overlaps, in patch-local
/// coordinates of the sender and of the receiver
#[derive(Copy, Clone, Debug)]
struct Overlap {
    width: i32,
    height: i32,
    sender: (i32, i32),
    receiver: (i32, i32),
}

/// Computes the data and smoothness terms of the MRF for a single pyramid
/// level.
///
/// Both terms are *mean* squared differences, so that patches clipped by the
/// image border or by ignored pixels are compared on the same scale as whole
/// ones.
pub(crate) struct EnergyCalculator<'a> {
    image: &'a ImageFloat,
    mask: &'a Mask,
    patch: Dims,
    gap: Dims,
    max_thread_count: usize,
}

impl<'a> EnergyCalculator<'a> {
    pub(crate) fn new(
        image: &'a ImageFloat,
        mask: &'a Mask,
        patch: Dims,
        gap: Dims,
        max_thread_count: usize,
    ) -> Self {
        debug_assert_eq!(image.dims(), mask.dims());
        Self {
            image,
            mask,
            patch,
            gap,
            max_thread_count: max_thread_count.max(1),
        }
    }

    #[inline]
    fn half_patch(&self) -> (i32, i32) {
        (self.patch.width as i32 / 2, self.patch.height as i32 / 2)
    }

    /// The known pixels of the patch centered on a node, as patch-local
    /// offsets paired with their color
    fn evidence(&self, x: i32, y: i32) -> Vec<(i32, i32, Pixel)> {
        let (hw, hh) = self.half_patch();
        let mut evidence = Vec::new();

        for j in 0..self.patch.height as i32 {
            for i in 0..self.patch.width as i32 {
                let (px, py) = (x - hw + i, y - hh + j);
                if self.mask.get_i(px, py) == MaskValue::Known {
                    evidence.push((i, j, self.image.pixel_i(px, py)));
                }
            }
        }

        evidence
    }

    #[inline]
    fn evidence_energy(&self, evidence: &[(i32, i32, Pixel)], label: Label) -> f32 {
        if evidence.is_empty() {
            return 0.0;
        }

        let (hw, hh) = self.half_patch();
        let (sx, sy) = (label.x - hw, label.y - hh);
        let ssd: f32 = evidence
            .iter()
            .map(|&(i, j, px)| px.distance_2(self.image.pixel_i(sx + i, sy + j)))
            .sum();

        ssd / evidence.len() as f32
    }

    /// The data term: how well the patch centered on `label` matches the
    /// known pixels around the node at `x`,`y`
    #[cfg(test)]
    pub(crate) fn local(&self, x: i32, y: i32, label: Label) -> f32 {
        self.evidence_energy(&self.evidence(x, y), label)
    }

    /// The data term for every candidate of a node
    pub(crate) fn local_energies(
        &self,
        x: i32,
        y: i32,
        labels: &[Label],
    ) -> Result<Vec<f32>, Error> {
        let evidence = self.evidence(x, y);

        let mut energies = Vec::new();
        energies.try_reserve_exact(labels.len())?;
        energies.resize(labels.len(), 0.0);

        parallel::fill(&mut energies, self.max_thread_count, |i| {
            self.evidence_energy(&evidence, labels[i])
        });

        Ok(energies)
    }

    fn overlap(&self, edge: NeighborEdge) -> Overlap {
        let (pw, ph) = (self.patch.width as i32, self.patch.height as i32);
        let (gx, gy) = (self.gap.width as i32, self.gap.height as i32);

        match edge {
            NeighborEdge::Right => Overlap {
                width: pw - gx,
                height: ph,
                sender: (gx, 0),
                receiver: (0, 0),
            },
            NeighborEdge::Left => Overlap {
                width: pw - gx,
                height: ph,
                sender: (0, 0),
                receiver: (gx, 0),
            },
            NeighborEdge::Bottom => Overlap {
                width: pw,
                height: ph - gy,
                sender: (0, gy),
                receiver: (0, 0),
            },
            NeighborEdge::Top => Overlap {
                width: pw,
                height: ph - gy,
                sender: (0, 0),
                receiver: (0, gy),
            },
        }
    }

    /// Sums the overlap SSD row by row, giving up with `None` as soon as
    /// `base` plus the mean so far reaches `bound`
    #[inline]
    fn overlap_energy(
        &self,
        overlap: &Overlap,
        sender: Label,
        receiver: Label,
        base: f32,
        bound: f32,
    ) -> Option<f32> {
        if overlap.width <= 0 || overlap.height <= 0 {
            return if base < bound { Some(0.0) } else { None };
        }

        let (hw, hh) = self.half_patch();
        let (ax, ay) = (
            sender.x - hw + overlap.sender.0,
            sender.y - hh + overlap.sender.1,
        );
        let (bx, by) = (
            receiver.x - hw + overlap.receiver.0,
            receiver.y - hh + overlap.receiver.1,
        );
        let inv_count = 1.0 / (overlap.width * overlap.height) as f32;

        let mut ssd = 0.0;
        for j in 0..overlap.height {
            for i in 0..overlap.width {
                ssd += self
                    .image
                    .pixel_i(ax + i, ay + j)
                    .distance_2(self.image.pixel_i(bx + i, by + j));
            }

            if base + ssd * inv_count >= bound {
                return None;
            }
        }

        Some(ssd * inv_count)
    }

    /// The smoothness term between a sender patch and the receiver patch one
    /// lattice step away along `edge`
    pub(crate) fn pairwise(&self, sender: Label, receiver: Label, edge: NeighborEdge) -> f32 {
        let overlap = self.overlap(edge);
        self.overlap_energy(&overlap, sender, receiver, 0.0, std::f32::INFINITY)
            .unwrap_or(std::f32::INFINITY)
    }

    /// Computes the min-sum message for every receiver label, where
    /// `costs[s]` is the sender's belief for `sender_labels[s]` without the
    /// receiver's own message. The result is shifted so its minimum is 0.
    pub(crate) fn message(
        &self,
        sender_labels: &[Label],
        costs: &[f32],
        receiver_labels: &[Label],
        edge: NeighborEdge,
    ) -> Result<Vec<f32>, Error> {
        debug_assert_eq!(sender_labels.len(), costs.len());
        debug_assert!(!sender_labels.is_empty());

        let mut msg = Vec::new();
        msg.try_reserve_exact(receiver_labels.len())?;
        msg.resize(receiver_labels.len(), 0.0);

        if let [committed] = sender_labels {
            parallel::fill(&mut msg, self.max_thread_count, |r| {
                self.pairwise(*committed, receiver_labels[r], edge)
            });
            normalize(&mut msg);
            return Ok(msg);
        }

        let overlap = self.overlap(edge);

        // Visiting senders cheapest first lets most of them be skipped once a
        // good minimum is known, since the pairwise term is never negative
        let mut order: Vec<usize> = (0..costs.len()).collect();
        order.sort_by(|a, b| costs[*a].total_cmp(&costs[*b]).then(a.cmp(b)));

        parallel::fill(&mut msg, self.max_thread_count, |r| {
            let receiver = receiver_labels[r];
            let mut best = std::f32::INFINITY;

            for &s in &order {
                if costs[s] >= best {
                    break;
                }

                if let Some(v) =
                    self.overlap_energy(&overlap, sender_labels[s], receiver, costs[s], best)
                {
                    best = costs[s] + v;
                }
            }

            best
        });

        normalize(&mut msg);
        Ok(msg)
    }
}

/// Shifts a message so that its smallest entry is 0
fn normalize(msg: &mut [f32]) {
    let min = msg.iter().copied().fold(std::f32::INFINITY, f32::min);
    if min.is_finite() {
        for m in msg.iter_mut() {
            *m -= min;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn checker(size: u32) -> ImageFloat {
        ImageFloat::from_fn(size, size, |x, y| {
            Pixel::new(
                ((x * 37 + y * 11) % 17) as f32 / 16.0,
                ((x * 5 + y * 23) % 13) as f32 / 12.0,
                ((x + y) % 2) as f32,
            )
        })
        .unwrap()
    }

    #[test]
    fn pairwise_is_symmetric() {
        let img = checker(24);
        let mask = Mask::filled(24, 24, MaskValue::Known).unwrap();
        let calc = EnergyCalculator::new(&img, &mask, Dims::square(5), Dims::new(2, 3), 1);

        let a = Label::new(6, 7);
        let b = Label::new(13, 9);

        assert_eq!(
            calc.pairwise(a, b, NeighborEdge::Left),
            calc.pairwise(b, a, NeighborEdge::Right)
        );
        assert_eq!(
            calc.pairwise(a, b, NeighborEdge::Top),
            calc.pairwise(b, a, NeighborEdge::Bottom)
        );
        assert!(calc.pairwise(a, b, NeighborEdge::Left) > 0.0);
    }

    #[test]
    fn pairwise_of_continuous_patches_is_zero() {
        let img = checker(24);
        let mask = Mask::filled(24, 24, MaskValue::Known).unwrap();
        let calc = EnergyCalculator::new(&img, &mask, Dims::square(5), Dims::square(2), 1);

        // two patches copied from where they sit relative to each other agree
        let a = Label::new(8, 8);
        assert_eq!(calc.pairwise(a, Label::new(10, 8), NeighborEdge::Right), 0.0);
        assert_eq!(calc.pairwise(a, Label::new(8, 6), NeighborEdge::Top), 0.0);
    }

    #[test]
    fn no_overlap_no_energy() {
        let img = checker(24);
        let mask = Mask::filled(24, 24, MaskValue::Known).unwrap();
        let calc = EnergyCalculator::new(&img, &mask, Dims::square(3), Dims::square(3), 1);

        assert_eq!(
            calc.pairwise(Label::new(4, 4), Label::new(15, 9), NeighborEdge::Bottom),
            0.0
        );
    }

    #[test]
    fn local_energy_skips_unknown_and_off_image() {
        let img = ImageFloat::from_fn(8, 8, |x, _| Pixel::gray(x as f32 / 8.0)).unwrap();
        let mask = Mask::from_fn(8, 8, |x, y| {
            if x == 1 && y == 1 {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap();
        let calc = EnergyCalculator::new(&img, &mask, Dims::square(3), Dims::square(2), 1);

        // the node at the corner only sees 3 known pixels, all matching the
        // label 4 columns to the right with an offset of 0.5 each
        let e = calc.local(0, 0, Label::new(4, 1));
        assert!(e > 0.0);
        let expected = 3.0 * 0.5 * 0.5;
        assert!((e - expected).abs() < 1e-6, "{} != {}", e, expected);

        // a node whose patch only covers the hole and the outside has no
        // evidence at all
        let lonely = Mask::from_fn(8, 8, |x, y| {
            if x < 2 && y < 2 {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap();
        let calc = EnergyCalculator::new(&img, &lonely, Dims::square(3), Dims::square(2), 1);
        assert_eq!(calc.local(0, 0, Label::new(4, 4)), 0.0);
        assert_eq!(
            calc.local_energies(0, 0, &[Label::new(4, 4), Label::new(5, 5)])
                .unwrap(),
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn message_is_normalized_min_sum() {
        let img = checker(24);
        let mask = Mask::filled(24, 24, MaskValue::Known).unwrap();
        let calc = EnergyCalculator::new(&img, &mask, Dims::square(5), Dims::square(3), 1);

        let senders = [Label::new(5, 5), Label::new(9, 12), Label::new(15, 7)];
        let costs = [0.3, 0.0, 1.5];
        let receivers = [
            Label::new(8, 5),
            Label::new(12, 12),
            Label::new(4, 18),
            Label::new(18, 7),
        ];

        let msg = calc
            .message(&senders, &costs, &receivers, NeighborEdge::Right)
            .unwrap();

        let brute: Vec<f32> = receivers
            .iter()
            .map(|r| {
                senders
                    .iter()
                    .zip(costs.iter())
                    .map(|(s, c)| c + calc.pairwise(*s, *r, NeighborEdge::Right))
                    .fold(std::f32::INFINITY, f32::min)
            })
            .collect();
        let min = brute.iter().copied().fold(std::f32::INFINITY, f32::min);

        for (m, b) in msg.iter().zip(brute.iter()) {
            assert!(m.is_finite());
            assert!((m - (b - min)).abs() < 1e-6);
        }
        assert!(msg.iter().any(|m| *m == 0.0));
    }

    #[test]
    fn message_independent_of_threads() {
        let img = checker(64);
        let mask = Mask::filled(64, 64, MaskValue::Known).unwrap();
        let labels = crate::label::LabelSet::enumerate(&mask, Dims::square(5)).unwrap();
        let costs: Vec<f32> = (0..labels.len()).map(|i| (i % 7) as f32 * 0.01).collect();

        let serial = EnergyCalculator::new(&img, &mask, Dims::square(5), Dims::square(2), 1);
        let wide = EnergyCalculator::new(&img, &mask, Dims::square(5), Dims::square(2), 8);

        let senders = &labels.as_slice()[..40];
        let a = serial
            .message(senders, &costs[..40], labels.as_slice(), NeighborEdge::Bottom)
            .unwrap();
        let b = wide
            .message(senders, &costs[..40], labels.as_slice(), NeighborEdge::Bottom)
            .unwrap();
        assert_eq!(a, b);
    }
}

use crate::{
    compositor,
    energy::EnergyCalculator,
    errors::TooCoarse,
    image_float::ImageFloat,
    img_pyramid::ImagePyramid,
    label::{self, Label, LabelSet},
    lattice::NodeSet,
    layout::{PatchLayout, PlacedPatch},
    mask::{Mask, MaskPyramid, MaskValue},
    node::{NeighborEdge, NodeId, Seed},
    CompletionProgress, Dims, Error, ProgressStat, ProgressUpdate, Settings,
};
use rstar::{primitives::PointWithData, PointDistance, RTree, AABB};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A flag that can be raised from any thread to stop a running completion.
///
/// The solver checks it before committing each node, a cancelled completion
/// returns `Error::Cancelled`.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The completed image, along with the placement of every patch that was
/// used to fill the hole
#[derive(Debug)]
pub struct Completion {
    pub image: ImageFloat,
    pub layout: PatchLayout,
}

/// Fills the unknown pixels of `mask` in `input`
pub fn complete(
    input: &ImageFloat,
    mask: &Mask,
    settings: &Settings,
) -> Result<Completion, Error> {
    complete_with(input, mask, settings, None, None)
}

/// Same as `complete`, with optional progress reporting and cancellation
pub fn complete_with(
    input: &ImageFloat,
    mask: &Mask,
    settings: &Settings,
    mut progress: Option<&mut dyn CompletionProgress>,
    cancel: Option<&CancelToken>,
) -> Result<Completion, Error> {
    settings.validate()?;

    if input.dims() != mask.dims() {
        return Err(Error::DimensionMismatch(crate::errors::SizeMismatch {
            image: (input.width(), input.height()),
            mask: (mask.width(), mask.height()),
        }));
    }

    let patch = settings.patch_dims();
    let gap = settings.gap_dims();

    if mask.count(MaskValue::Unknown) == 0 {
        log::info!("the mask has no unknown pixels, nothing to complete");
        return Ok(Completion {
            image: input.clone(),
            layout: PatchLayout::new(input.dims(), patch, Vec::new()),
        });
    }

    if mask.count(MaskValue::Known) == 0 {
        return Err(Error::FullyUnknown);
    }

    if input.width() < patch.width || input.height() < patch.height {
        return Err(Error::TooCoarse(TooCoarse {
            depth: 0,
            dims: (input.width(), input.height()),
            min_dims: (patch.width, patch.height),
        }));
    }

    let mut labels = LabelSet::enumerate(mask, patch)?;
    if labels.is_empty() {
        return Err(Error::NoSourcePatches);
    }

    let mut images = ImagePyramid::new(input, patch);
    let mut masks = MaskPyramid::new(mask, patch);

    // Go as coarse as allowed, stopping early at the first level that would
    // be too small for a patch or that has no source patch left
    while images.depth() + 1 < settings.pyramid_levels as usize {
        match images.scale_down() {
            Ok(()) => {}
            Err(Error::TooCoarse(tc)) => {
                log::debug!("stopping the descent: {}", tc);
                break;
            }
            Err(err) => return Err(err),
        }
        masks.scale_down()?;

        let level = masks.current();
        let has_sources =
            masks.region_has_any(0, 0, level.width(), level.height(), MaskValue::Known);
        let coarser = if has_sources {
            Some(LabelSet::enumerate(level, patch)?)
        } else {
            None
        };

        match coarser.filter(|coarser| !coarser.is_empty()) {
            Some(coarser) => labels = coarser,
            None => {
                log::debug!(
                    "stopping the descent: no source patch fits at level {}",
                    images.depth()
                );
                images.scale_up();
                masks.scale_up();
                break;
            }
        }
    }

    let level_count = images.depth() + 1;
    log::debug!(
        "{} source patches at the coarsest level ({})",
        labels.len(),
        images.depth()
    );
    let mut full_labels = Some(labels);
    let mut seeds: Vec<Seed> = Vec::new();

    let layout = loop {
        let depth = images.depth();
        let image = images.current();
        let level_mask = masks.current();

        let energy = EnergyCalculator::new(
            image,
            level_mask,
            patch,
            gap,
            settings.max_thread_count,
        );

        let mut nodes = NodeSet::build(level_mask, patch, gap)?;
        assign_candidates(
            &mut nodes,
            &energy,
            level_mask,
            patch,
            &seeds,
            settings.refine_radius,
            &mut full_labels,
        )?;

        log::info!(
            "solving level {} ({}x{}) with {} nodes",
            depth,
            image.width(),
            image.height(),
            nodes.len()
        );

        let total = ProgressStat {
            current: level_count - 1 - depth,
            total: level_count,
        };

        LevelSolver {
            settings,
            energy: &energy,
            nodes: &mut nodes,
        }
        .run(&mut progress, total, cancel)?;

        if depth == 0 {
            let placed = nodes
                .commit_order()
                .iter()
                .filter_map(|id| {
                    let node = nodes.node(*id);
                    let (x, y) = node.position();
                    node.committed_label().map(|label| PlacedPatch { x, y, label })
                })
                .collect();

            break PatchLayout::new(input.dims(), patch, placed);
        }

        seeds = nodes.scale_up();
        images.scale_up();
        masks.scale_up();
        full_labels = None;
    };

    let image = compositor::composite(input, mask, &layout, settings.patch_type)?;

    Ok(Completion { image, layout })
}

/// Seeds every node with its candidate labels and their local energies.
///
/// Without seeds, ie. on the coarsest level, every node gets the full label
/// set. Otherwise each node refines the labels of the coarse nodes whose
/// patch covers it, or of the nearest coarse node.
fn assign_candidates(
    nodes: &mut NodeSet,
    energy: &EnergyCalculator<'_>,
    mask: &Mask,
    patch: Dims,
    seeds: &[Seed],
    refine_radius: u32,
    full_labels: &mut Option<LabelSet>,
) -> Result<(), Error> {
    let (hw, hh) = (patch.width as i32 / 2, patch.height as i32 / 2);

    let tree = RTree::bulk_load(
        seeds
            .iter()
            .enumerate()
            .map(|(i, s)| PointWithData::new(i, [s.x, s.y]))
            .collect(),
    );

    let mut fallbacks = 0;
    let mut matched = Vec::new();
    for id in 0..nodes.len() {
        let (x, y) = nodes.node(id).position();

        let candidates = if seeds.is_empty() {
            full_label_set(full_labels, mask, patch)?.as_slice().to_vec()
        } else {
            // coarse nodes sit at even fine coordinates, so this envelope
            // holds exactly the ones whose patch covers the node's center
            let (cx, cy) = (x.div_euclid(2), y.div_euclid(2));
            let covering = AABB::from_corners(
                [2 * (cx - hw), 2 * (cy - hh)],
                [2 * (cx + hw), 2 * (cy + hh)],
            );

            matched.clear();
            matched.extend(tree.locate_in_envelope(&covering).map(|p| p.data));

            if matched.is_empty() {
                if let Some(nearest) = nearest_seed(&tree, [x, y]) {
                    matched.push(nearest);
                }
            }
            matched.sort_unstable();

            let centers: Vec<Label> = matched
                .iter()
                .map(|i| Label::new(x + seeds[*i].dx, y + seeds[*i].dy))
                .collect();

            let refined = label::refine(mask, patch, &centers, refine_radius);
            if refined.is_empty() {
                fallbacks += 1;
                full_label_set(full_labels, mask, patch)?.as_slice().to_vec()
            } else {
                refined
            }
        };

        let local = energy.local_energies(x, y, &candidates)?;
        nodes.node_mut(id).set_candidates(candidates, local);
    }

    if fallbacks > 0 {
        log::debug!(
            "{} nodes had no valid refined label and use the full label set",
            fallbacks
        );
    }

    Ok(())
}

fn full_label_set<'l>(
    full_labels: &'l mut Option<LabelSet>,
    mask: &Mask,
    patch: Dims,
) -> Result<&'l LabelSet, Error> {
    let labels = match full_labels.take() {
        Some(labels) => labels,
        None => LabelSet::enumerate(mask, patch)?,
    };

    Ok(full_labels.insert(labels))
}

/// The seed closest to `point`, the first one on ties
fn nearest_seed(tree: &RTree<PointWithData<usize, [i32; 2]>>, point: [i32; 2]) -> Option<usize> {
    let mut iter = tree.nearest_neighbor_iter(&point);
    let first = iter.next()?;
    let distance = first.distance_2(&point);

    let mut best = first.data;
    for other in iter {
        if other.distance_2(&point) != distance {
            break;
        }
        best = best.min(other.data);
    }

    Some(best)
}

/// Runs priority-BP over the nodes of a single level until every one of them
/// is committed
struct LevelSolver<'s, 'a> {
    settings: &'s Settings,
    energy: &'s EnergyCalculator<'a>,
    nodes: &'s mut NodeSet,
}

impl<'s, 'a> LevelSolver<'s, 'a> {
    /// Returns the number of full passes that were run
    fn run(
        &mut self,
        progress: &mut Option<&mut dyn CompletionProgress>,
        total: ProgressStat,
        cancel: Option<&CancelToken>,
    ) -> Result<usize, Error> {
        let max_labels = self.settings.max_labels_per_node as usize;
        let pass_interval = self.settings.pass_interval as usize;

        self.nodes.update_uncommitted_priorities();

        let mut commits = 0;
        let mut full_passes = 0;
        // whether a full pass ran since the last commit
        let mut refreshed = false;

        while let Some(id) = self.nodes.highest_priority_uncommitted() {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                return Err(Error::Cancelled);
            }

            if let Some(threshold) = self.settings.confidence_threshold {
                if !refreshed && self.nodes.priority(id).0 < threshold {
                    self.full_pass()?;
                    full_passes += 1;
                    refreshed = true;
                    continue;
                }
            }

            self.nodes.node_mut(id).prune(max_labels);
            let label = self.nodes.commit(id);
            log::trace!(
                "committed node {} at {:?} to {:?}",
                id,
                self.nodes.node(id).position(),
                label
            );

            self.propagate(id)?;
            commits += 1;
            refreshed = false;

            if commits % pass_interval == 0 && !self.nodes.all_committed() {
                self.full_pass()?;
                full_passes += 1;
                refreshed = true;
            }

            if let Some(progress) = progress {
                progress.update(ProgressUpdate {
                    total,
                    stage: ProgressStat {
                        current: commits,
                        total: self.nodes.len(),
                    },
                });
            }
        }

        log::debug!(
            "{} nodes committed with {} full passes",
            commits,
            full_passes
        );

        Ok(full_passes)
    }

    /// Sends a message from a node to each of its undecided neighbors, and
    /// updates their priorities
    fn propagate(&mut self, id: NodeId) -> Result<(), Error> {
        for edge in NeighborEdge::ALL.iter() {
            if let Some(receiver) = self.nodes.send_message(id, *edge, self.energy)? {
                self.nodes.update_priority(receiver);
            }
        }

        Ok(())
    }

    /// Every undecided node, most confident first, prunes its candidates and
    /// sends messages to its undecided neighbors
    fn full_pass(&mut self) -> Result<(), Error> {
        let max_labels = self.settings.max_labels_per_node as usize;

        for id in self.nodes.uncommitted_by_priority() {
            self.nodes.node_mut(id).prune(max_labels);
            for edge in NeighborEdge::ALL.iter() {
                self.nodes.send_message(id, *edge, self.energy)?;
            }
        }

        self.nodes.update_uncommitted_priorities();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::image_float::Pixel;

    fn one_pixel_hole(size: u32, x: u32, y: u32) -> Mask {
        Mask::from_fn(size, size, |px, py| {
            if px == x && py == y {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap()
    }

    #[test]
    fn single_node_commits_argmin_local() {
        let img = ImageFloat::from_fn(12, 12, |x, y| {
            Pixel::new(x as f32 / 12.0, y as f32 / 12.0, ((x * y) % 5) as f32 / 5.0)
        })
        .unwrap();
        let mask = one_pixel_hole(12, 6, 6);

        let settings = Settings {
            patch_width: 3,
            patch_height: 3,
            lattice_gap_x: 3,
            lattice_gap_y: 3,
            pyramid_levels: 1,
            max_labels_per_node: 1000,
            max_thread_count: 1,
            ..Settings::default()
        };

        let completion = complete(&img, &mask, &settings).unwrap();
        assert_eq!(completion.layout.len(), 1);

        let placed = completion.layout.patches()[0];
        assert_eq!((placed.x, placed.y), (6, 6));

        let patch = Dims::square(3);
        let labels = LabelSet::enumerate(&mask, patch).unwrap();
        let energy = EnergyCalculator::new(&img, &mask, patch, Dims::square(3), 1);
        let local = energy.local_energies(6, 6, labels.as_slice()).unwrap();

        let mut best = 0;
        for (i, e) in local.iter().enumerate() {
            if *e < local[best] {
                best = i;
            }
        }
        assert_eq!(placed.label, labels.as_slice()[best]);
    }

    #[test]
    fn seeds_from_covering_coarse_nodes() {
        let mask = Mask::filled(32, 32, MaskValue::Known).unwrap();
        let img = ImageFloat::filled(32, 32, Pixel::gray(0.5)).unwrap();
        let patch = Dims::square(3);
        let energy = EnergyCalculator::new(&img, &mask, patch, Dims::square(2), 1);

        let hole = Mask::from_fn(32, 32, |x, y| {
            if x == 10 && y == 10 {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap();
        let mut nodes = NodeSet::build(&hole, patch, Dims::square(2)).unwrap();

        // a coarse node at 5,5 (10,10 at this scale) copying from 4 pixels
        // to its right, and one far away that covers nothing
        let seeds = [
            Seed {
                x: 10,
                y: 10,
                dx: 8,
                dy: 0,
            },
            Seed {
                x: 28,
                y: 28,
                dx: -20,
                dy: -20,
            },
        ];

        let mut full = None;
        assign_candidates(&mut nodes, &energy, &mask, patch, &seeds, 0, &mut full).unwrap();
        assert!(full.is_none());

        for node in nodes.nodes() {
            let (x, y) = node.position();
            assert_eq!(node.labels(), &[Label::new(x + 8, y)]);
        }
    }

    #[test]
    fn unrefinable_seeds_fall_back_to_full_labels() {
        let img =
            ImageFloat::from_fn(16, 16, |x, y| Pixel::gray((x + y) as f32 / 32.0)).unwrap();
        let hole = one_pixel_hole(16, 8, 8);
        let patch = Dims::square(3);
        let energy = EnergyCalculator::new(&img, &hole, patch, Dims::square(2), 1);

        let mut nodes = NodeSet::build(&hole, patch, Dims::square(2)).unwrap();
        assert_eq!(nodes.len(), 1);

        // copies the node onto itself, and the hole is never a valid source
        let seeds = [Seed {
            x: 8,
            y: 8,
            dx: 0,
            dy: 0,
        }];

        let mut full = None;
        assign_candidates(&mut nodes, &energy, &hole, patch, &seeds, 0, &mut full).unwrap();

        let expected = LabelSet::enumerate(&hole, patch).unwrap();
        let full = full.expect("the full label set is built on demand");
        assert_eq!(full.as_slice(), expected.as_slice());
        assert_eq!(nodes.node(0).labels(), expected.as_slice());
    }

    fn solve_square_hole(confidence_threshold: Option<f32>) -> (NodeSet, usize) {
        let img = ImageFloat::from_fn(16, 16, |x, y| {
            Pixel::new(x as f32 / 16.0, y as f32 / 16.0, ((x ^ y) % 3) as f32 / 3.0)
        })
        .unwrap();
        let hole = Mask::from_fn(16, 16, |x, y| {
            if (6..10).contains(&x) && (6..10).contains(&y) {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap();

        let patch = Dims::square(3);
        let gap = Dims::square(2);
        let energy = EnergyCalculator::new(&img, &hole, patch, gap, 1);

        let mut nodes = NodeSet::build(&hole, patch, gap).unwrap();
        let mut full = None;
        assign_candidates(&mut nodes, &energy, &hole, patch, &[], 0, &mut full).unwrap();

        let settings = Settings {
            max_thread_count: 1,
            // never reached, only the threshold can trigger a pass
            pass_interval: 1000,
            confidence_threshold,
            ..Settings::default()
        };

        let passes = LevelSolver {
            settings: &settings,
            energy: &energy,
            nodes: &mut nodes,
        }
        .run(&mut None, ProgressStat { current: 0, total: 1 }, None)
        .unwrap();

        (nodes, passes)
    }

    #[test]
    fn confidence_threshold_refreshes_before_commit() {
        let (plain, plain_passes) = solve_square_hole(None);
        assert!(plain.all_committed());
        assert_eq!(plain_passes, 0);

        // priorities are at most 0, so each commit waits for exactly one pass
        let (nodes, passes) = solve_square_hole(Some(1.0));
        assert!(nodes.len() > 1);
        assert!(nodes.all_committed());
        assert_eq!(nodes.commit_order().len(), nodes.len());
        assert_eq!(passes, nodes.len());

        let (nodes, passes) = solve_square_hole(Some(0.0));
        assert!(nodes.all_committed());
        assert!(passes <= nodes.len());
    }

    #[test]
    fn cancelled_before_first_commit() {
        let img = ImageFloat::filled(32, 32, Pixel::gray(0.5)).unwrap();
        let mask = one_pixel_hole(32, 16, 16);

        let cancel = CancelToken::new();
        let remote = cancel.clone();
        remote.cancel();
        assert!(cancel.is_cancelled());

        let res = complete_with(&img, &mask, &Settings::default(), None, Some(&cancel));
        assert!(matches!(res, Err(Error::Cancelled)));
    }
}

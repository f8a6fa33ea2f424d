use crate::{
    energy::EnergyCalculator,
    label::Label,
    mask::{Mask, MaskValue},
    node::{NeighborEdge, Node, NodeId, NodeState, Priority, Seed},
    Dims, Error,
};

/// The regular grid of candidate node positions covering the image, from one
/// gap before its origin to one gap past its far edge
struct Lattice {
    cols: i32,
    rows: i32,
    origin: (i32, i32),
    gap: (i32, i32),
    // the node created for each lattice point, row-major
    points: Vec<Option<NodeId>>,
}

impl Lattice {
    fn new(dims: Dims, gap: Dims) -> Self {
        let (gx, gy) = (gap.width as i32, gap.height as i32);
        let space_width = dims.width as i32 + 2 * gx;
        let space_height = dims.height as i32 + 2 * gy;

        Self {
            cols: space_width / gx,
            rows: space_height / gy,
            origin: (-gx, -gy),
            gap: (gx, gy),
            points: Vec::new(),
        }
    }

    /// Creates a node at every lattice point whose patch touches the hole
    fn create_unknown_region_nodes(
        &mut self,
        mask: &Mask,
        patch: Dims,
    ) -> Result<Vec<Node>, Error> {
        let (hw, hh) = (patch.width as i32 / 2, patch.height as i32 / 2);

        self.points
            .try_reserve_exact(self.cols as usize * self.rows as usize)?;

        let mut nodes = Vec::new();
        for row in 0..self.rows {
            let y = self.origin.1 + row * self.gap.1;
            for col in 0..self.cols {
                let x = self.origin.0 + col * self.gap.0;

                let touches_hole = mask.region_has_any(
                    x - hw,
                    y - hh,
                    patch.width,
                    patch.height,
                    MaskValue::Unknown,
                );

                if touches_hole {
                    self.points.push(Some(nodes.len()));
                    nodes.push(Node::new(x, y));
                } else {
                    self.points.push(None);
                }
            }
        }

        Ok(nodes)
    }

    fn node_at(&self, col: i32, row: i32) -> Option<NodeId> {
        if col < 0 || row < 0 || col >= self.cols || row >= self.rows {
            return None;
        }

        self.points[(row * self.cols + col) as usize]
    }

    fn connect_neighboring_nodes(&self, nodes: &mut [Node]) {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let id = match self.node_at(col, row) {
                    Some(id) => id,
                    None => continue,
                };

                for edge in NeighborEdge::ALL.iter() {
                    let (dx, dy) = edge.direction();
                    if let Some(neighbor) = self.node_at(col + dx, row + dy) {
                        nodes[id].add_neighbor(neighbor, *edge);
                    }
                }
            }
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct NodeInfo {
    priority: Priority,
    committed: bool,
}

/// Owns every node of a pyramid level, along with the scheduling metadata
/// the solver sorts and scans
pub(crate) struct NodeSet {
    nodes: Vec<Node>,
    info: Vec<NodeInfo>,
    commit_order: Vec<NodeId>,
}

impl NodeSet {
    /// Places the nodes over the unknown region of `mask` and links each of
    /// them to its lattice neighbors
    pub(crate) fn build(mask: &Mask, patch: Dims, gap: Dims) -> Result<Self, Error> {
        let mut lattice = Lattice::new(mask.dims(), gap);
        let mut nodes = lattice.create_unknown_region_nodes(mask, patch)?;
        lattice.connect_neighboring_nodes(&mut nodes);

        let info = vec![
            NodeInfo {
                priority: Priority(0.0),
                committed: false,
            };
            nodes.len()
        ];

        log::debug!(
            "lattice of {}x{} points, {} nodes over the unknown region",
            lattice.cols,
            lattice.rows,
            nodes.len()
        );

        Ok(Self {
            nodes,
            commit_order: Vec::with_capacity(info.len()),
            info,
        })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub(crate) fn priority(&self, id: NodeId) -> Priority {
        self.info[id].priority
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn is_committed(&self, id: NodeId) -> bool {
        self.info[id].committed
    }

    pub(crate) fn update_priority(&mut self, id: NodeId) {
        self.info[id].priority = self.nodes[id].priority();
    }

    pub(crate) fn update_uncommitted_priorities(&mut self) {
        for id in 0..self.nodes.len() {
            if !self.info[id].committed {
                self.update_priority(id);
            }
        }
    }

    /// The uncommitted node with the highest priority, the lowest index on
    /// ties
    pub(crate) fn highest_priority_uncommitted(&self) -> Option<NodeId> {
        let mut best: Option<NodeId> = None;
        for (id, info) in self.info.iter().enumerate() {
            if info.committed {
                continue;
            }

            match best {
                Some(b) if self.info[b].priority.0 >= info.priority.0 => {}
                _ => best = Some(id),
            }
        }
        best
    }

    /// Every uncommitted node, highest priority first, lowest index on ties
    pub(crate) fn uncommitted_by_priority(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = (0..self.nodes.len())
            .filter(|id| !self.info[*id].committed)
            .collect();

        ids.sort_by(|a, b| {
            self.info[*b]
                .priority
                .0
                .total_cmp(&self.info[*a].priority.0)
                .then(a.cmp(b))
        });
        ids
    }

    /// Commits the node to its lowest-belief candidate
    pub(crate) fn commit(&mut self, id: NodeId) -> Label {
        debug_assert_ne!(self.nodes[id].state(), NodeState::Committed);
        let best = self.nodes[id].best_index();
        let label = self.nodes[id].commit(best);

        self.info[id] = NodeInfo {
            priority: self.nodes[id].priority(),
            committed: true,
        };
        self.commit_order.push(id);
        label
    }

    /// The nodes in the order they were committed in
    pub(crate) fn commit_order(&self) -> &[NodeId] {
        &self.commit_order
    }

    #[inline]
    pub(crate) fn all_committed(&self) -> bool {
        self.commit_order.len() == self.nodes.len()
    }

    /// Sends the message from `from` to its neighbor along `edge`, if that
    /// neighbor exists and is still undecided. Returns the receiver.
    pub(crate) fn send_message(
        &mut self,
        from: NodeId,
        edge: NeighborEdge,
        energy: &EnergyCalculator<'_>,
    ) -> Result<Option<NodeId>, Error> {
        let to = match self.nodes[from].neighbor(edge) {
            Some(to) if !self.info[to].committed => to,
            _ => return Ok(None),
        };

        let sender = &self.nodes[from];
        let receiver = &self.nodes[to];
        if receiver.labels().is_empty() {
            return Ok(None);
        }

        let msg = energy.message(
            sender.labels(),
            &sender.outgoing_costs(edge),
            receiver.labels(),
            edge,
        )?;

        self.nodes[to].receive_message(edge.opposite(), msg);
        Ok(Some(to))
    }

    /// The refinement seeds of every committed node, for the next finer
    /// level
    pub(crate) fn scale_up(&self) -> Vec<Seed> {
        self.commit_order
            .iter()
            .filter_map(|id| self.nodes[*id].scale_up())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hole(size: u32, from: u32, to: u32) -> Mask {
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
    fn nodes_cover_the_hole() {
        let mask = hole(20, 5, 15);
        let set = NodeSet::build(&mask, Dims::square(5), Dims::square(5)).unwrap();

        // lattice points at -5, 0, .., 20 on each axis, and only 5, 10 and 15
        // have patches reaching into the 5..15 hole
        assert_eq!(set.len(), 9);
        let positions: Vec<_> = set.nodes().iter().map(|n| n.position()).collect();
        assert_eq!(positions[0], (5, 5));
        assert_eq!(positions[4], (10, 10));
        assert_eq!(positions[8], (15, 15));

        let center = set.node(4);
        assert_eq!(center.neighbor(NeighborEdge::Left), Some(3));
        assert_eq!(center.neighbor(NeighborEdge::Top), Some(1));
        assert_eq!(center.neighbor(NeighborEdge::Right), Some(5));
        assert_eq!(center.neighbor(NeighborEdge::Bottom), Some(7));

        let corner = set.node(0);
        assert_eq!(corner.neighbor(NeighborEdge::Left), None);
        assert_eq!(corner.neighbor(NeighborEdge::Top), None);
    }

    #[test]
    fn neighbor_links_are_mutual() {
        let mask = hole(31, 4, 23);
        let set = NodeSet::build(&mask, Dims::new(7, 5), Dims::new(3, 2)).unwrap();
        assert!(!set.is_empty());

        for (id, node) in set.nodes().iter().enumerate() {
            for edge in NeighborEdge::ALL.iter() {
                if let Some(other) = node.neighbor(*edge) {
                    assert_ne!(other, id);
                    assert_eq!(set.node(other).neighbor(edge.opposite()), Some(id));

                    let (x, y) = node.position();
                    let (dx, dy) = edge.direction();
                    assert_eq!(set.node(other).position(), (x + dx * 3, y + dy * 2));
                }
            }
        }
    }

    #[test]
    fn nodes_may_sit_outside_the_image() {
        // a hole in the top left corner needs the lattice points at -gap
        let mask = Mask::from_fn(12, 12, |x, y| {
            if x == 0 && y == 0 {
                MaskValue::Unknown
            } else {
                MaskValue::Known
            }
        })
        .unwrap();

        let set = NodeSet::build(&mask, Dims::square(5), Dims::square(2)).unwrap();
        assert!(set.nodes().iter().any(|n| n.position() == (-2, -2)));
        assert!(set
            .nodes()
            .iter()
            .all(|n| n.position().0 <= 2 && n.position().1 <= 2));
    }

    #[test]
    fn selection_order() {
        let mask = hole(20, 5, 15);
        let mut set = NodeSet::build(&mask, Dims::square(5), Dims::square(5)).unwrap();

        // every node starts equal, so ties resolve to the lowest index
        assert_eq!(set.highest_priority_uncommitted(), Some(0));

        set.info[3].priority = Priority(-0.5);
        set.info[6].priority = Priority(-0.5);
        for id in [0, 1, 2, 4, 5, 7, 8].iter() {
            set.info[*id].priority = Priority(-1.0);
        }
        assert_eq!(set.highest_priority_uncommitted(), Some(3));
        assert_eq!(&set.uncommitted_by_priority()[..3], &[3, 6, 0]);

        for id in 0..set.len() {
            let label = Label::new(2, 2);
            set.node_mut(id).set_candidates(vec![label], vec![0.0]);
        }

        set.commit(3);
        assert!(set.is_committed(3));
        assert_eq!(set.highest_priority_uncommitted(), Some(6));
        assert_eq!(set.commit_order(), &[3]);
        assert_eq!(set.scale_up().len(), 1);
        assert!(!set.all_committed());
    }
}

use crate::label::Label;

/// The direction from a node to one of its 4 lattice neighbors
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NeighborEdge {
    Left,
    Top,
    Right,
    Bottom,
}

impl NeighborEdge {
    pub const ALL: [NeighborEdge; 4] = [
        NeighborEdge::Left,
        NeighborEdge::Top,
        NeighborEdge::Right,
        NeighborEdge::Bottom,
    ];

    /// The unit lattice step taken along this edge
    #[inline]
    pub fn direction(self) -> (i32, i32) {
        match self {
            Self::Left => (-1, 0),
            Self::Top => (0, -1),
            Self::Right => (1, 0),
            Self::Bottom => (0, 1),
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Top => Self::Bottom,
            Self::Right => Self::Left,
            Self::Bottom => Self::Top,
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Top => 1,
            Self::Right => 2,
            Self::Bottom => 3,
        }
    }
}

/// Temperature of the softmax turning beliefs into the distribution whose
/// entropy is a node's priority. Beliefs are mean squared differences of
/// colors in `[0, 1]`, so this is a fairly small fraction of that range.
pub(crate) const BELIEF_TEMPERATURE: f64 = 0.02;

/// Higher means more confident. Always `<= 0`, as it's a negated entropy.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Priority(pub f32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// No message received yet
    Fresh,
    /// Has received at least one message
    Active,
    /// Reduced to its final label
    Committed,
}

pub(crate) type NodeId = usize;

/// What a committed node hands down to the next finer level: its position
/// and the displacement to its source patch, both at the finer scale
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Seed {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) dx: i32,
    pub(crate) dy: i32,
}

/// A single site of the MRF, ie a patch sized window of the output whose
/// content is picked among a list of candidate source patches.
///
/// All per-candidate vectors (`local`, `beliefs` and every received message)
/// are parallel to `labels` and are compacted together on pruning.
#[derive(Debug)]
pub(crate) struct Node {
    x: i32,
    y: i32,
    labels: Vec<Label>,
    local: Vec<f32>,
    beliefs: Vec<f32>,
    // empty until a message arrives over that edge
    incoming: [Vec<f32>; 4],
    neighbors: [Option<NodeId>; 4],
    state: NodeState,
}

impl Node {
    pub(crate) fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            labels: Vec::new(),
            local: Vec::new(),
            beliefs: Vec::new(),
            incoming: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            neighbors: [None; 4],
            state: NodeState::Fresh,
        }
    }

    #[inline]
    pub(crate) fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    #[inline]
    pub(crate) fn state(&self) -> NodeState {
        self.state
    }

    #[inline]
    pub(crate) fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[inline]
    #[cfg(test)]
    pub(crate) fn beliefs(&self) -> &[f32] {
        &self.beliefs
    }

    /// Replaces the candidates, forgetting every message received so far
    pub(crate) fn set_candidates(&mut self, labels: Vec<Label>, local: Vec<f32>) {
        debug_assert_eq!(labels.len(), local.len());
        debug_assert_ne!(self.state, NodeState::Committed);

        self.beliefs.clear();
        self.beliefs.extend_from_slice(&local);
        self.labels = labels;
        self.local = local;
        for msg in &mut self.incoming {
            msg.clear();
        }
        self.state = NodeState::Fresh;
    }

    pub(crate) fn add_neighbor(&mut self, other: NodeId, edge: NeighborEdge) {
        debug_assert!(self.neighbors[edge.index()].is_none());
        self.neighbors[edge.index()] = Some(other);
    }

    #[inline]
    pub(crate) fn neighbor(&self, edge: NeighborEdge) -> Option<NodeId> {
        self.neighbors[edge.index()]
    }

    /// The sender side of a message along `edge`: for each candidate, its
    /// belief minus what the receiver on that edge told us
    pub(crate) fn outgoing_costs(&self, edge: NeighborEdge) -> Vec<f32> {
        let mut costs = self.local.clone();
        for other in NeighborEdge::ALL.iter().filter(|e| **e != edge) {
            let msg = &self.incoming[other.index()];
            if !msg.is_empty() {
                for (c, m) in costs.iter_mut().zip(msg.iter()) {
                    *c += m;
                }
            }
        }
        costs
    }

    /// Stores the message received over `edge`, replacing the previous one
    pub(crate) fn receive_message(&mut self, edge: NeighborEdge, msg: Vec<f32>) {
        debug_assert_eq!(msg.len(), self.labels.len());
        debug_assert_ne!(self.state, NodeState::Committed);

        self.incoming[edge.index()] = msg;
        self.update_beliefs();

        if self.state == NodeState::Fresh {
            self.state = NodeState::Active;
        }
    }

    fn update_beliefs(&mut self) {
        self.beliefs.clear();
        self.beliefs.extend_from_slice(&self.local);
        for msg in self.incoming.iter().filter(|m| !m.is_empty()) {
            for (b, m) in self.beliefs.iter_mut().zip(msg.iter()) {
                *b += m;
            }
        }
    }

    /// The negated entropy of the softmax of the beliefs. A single candidate
    /// has the maximum priority of 0.
    pub(crate) fn priority(&self) -> Priority {
        let min = self.beliefs.iter().copied().fold(std::f32::INFINITY, f32::min);
        if self.beliefs.len() < 2 || !min.is_finite() {
            return Priority(0.0);
        }

        // H = ln Z + sum(p * e) for p = exp(-e) / Z
        let mut z = 0.0f64;
        let mut weighted = 0.0f64;
        for b in &self.beliefs {
            let e = f64::from(b - min) / BELIEF_TEMPERATURE;
            let w = (-e).exp();
            z += w;
            weighted += w * e;
        }

        let entropy = z.ln() + weighted / z;
        Priority(-entropy.max(0.0) as f32)
    }

    /// The candidate with the lowest belief, the first one on ties
    pub(crate) fn best_index(&self) -> usize {
        let mut best = 0;
        for (i, b) in self.beliefs.iter().enumerate().skip(1) {
            if *b < self.beliefs[best] {
                best = i;
            }
        }
        best
    }

    /// Keeps the `keep` candidates with the lowest beliefs, in their
    /// original relative order. Returns the number of candidates removed.
    pub(crate) fn prune(&mut self, keep: usize) -> usize {
        let count = self.labels.len();
        if count <= keep {
            return 0;
        }

        let mut kept: Vec<usize> = (0..count).collect();
        kept.sort_by(|a, b| {
            self.beliefs[*a]
                .total_cmp(&self.beliefs[*b])
                .then(a.cmp(b))
        });
        kept.truncate(keep);
        kept.sort_unstable();

        self.retain(&kept);
        count - keep
    }

    fn retain(&mut self, kept: &[usize]) {
        fn compact<T: Copy>(v: &mut Vec<T>, kept: &[usize]) {
            for (dst, src) in kept.iter().enumerate() {
                v[dst] = v[*src];
            }
            v.truncate(kept.len());
        }

        compact(&mut self.labels, kept);
        compact(&mut self.local, kept);
        compact(&mut self.beliefs, kept);
        for msg in self.incoming.iter_mut().filter(|m| !m.is_empty()) {
            compact(msg, kept);
        }
    }

    /// Fixes the node to the candidate at `index`
    pub(crate) fn commit(&mut self, index: usize) -> Label {
        debug_assert!(index < self.labels.len());
        debug_assert_ne!(self.state, NodeState::Committed);

        self.retain(&[index]);
        self.state = NodeState::Committed;
        self.labels[0]
    }

    #[inline]
    pub(crate) fn committed_label(&self) -> Option<Label> {
        match self.state {
            NodeState::Committed => Some(self.labels[0]),
            _ => None,
        }
    }

    /// The seed this node provides to the next finer level, if committed
    pub(crate) fn scale_up(&self) -> Option<Seed> {
        self.committed_label().map(|label| Seed {
            x: self.x * 2,
            y: self.y * 2,
            dx: (label.x - self.x) * 2,
            dy: (label.y - self.y) * 2,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn node_with(local: &[f32]) -> Node {
        let mut node = Node::new(4, 4);
        let labels = (0..local.len() as i32).map(|i| Label::new(10 + i, 3)).collect();
        node.set_candidates(labels, local.to_vec());
        node
    }

    #[test]
    fn edges() {
        for edge in NeighborEdge::ALL.iter() {
            let (dx, dy) = edge.direction();
            let (ox, oy) = edge.opposite().direction();
            assert_eq!((dx + ox, dy + oy), (0, 0));
            assert_eq!(edge.opposite().opposite(), *edge);
        }
    }

    #[test]
    fn prune_keeps_lowest_in_order() {
        let mut node = node_with(&[0.5, 0.1, 0.3, 0.1, 0.9]);

        assert_eq!(node.prune(3), 2);
        assert_eq!(
            node.labels(),
            &[Label::new(11, 3), Label::new(12, 3), Label::new(13, 3)]
        );
        assert_eq!(node.beliefs(), &[0.1, 0.3, 0.1]);

        // ties go to the lower index
        assert_eq!(node.prune(1), 2);
        assert_eq!(node.labels(), &[Label::new(11, 3)]);

        assert_eq!(node.prune(5), 0);
    }

    #[test]
    fn messages_add_to_beliefs() {
        let mut node = node_with(&[0.5, 0.1, 0.3]);
        assert_eq!(node.state(), NodeState::Fresh);

        node.receive_message(NeighborEdge::Left, vec![0.0, 1.0, 0.0]);
        node.receive_message(NeighborEdge::Top, vec![0.25, 0.0, 0.0]);
        assert_eq!(node.state(), NodeState::Active);
        assert_eq!(node.beliefs(), &[0.75, 1.1, 0.3]);
        assert_eq!(node.best_index(), 2);

        // a newer message over the same edge replaces the old one
        node.receive_message(NeighborEdge::Left, vec![0.0, 0.0, 0.5]);
        assert_eq!(node.beliefs(), &[0.75, 0.1, 0.8]);

        // what goes back to the left excludes what came from the left
        assert_eq!(node.outgoing_costs(NeighborEdge::Left), vec![0.75, 0.1, 0.3]);
    }

    #[test]
    fn priority_grows_with_confidence() {
        let uniform = node_with(&[0.2; 4]);
        let p = uniform.priority().0;
        assert!((p + (4.0f32).ln()).abs() < 1e-5);

        let peaked = node_with(&[0.2, 0.9, 0.9, 0.9]);
        assert!(peaked.priority() > uniform.priority());

        let single = node_with(&[0.7]);
        assert_eq!(single.priority(), Priority(0.0));
    }

    #[test]
    fn commit_and_seed() {
        let mut node = node_with(&[0.5, 0.1, 0.3]);
        node.receive_message(NeighborEdge::Right, vec![0.0, 0.4, 0.0]);

        let best = node.best_index();
        assert_eq!(best, 2);

        let label = node.commit(best);
        assert_eq!(label, Label::new(12, 3));
        assert_eq!(node.labels(), &[label]);
        assert_eq!(node.committed_label(), Some(label));
        assert_eq!(node.priority(), Priority(0.0));

        assert_eq!(
            node.scale_up(),
            Some(Seed {
                x: 8,
                y: 8,
                dx: 16,
                dy: -2,
            })
        );
    }
}

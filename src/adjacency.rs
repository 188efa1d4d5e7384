use crate::{BoardState, Color, Tile};
use std::collections::HashMap;

/// Connection label for an edge that is part of a run.
/// Labels 1-13 mean "part of a group of that number".
pub const RUN_LABEL: u8 = 14;

/// Set of connection labels (1-14) packed into a u16.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Labels(u16);

impl Labels {
    pub const EMPTY: Labels = Labels(0);
    const ALL_BITS: u16 = 0b0111_1111_1111_1110;

    /// Every label, as seen between two jokers
    pub fn all() -> Self {
        Labels(Self::ALL_BITS)
    }

    pub fn single(label: u8) -> Self {
        Self::EMPTY.with(label)
    }

    pub fn with(self, label: u8) -> Self {
        debug_assert!((1..=RUN_LABEL).contains(&label), "label out of range: {}", label);
        Labels(self.0 | (1 << label))
    }

    pub fn contains(self, label: u8) -> bool {
        label <= RUN_LABEL && self.0 & (1 << label) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn intersect(self, other: Labels) -> Self {
        Labels(self.0 & other.0)
    }

    /// Keep only the labels accepted by `keep`
    pub fn filter(self, keep: impl Fn(u8) -> bool) -> Self {
        self.iter()
            .filter(|&label| keep(label))
            .fold(Self::EMPTY, Labels::with)
    }

    pub fn iter(self) -> impl Iterator<Item = u8> {
        (1..=RUN_LABEL).filter(move |&label| self.contains(label))
    }
}

/// A tile together with its position in the combined table-then-rack
/// ordering. Duplicate tiles compare equal as `Tile`s but never as `TileRef`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileRef {
    pub index: usize,
    pub tile: Tile,
}

impl TileRef {
    pub fn new(index: usize, tile: Tile) -> Self {
        TileRef { index, tile }
    }
}

/// `target` may directly follow `source` in some sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub source: TileRef,
    pub target: TileRef,
}

fn face(tile: Tile) -> Option<(Color, u8)> {
    Some((tile.color()?, tile.number()?))
}

/// Labels under which `t2` may directly follow `t1`.
///
/// Concrete group edges only go up in canonical color order so each group
/// has exactly one ordering.
pub fn edge_labels(t1: TileRef, t2: TileRef) -> Labels {
    if t1.index == t2.index {
        return Labels::EMPTY;
    }

    match (face(t1.tile), face(t2.tile)) {
        (None, None) => Labels::all(),
        (Some((_, n)), None) | (None, Some((_, n))) => Labels::single(n).with(RUN_LABEL),
        (Some((c1, n1)), Some((c2, n2))) => {
            let mut labels = Labels::EMPTY;
            if c1 == c2 && n1 + 1 == n2 {
                labels = labels.with(RUN_LABEL);
            }
            if n1 == n2 && c1 < c2 {
                labels = labels.with(n1);
            }
            labels
        }
    }
}

/// Labels under which `left -> mid -> right` is a coherent stretch of a
/// single sequence.
pub fn sequence_triple_labels(left: TileRef, mid: TileRef, right: TileRef) -> Labels {
    if left.index == right.index {
        return Labels::EMPTY;
    }

    let labels = edge_labels(left, mid).intersect(edge_labels(mid, right));
    match (face(left.tile), face(right.tile)) {
        (Some((lc, ln)), Some((rc, rn))) => labels.filter(|label| {
            if label == RUN_LABEL {
                lc == rc && ln + 2 == rn
            } else {
                // the middle tile needs a color strictly between both ends
                ln == rn && rc.rank() >= lc.rank() + 2
            }
        }),
        _ => labels,
    }
}

/// Labels under which `tile` can open a sequence continued by `right`.
pub fn sequence_start_labels(tile: TileRef, right: TileRef) -> Labels {
    let labels = edge_labels(tile, right);
    match (tile.tile.is_joker(), face(right.tile)) {
        (true, Some((rc, rn))) => labels.filter(|label| {
            if label == RUN_LABEL {
                rn > 1
            } else {
                rc.rank() > 0
            }
        }),
        _ => labels,
    }
}

/// Labels under which `tile` can close a sequence that reached it from `left`.
pub fn sequence_end_labels(left: TileRef, tile: TileRef) -> Labels {
    let labels = edge_labels(left, tile);
    match (face(left.tile), tile.tile.is_joker()) {
        (Some((lc, ln)), true) => labels.filter(|label| {
            if label == RUN_LABEL {
                ln < 13
            } else {
                lc.rank() < Color::Black.rank()
            }
        }),
        _ => labels,
    }
}

/// Whether `tiles`, laid out in this order and connected under `label`, can
/// be read as one legal sequence once every joker takes a face.
///
/// The pairwise and triple labels only look at neighbours; this checks the
/// whole stretch, which matters when jokers sit next to each other.
pub fn sequence_is_coherent(tiles: &[Tile], label: u8) -> bool {
    if tiles.len() < 3 {
        return false;
    }
    let last = tiles.len() - 1;
    let faces: Vec<(usize, Color, u8)> = tiles
        .iter()
        .enumerate()
        .filter_map(|(pos, &tile)| face(tile).map(|(color, number)| (pos, color, number)))
        .collect();

    if label == RUN_LABEL {
        let Some(&(pos, color, number)) = faces.first() else {
            return tiles.len() <= 13;
        };
        // number of the first tile, jokers included
        let start = i32::from(number) - pos as i32;
        start >= 1
            && start + last as i32 <= 13
            && faces
                .iter()
                .all(|&(p, c, n)| c == color && i32::from(n) - p as i32 == start)
    } else {
        let black = Color::Black.rank() as usize;
        tiles.len() <= Color::ALL.len()
            && faces.iter().all(|&(pos, color, number)| {
                let rank = color.rank() as usize;
                number == label && rank >= pos && black - rank >= last - pos
            })
            && faces
                .windows(2)
                .all(|w| w[1].1.rank() as usize >= w[0].1.rank() as usize + (w[1].0 - w[0].0))
    }
}

/// Every edge that could appear in a valid layout of a board state.
#[derive(Debug, Clone)]
pub struct Adjacency {
    tiles: Vec<TileRef>,
    edges: Vec<Edge>,
    labels: Vec<Labels>,
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
    slots: HashMap<usize, usize>,
    table_len: usize,
}

impl Adjacency {
    /// Enumerate the modeled tiles and all their candidate edges.
    ///
    /// On a first turn only the rack is modeled.
    pub fn from_state(state: &BoardState) -> Self {
        let table_len = state.table.len();
        let tiles: Vec<TileRef> = state
            .table
            .iter()
            .chain(state.rack.iter())
            .enumerate()
            .filter(|&(index, _)| !state.first_turn || index >= table_len)
            .map(|(index, &tile)| TileRef::new(index, tile))
            .collect();

        let slots: HashMap<usize, usize> = tiles
            .iter()
            .enumerate()
            .map(|(slot, t)| (t.index, slot))
            .collect();

        let mut edges = Vec::new();
        let mut labels = Vec::new();
        let mut incoming = vec![Vec::new(); tiles.len()];
        let mut outgoing = vec![Vec::new(); tiles.len()];

        for (s, &source) in tiles.iter().enumerate() {
            for (t, &target) in tiles.iter().enumerate() {
                let edge_labels = edge_labels(source, target);
                if edge_labels.is_empty() {
                    continue;
                }
                let id = edges.len();
                edges.push(Edge { source, target });
                labels.push(edge_labels);
                outgoing[s].push(id);
                incoming[t].push(id);
            }
        }

        Adjacency {
            tiles,
            edges,
            labels,
            incoming,
            outgoing,
            slots,
            table_len,
        }
    }

    pub fn tiles(&self) -> &[TileRef] {
        &self.tiles
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn labels(&self, edge: usize) -> Labels {
        self.labels[edge]
    }

    /// Slot of a tile reference in `tiles()`
    pub fn slot(&self, tile: TileRef) -> Option<usize> {
        self.slots.get(&tile.index).copied()
    }

    pub fn incoming(&self, slot: usize) -> &[usize] {
        &self.incoming[slot]
    }

    pub fn outgoing(&self, slot: usize) -> &[usize] {
        &self.outgoing[slot]
    }

    /// Incoming edges followed by outgoing edges
    pub fn incident(&self, slot: usize) -> Vec<usize> {
        self.incoming[slot]
            .iter()
            .chain(self.outgoing[slot].iter())
            .copied()
            .collect()
    }

    /// Edges that continue `edge` into a longer chain: those ending at its
    /// source or starting at its target.
    pub fn continuations(&self, edge: usize) -> Vec<usize> {
        let Edge { source, target } = self.edges[edge];
        let mut result: Vec<usize> = self
            .slot(source)
            .into_iter()
            .flat_map(|slot| self.incoming[slot].iter())
            .chain(
                self.slot(target)
                    .into_iter()
                    .flat_map(|slot| self.outgoing[slot].iter()),
            )
            .copied()
            .filter(|&other| other != edge)
            .collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    pub fn is_rack(&self, tile: TileRef) -> bool {
        tile.index >= self.table_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_tiles;

    fn tref(index: usize, s: &str) -> TileRef {
        TileRef::new(index, Tile::from_string(s).unwrap())
    }

    fn labels(values: &[u8]) -> Labels {
        values.iter().fold(Labels::EMPTY, |acc, &l| acc.with(l))
    }

    #[test]
    fn test_labels_set_operations() {
        let a = labels(&[3, 14]);
        let b = labels(&[3, 5]);
        assert_eq!(a.intersect(b), Labels::single(3));
        assert_eq!(a.len(), 2);
        assert_eq!(Labels::all().len(), 14);
        assert!(!Labels::all().contains(0));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![3, 14]);
        assert_eq!(Labels::all().filter(|l| l > 12), labels(&[13, 14]));
    }

    #[test]
    fn test_edge_labels_concrete() {
        // Run step
        assert_eq!(edge_labels(tref(0, "r4"), tref(1, "r5")), Labels::single(RUN_LABEL));
        // Not ascending
        assert!(edge_labels(tref(0, "r5"), tref(1, "r4")).is_empty());
        // Group step goes up in color order only
        assert_eq!(edge_labels(tref(0, "r4"), tref(1, "b4")), Labels::single(4));
        assert!(edge_labels(tref(0, "b4"), tref(1, "r4")).is_empty());
        // Same color and number never connect
        assert!(edge_labels(tref(0, "r4"), tref(1, "r4")).is_empty());
        // Unrelated
        assert!(edge_labels(tref(0, "r4"), tref(1, "b7")).is_empty());
    }

    #[test]
    fn test_edge_labels_jokers() {
        assert_eq!(edge_labels(tref(0, "?"), tref(1, "?")), Labels::all());
        assert_eq!(edge_labels(tref(0, "r7"), tref(1, "?")), labels(&[7, 14]));
        assert_eq!(edge_labels(tref(0, "?"), tref(1, "z2")), labels(&[2, 14]));
    }

    #[test]
    fn test_edge_labels_same_reference() {
        assert!(edge_labels(tref(3, "?"), tref(3, "?")).is_empty());
        assert!(edge_labels(tref(3, "r1"), tref(3, "r2")).is_empty());
    }

    #[test]
    fn test_triple_labels_concrete() {
        assert_eq!(
            sequence_triple_labels(tref(0, "r1"), tref(1, "r2"), tref(2, "r3")),
            Labels::single(RUN_LABEL)
        );
        assert_eq!(
            sequence_triple_labels(tref(0, "r8"), tref(1, "b8"), tref(2, "z8")),
            Labels::single(8)
        );
        assert!(sequence_triple_labels(tref(0, "r1"), tref(1, "r2"), tref(2, "b2")).is_empty());
    }

    #[test]
    fn test_triple_labels_joker_in_middle() {
        // r5 ? r7: the joker is r6
        assert_eq!(
            sequence_triple_labels(tref(0, "r5"), tref(1, "?"), tref(2, "r7")),
            Labels::single(RUN_LABEL)
        );
        // r5 ? r8 is too wide
        assert!(sequence_triple_labels(tref(0, "r5"), tref(1, "?"), tref(2, "r8")).is_empty());
        // r5 ? z5: the joker is blue or green
        assert_eq!(
            sequence_triple_labels(tref(0, "r5"), tref(1, "?"), tref(2, "z5")),
            Labels::single(5)
        );
        // r5 ? b5 leaves no color for the joker
        assert!(sequence_triple_labels(tref(0, "r5"), tref(1, "?"), tref(2, "b5")).is_empty());
        // r5 ? r5 repeats a color
        assert!(sequence_triple_labels(tref(0, "r5"), tref(1, "?"), tref(2, "r5")).is_empty());
    }

    #[test]
    fn test_triple_labels_with_joker_ends() {
        assert_eq!(
            sequence_triple_labels(tref(0, "?"), tref(1, "r5"), tref(2, "?")),
            labels(&[5, 14])
        );
        assert!(sequence_triple_labels(tref(0, "?"), tref(1, "r5"), tref(0, "?")).is_empty());
    }

    #[test]
    fn test_start_and_end_labels_bound_jokers() {
        // ? r1 cannot be a run, ? r1 can start a group only if a color precedes red
        assert!(sequence_start_labels(tref(0, "?"), tref(1, "r1")).is_empty());
        assert_eq!(sequence_start_labels(tref(0, "?"), tref(1, "b1")), Labels::single(1));
        assert_eq!(sequence_start_labels(tref(0, "?"), tref(1, "b2")), labels(&[2, 14]));

        assert!(sequence_end_labels(tref(0, "z13"), tref(1, "?")).is_empty());
        assert_eq!(sequence_end_labels(tref(0, "g13"), tref(1, "?")), Labels::single(13));
        assert_eq!(sequence_end_labels(tref(0, "r12"), tref(1, "?")), labels(&[12, 14]));

        // Concrete starts are unchanged
        assert_eq!(
            sequence_start_labels(tref(0, "r1"), tref(1, "r2")),
            edge_labels(tref(0, "r1"), tref(1, "r2"))
        );
    }

    #[test]
    fn test_coherence_of_runs_with_adjacent_jokers() {
        let coherent = |s: &str| sequence_is_coherent(&parse_tiles(s).unwrap(), RUN_LABEL);

        assert!(coherent("r1 ? ? r4"));
        assert!(coherent("b3 ? ? ? b7"));
        assert!(coherent("? ? z12 z13"));
        assert!(coherent("? ? ?"));
        // r1 ? ? r5 leaves r4 uncovered
        assert!(!coherent("r1 ? ? r5"));
        assert!(!coherent("r1 ? r5 ?"));
        // Past 13 or below 1
        assert!(!coherent("z12 z13 ? ?"));
        assert!(!coherent("? ? r2"));
        assert!(!coherent("r4 ? ? b7"));
        assert!(!coherent("r4 ?"));
    }

    #[test]
    fn test_coherence_of_groups_with_adjacent_jokers() {
        let coherent = |s: &str, n: u8| sequence_is_coherent(&parse_tiles(s).unwrap(), n);

        assert!(coherent("r7 b7 ? ?", 7));
        assert!(coherent("? ? g5", 5));
        assert!(coherent("? ? ? ?", 9));
        // Five tiles or no color left for the jokers
        assert!(!coherent("r5 b5 g5 ? ?", 5));
        assert!(!coherent("g7 ? ?", 7));
        assert!(!coherent("b5 ? ? z5", 5));
        assert!(!coherent("? ? ? r3", 3));
        // Number must match the label
        assert!(!coherent("r4 b4 ?", 5));
    }

    #[test]
    fn test_adjacency_duplicates_are_distinct() {
        let state = BoardState::new(
            parse_tiles("r1 r2 r3").unwrap(),
            parse_tiles("r2").unwrap(),
            false,
        );
        let adjacency = Adjacency::from_state(&state);

        assert_eq!(adjacency.tiles().len(), 4);
        // r1->r2, r1->r2', r2->r3, r2'->r3
        assert_eq!(adjacency.edges().len(), 4);

        let r2_copy = adjacency.tiles()[3];
        assert!(adjacency.is_rack(r2_copy));
        let slot = adjacency.slot(r2_copy).unwrap();
        assert_eq!(adjacency.incoming(slot).len(), 1);
        assert_eq!(adjacency.outgoing(slot).len(), 1);
        assert_eq!(adjacency.incident(slot).len(), 2);
    }

    #[test]
    fn test_adjacency_first_turn_excludes_table() {
        let state = BoardState::new(
            parse_tiles("r1 r2 r3").unwrap(),
            parse_tiles("r4 r5").unwrap(),
            true,
        );
        let adjacency = Adjacency::from_state(&state);

        let indices: Vec<usize> = adjacency.tiles().iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![3, 4]);
        assert_eq!(adjacency.edges().len(), 1);
        assert!(adjacency.tiles().iter().all(|&t| adjacency.is_rack(t)));
    }

    #[test]
    fn test_continuations() {
        let state = BoardState::new(parse_tiles("r1 r2 r3 r4").unwrap(), vec![], false);
        let adjacency = Adjacency::from_state(&state);
        let find = |a: usize, b: usize| {
            adjacency
                .edges()
                .iter()
                .position(|e| e.source.index == a && e.target.index == b)
                .unwrap()
        };

        let middle = find(1, 2);
        assert_eq!(adjacency.continuations(middle), {
            let mut expected = vec![find(0, 1), find(2, 3)];
            expected.sort();
            expected
        });
        assert_eq!(adjacency.continuations(find(0, 1)), vec![find(1, 2)]);
    }

    #[test]
    fn test_continuations_between_two_jokers() {
        let state = BoardState::new(vec![], parse_tiles("? ?").unwrap(), false);
        let adjacency = Adjacency::from_state(&state);
        assert_eq!(adjacency.edges().len(), 2);
        // Each direction is the other's only continuation, listed once
        assert_eq!(adjacency.continuations(0), vec![1]);
        assert_eq!(adjacency.continuations(1), vec![0]);
    }
}

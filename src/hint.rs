use crate::adjacency::{
    sequence_end_labels, sequence_is_coherent, sequence_start_labels, sequence_triple_labels,
    Adjacency, Edge, TileRef, RUN_LABEL,
};
use crate::engine::SatEngine;
use crate::model::{Assignment, BoolVar, Engine, IntVar, Model, Status, Term};
use crate::{score, BoardState, Hint, Meld, MeldType, Tile};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Minimum score of the first play of a player
pub const OPENING_SCORE: u32 = 30;

/// Points a joker is worth under [`Strategy::MaximizePoints`]
const JOKER_POINTS: u32 = 30;

/// What the hint tries to get rid of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Play as many rack tiles as possible
    #[default]
    MaximizeTiles,
    /// Play as many points as possible (sum of numbers, jokers count 30)
    MaximizePoints,
}

impl Strategy {
    fn weight(&self, tile: Tile) -> u32 {
        match self {
            Self::MaximizeTiles => 1,
            Self::MaximizePoints => {
                if tile.is_joker() {
                    JOKER_POINTS
                } else {
                    tile.face_value()
                }
            }
        }
    }
}

/// How the opening score is enforced on a first turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningRule {
    /// Require the score inside the model, so a qualifying play is found
    /// whenever one exists
    #[default]
    Constrain,
    /// Only reject the best play afterwards if it scores too little
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HintOptions {
    pub strategy: Strategy,
    pub opening_rule: OpeningRule,
    pub opening_score: u32,
    /// Time budget for the optimization loop in milliseconds
    pub max_ms: u64,
}

impl Default for HintOptions {
    fn default() -> Self {
        HintOptions {
            strategy: Strategy::default(),
            opening_rule: OpeningRule::default(),
            opening_score: OPENING_SCORE,
            max_ms: 5_000,
        }
    }
}

/// A hint together with how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintReport {
    pub hint: Hint,
    pub status: Status,
    /// Objective value of the decoded play (tiles or points)
    pub objective: u32,
}

/// A constraint model for one board state, with the variables keyed by what
/// they stand for.
pub struct HintModel {
    pub model: Model,
    pub adjacency: Adjacency,
    edge_vars: HashMap<Edge, IntVar>,
    played_vars: HashMap<TileRef, BoolVar>,
}

/// Build the model whose optimal solutions are the best legal plays.
///
/// - One variable per candidate edge holding its connection label (0 = unused)
/// - Every used edge continues into another one, so sequences have 3+ tiles
/// - Every tile takes one allowed pattern over its incident edges: unused,
///   start, middle or end of a sequence; table tiles cannot be unused
/// - At most two used edges per tile
/// - A rack tile counts as played only when one of its edges is used
pub fn build_model(state: &BoardState, options: &HintOptions) -> HintModel {
    let adjacency = Adjacency::from_state(state);
    let mut model = Model::new();

    let vars: Vec<IntVar> = (0..adjacency.edges().len())
        .map(|edge| {
            let domain: Vec<u8> = std::iter::once(0)
                .chain(adjacency.labels(edge).iter())
                .collect();
            model.new_int_var(&domain)
        })
        .collect();
    let edge_vars: HashMap<Edge, IntVar> = adjacency
        .edges()
        .iter()
        .copied()
        .zip(vars.iter().copied())
        .collect();

    // Minimum sequence length
    for (edge, &var) in vars.iter().enumerate() {
        let supports = adjacency
            .continuations(edge)
            .into_iter()
            .map(|other| Term::NonZero(vars[other]))
            .collect();
        model.add_supported(Term::NonZero(var), supports);
    }

    let mut played_vars = HashMap::new();
    let mut objective = Vec::new();
    let mut opening = Vec::new();

    for (slot, &tile) in adjacency.tiles().iter().enumerate() {
        let incoming = adjacency.incoming(slot);
        let outgoing = adjacency.outgoing(slot);
        let incident: Vec<IntVar> = adjacency
            .incident(slot)
            .into_iter()
            .map(|edge| vars[edge])
            .collect();
        let on_rack = adjacency.is_rack(tile);

        let patterns = tile_patterns(&adjacency, tile, incoming, outgoing, !on_rack);
        model.add_allowed_assignments(incident.clone(), patterns);

        let used: Vec<Term> = incident.iter().map(|&var| Term::NonZero(var)).collect();
        model.add_at_most(used.clone(), 2);

        if on_rack {
            let played = model.new_bool_var();
            model.add_supported(Term::Bool(played), used);
            played_vars.insert(tile, played);
            objective.push((options.strategy.weight(tile.tile), played));
            opening.push((tile.tile.face_value(), Term::Bool(played)));
        }
    }

    if state.first_turn && options.opening_rule == OpeningRule::Constrain {
        model.add_at_least(opening, options.opening_score);
    }
    model.maximize(objective);

    log::debug!(
        "built model: {} tiles, {} edges, {} rack tiles",
        adjacency.tiles().len(),
        adjacency.edges().len(),
        played_vars.len()
    );

    HintModel {
        model,
        adjacency,
        edge_vars,
        played_vars,
    }
}

/// Allowed label vectors over the incident edges of `tile` (incoming edges
/// first, then outgoing).
fn tile_patterns(
    adjacency: &Adjacency,
    tile: TileRef,
    incoming: &[usize],
    outgoing: &[usize],
    retained: bool,
) -> Vec<Vec<u8>> {
    let width = incoming.len() + outgoing.len();
    let edges = adjacency.edges();
    let mut patterns = Vec::new();

    if !retained {
        patterns.push(vec![0; width]);
    }

    // Middle of a sequence
    for (i, &into) in incoming.iter().enumerate() {
        for (j, &out) in outgoing.iter().enumerate() {
            let left = edges[into].source;
            let right = edges[out].target;
            for label in sequence_triple_labels(left, tile, right).iter() {
                let mut row = vec![0; width];
                row[i] = label;
                row[incoming.len() + j] = label;
                patterns.push(row);
            }
        }
    }

    // Start of a sequence
    for (j, &out) in outgoing.iter().enumerate() {
        for label in sequence_start_labels(tile, edges[out].target).iter() {
            let mut row = vec![0; width];
            row[incoming.len() + j] = label;
            patterns.push(row);
        }
    }

    // End of a sequence
    for (i, &into) in incoming.iter().enumerate() {
        for label in sequence_end_labels(edges[into].source, tile).iter() {
            let mut row = vec![0; width];
            row[i] = label;
            patterns.push(row);
        }
    }

    patterns
}

impl HintModel {
    /// Label realized on an edge, 0 if unused
    pub fn edge_value(&self, assignment: &Assignment, edge: &Edge) -> u8 {
        self.edge_vars
            .get(edge)
            .map_or(0, |&var| assignment.value(var))
    }

    pub fn is_played(&self, assignment: &Assignment, tile: TileRef) -> bool {
        self.played_vars
            .get(&tile)
            .is_some_and(|&var| assignment.is_true(var))
    }

    fn used_edges<'a>(&'a self, assignment: &'a Assignment) -> impl Iterator<Item = (Edge, u8)> + 'a {
        self.adjacency
            .edges()
            .iter()
            .map(move |edge| (*edge, self.edge_value(assignment, edge)))
            .filter(|&(_, label)| label != 0)
    }

    /// Rack tiles touching a used edge, sorted
    pub fn playable_tiles(&self, assignment: &Assignment) -> Vec<Tile> {
        let mut touched: Vec<TileRef> = self
            .used_edges(assignment)
            .flat_map(|(edge, _)| [edge.source, edge.target])
            .filter(|&tile| self.adjacency.is_rack(tile))
            .collect();
        touched.sort_by_key(|t| (t.tile, t.index));
        touched.dedup();
        touched.into_iter().map(|t| t.tile).collect()
    }

    /// Stretches of used edges, each walked from its first tile
    fn chains(&self, assignment: &Assignment) -> Vec<Chain> {
        let mut next: HashMap<TileRef, (Edge, u8)> = HashMap::new();
        let mut has_prev: HashSet<TileRef> = HashSet::new();
        for (edge, label) in self.used_edges(assignment) {
            next.insert(edge.source, (edge, label));
            has_prev.insert(edge.target);
        }

        let tiles = self.adjacency.tiles().iter().copied();
        let starts = tiles.clone().filter(|t| next.contains_key(t) && !has_prev.contains(t));
        let rest = tiles.filter(|t| next.contains_key(t));

        let mut visited: HashSet<TileRef> = HashSet::new();
        let mut chains = Vec::new();
        for start in starts.chain(rest) {
            if !visited.insert(start) {
                continue;
            }
            let mut chain = Chain {
                tiles: vec![start],
                edges: Vec::new(),
                label: next[&start].1,
                closed: false,
            };
            let mut tile = start;
            while let Some(&(edge, _)) = next.get(&tile) {
                chain.edges.push(edge);
                tile = edge.target;
                if !visited.insert(tile) {
                    chain.closed = true;
                    break;
                }
                chain.tiles.push(tile);
            }
            chains.push(chain);
        }
        chains
    }

    /// Connected components of the used edges, each as a sorted meld
    pub fn sequences(&self, assignment: &Assignment) -> Vec<Meld> {
        let mut melds: Vec<Meld> = self.chains(assignment).iter().map(Chain::to_meld).collect();
        melds.sort_by(|a, b| a.tiles.cmp(&b.tiles));
        melds
    }

    /// Forbid the exact edge labels of every incoherent chain in the
    /// assignment. Returns how many chains were excluded.
    pub fn exclude_incoherent(&mut self, assignment: &Assignment) -> usize {
        let broken: Vec<Chain> = self
            .chains(assignment)
            .into_iter()
            .filter(|chain| !chain.is_coherent())
            .collect();
        for chain in &broken {
            log::debug!("excluding incoherent chain {}", chain);
            let forbidden = chain
                .edges
                .iter()
                .map(|edge| (self.edge_vars[edge], chain.label))
                .collect();
            self.model.add_forbidden(forbidden);
        }
        broken.len()
    }
}

/// Tiles joined by used edges, in laying order.
#[derive(Debug, Clone)]
struct Chain {
    tiles: Vec<TileRef>,
    edges: Vec<Edge>,
    label: u8,
    /// The walk came back to a tile it had already laid
    closed: bool,
}

impl Chain {
    fn is_coherent(&self) -> bool {
        let tiles: Vec<Tile> = self.tiles.iter().map(|t| t.tile).collect();
        !self.closed && sequence_is_coherent(&tiles, self.label)
    }

    fn to_meld(&self) -> Meld {
        let meld_type = if self.label == RUN_LABEL {
            MeldType::Run
        } else {
            MeldType::Group
        };
        let mut tiles = self.tiles.clone();
        tiles.sort_by_key(|t| (t.tile, t.index));
        Meld::new(meld_type, tiles.into_iter().map(|t| t.tile).collect())
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiles: Vec<String> = self.tiles.iter().map(|t| t.tile.to_string()).collect();
        write!(f, "{}", tiles.join(" "))?;
        if self.closed {
            write!(f, " (loop)")?;
        }
        Ok(())
    }
}

/// Compute a hint with the given options and engine.
pub fn compute_hint(state: &BoardState, options: &HintOptions, engine: &dyn Engine) -> HintReport {
    let mut built = build_model(state, options);
    let mut assignment = engine.solve(&built.model);
    // Adjacent jokers are only checked pairwise by the model; cut away
    // stretches that cannot be laid out and solve again.
    while assignment.status.has_solution() && built.exclude_incoherent(&assignment) > 0 {
        assignment = engine.solve(&built.model);
    }
    let status = assignment.status;
    log::info!("solver status: {:?}, objective {}", status, assignment.objective);

    if !status.has_solution() {
        return HintReport {
            hint: Hint::default(),
            status,
            objective: 0,
        };
    }

    let playable = built.playable_tiles(&assignment);
    if state.first_turn && score(&playable) < options.opening_score {
        log::info!(
            "opening play scores {}, below the required {}",
            score(&playable),
            options.opening_score
        );
        return HintReport {
            hint: Hint::default(),
            status,
            objective: assignment.objective,
        };
    }

    HintReport {
        hint: Hint {
            playable,
            sequences: built.sequences(&assignment),
        },
        status,
        objective: assignment.objective,
    }
}

/// Compute a hint with the SAT engine bounded by `options.max_ms`.
pub fn hint_with_options(state: &BoardState, options: &HintOptions) -> HintReport {
    compute_hint(state, options, &SatEngine::new(options.max_ms))
}

/// Compute a hint with default options.
pub fn get_hint(state: &BoardState) -> Hint {
    hint_with_options(state, &HintOptions::default()).hint
}

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Parent sets of every node in a factored model, without counts
///
/// `transition[a][f]` lists the state features the next value of feature `f`
/// depends on under action `a`; `observation[a][f]` lists the (new) state
/// features observation feature `f` depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Structure {
    pub transition: Vec<Vec<Vec<usize>>>,
    pub observation: Vec<Vec<Vec<usize>>>,
}

impl Structure {
    /// Flips an edge drawn uniformly from `[0, edge_range)` in a sorted parent list
    ///
    /// Returns the flipped edge.
    pub fn flip_random_edge<R: Rng + ?Sized>(
        edges: &mut Vec<usize>,
        edge_range: usize,
        rng: &mut R,
    ) -> usize {
        assert!(edge_range > 0, "cannot flip an edge in an empty range");

        let edge = rng.gen_range(0..edge_range);
        Structure::flip_edge(edges, edge);
        edge
    }

    /// Removes `edge` from the sorted list if present, inserts it in order otherwise
    pub fn flip_edge(edges: &mut Vec<usize>, edge: usize) {
        debug_assert!(edges.windows(2).all(|w| w[0] < w[1]), "parents must be sorted");

        match edges.binary_search(&edge) {
            Ok(position) => {
                edges.remove(position);
            }
            Err(position) => edges.insert(position, edge),
        }
    }

    /// Total number of edges over all nodes
    pub fn num_edges(&self) -> usize {
        self.transition
            .iter()
            .chain(&self.observation)
            .flatten()
            .map(Vec::len)
            .sum()
    }
}

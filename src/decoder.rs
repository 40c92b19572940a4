use ndarray::Array2;

use crate::error::{Error, Result};

/// Decode the maximum-scoring arborescence rooted at position 0.
///
/// `scores[h][m]` is the score of attaching modifier `m` to head `h`. The
/// matrix must be square with side L >= 1 and finite everywhere; the
/// diagonal and the root column are ignored structurally rather than
/// masked. Returns one head index per position; entry 0 is unused and set
/// to 0. Ties resolve to the lowest head index, so equal inputs always
/// decode to equal trees.
///
/// Runs Chu-Liu-Edmonds over a working copy of the scores: greedy
/// per-modifier argmax, cycle detection, contraction of each cycle into its
/// first record with adjusted entering-edge scores, recursive resolution,
/// then expansion restoring all cycle edges except the one displaced by the
/// chosen entering edge. Worst case O(L³).
pub fn maximum_spanning_tree(scores: &Array2<f64>) -> Result<Vec<usize>> {
    let (rows, cols) = scores.dim();
    if rows != cols {
        return Err(Error::invalid_input(format!(
            "score matrix must be square, got {}x{}",
            rows, cols
        )));
    }
    if rows == 0 {
        return Err(Error::invalid_input(
            "score matrix must cover at least the root position",
        ));
    }
    if scores.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid_input(
            "score matrix contains non-finite values",
        ));
    }

    let len = rows;
    let mut arena = Arena::new(scores, len);
    arena.resolve()?;

    let mut heads = vec![0usize; len];
    for (m, head) in heads.iter_mut().enumerate().skip(1) {
        *head = arena.resolved[m]
            .ok_or_else(|| Error::internal(format!("no head assigned to position {}", m)))?;
    }
    Ok(heads)
}

/// Working state of the decoder: node records indexed by original position.
///
/// Contracted cycles collapse into their first member; the other members
/// flip inactive and their merged-group contents move to the survivor.
/// `edge_head`/`edge_mod` track, for every reduced edge (i, j), the original
/// endpoints it stands for, so expansion can emit original positions.
struct Arena {
    len: usize,
    /// Detached working copy; contraction rewrites rows/columns in place.
    scores: Array2<f64>,
    active: Vec<bool>,
    edge_head: Array2<usize>,
    edge_mod: Array2<usize>,
    /// Original positions merged into each record.
    group: Vec<Vec<usize>>,
    /// Final head per original position, filled during expansion.
    resolved: Vec<Option<usize>>,
}

impl Arena {
    fn new(scores: &Array2<f64>, len: usize) -> Self {
        let edge_head = Array2::from_shape_fn((len, len), |(h, _)| h);
        let edge_mod = Array2::from_shape_fn((len, len), |(_, m)| m);
        Self {
            len,
            scores: scores.clone(),
            active: vec![true; len],
            edge_head,
            edge_mod,
            group: (0..len).map(|i| vec![i]).collect(),
            resolved: vec![None; len],
        }
    }

    fn resolve(&mut self) -> Result<()> {
        // Greedy best head per active modifier; the root candidate is tried
        // first and strict comparison keeps the lowest index on ties.
        let mut parent = vec![0usize; self.len];
        for m in 1..self.len {
            if !self.active[m] {
                continue;
            }
            let mut best_score = self.scores[[0, m]];
            for h in 1..self.len {
                if h == m || !self.active[h] {
                    continue;
                }
                if self.scores[[h, m]] > best_score {
                    best_score = self.scores[[h, m]];
                    parent[m] = h;
                }
            }
        }

        let cycle = match self.find_cycle(&parent) {
            Some(cycle) => cycle,
            None => {
                for m in 1..self.len {
                    if !self.active[m] {
                        continue;
                    }
                    let h = parent[m];
                    let original_mod = self.edge_mod[[h, m]];
                    let original_head = self.edge_head[[h, m]];
                    self.resolved[original_mod] = Some(original_head);
                }
                return Ok(());
            }
        };

        // Contraction: fold the cycle into its first record. Entering edges
        // are scored as the full cycle weight minus the one internal edge
        // they displace; leaving edges keep their best internal source.
        let rep = cycle[0];
        let mut in_cycle = vec![false; self.len];
        let mut cycle_weight = 0.0;
        for &v in &cycle {
            in_cycle[v] = true;
            cycle_weight += self.scores[[parent[v], v]];
        }

        for node in 0..self.len {
            if !self.active[node] || in_cycle[node] {
                continue;
            }
            let mut out_score = f64::NEG_INFINITY;
            let mut out_from = rep;
            let mut in_score = f64::NEG_INFINITY;
            let mut in_at = rep;
            for &v in &cycle {
                if self.scores[[v, node]] > out_score {
                    out_score = self.scores[[v, node]];
                    out_from = v;
                }
                let gain = cycle_weight + self.scores[[node, v]] - self.scores[[parent[v], v]];
                if gain > in_score {
                    in_score = gain;
                    in_at = v;
                }
            }
            self.scores[[rep, node]] = out_score;
            self.edge_head[[rep, node]] = self.edge_head[[out_from, node]];
            self.edge_mod[[rep, node]] = self.edge_mod[[out_from, node]];
            self.scores[[node, rep]] = in_score;
            self.edge_head[[node, rep]] = self.edge_head[[node, in_at]];
            self.edge_mod[[node, rep]] = self.edge_mod[[node, in_at]];
        }

        // Snapshot the merged groups before folding; the expansion below
        // needs to know which original positions each cycle record covered
        // at this depth.
        let groups_before: Vec<Vec<usize>> = cycle.iter().map(|&v| self.group[v].clone()).collect();
        for &v in cycle.iter().skip(1) {
            self.active[v] = false;
            let moved = std::mem::take(&mut self.group[v]);
            self.group[rep].extend(moved);
        }

        self.resolve()?;

        // Expansion: the reduced solution attached some original position
        // inside the cycle; the record covering it is the entry point. Keep
        // every cycle edge except the one into the entry point.
        let mut key = None;
        'search: for (i, &v) in cycle.iter().enumerate() {
            for &original in &groups_before[i] {
                if self.resolved[original].is_some() {
                    key = Some(v);
                    break 'search;
                }
            }
        }
        let key = key.ok_or_else(|| Error::internal("cycle expansion found no entry point"))?;

        let mut node = parent[key];
        while node != key {
            let h = parent[node];
            let original_mod = self.edge_mod[[h, node]];
            let original_head = self.edge_head[[h, node]];
            self.resolved[original_mod] = Some(original_head);
            node = parent[node];
        }
        Ok(())
    }

    /// Find one cycle in the greedy parent assignment, if any, listed in
    /// parent order starting from its deepest re-encountered node.
    fn find_cycle(&self, parent: &[usize]) -> Option<Vec<usize>> {
        let mut seen = vec![false; self.len];
        seen[0] = true;
        for start in 1..self.len {
            if seen[start] || !self.active[start] {
                continue;
            }
            let mut on_walk = vec![false; self.len];
            on_walk[start] = true;
            seen[start] = true;
            let mut node = start;
            loop {
                let next = parent[node];
                if on_walk[next] {
                    let mut cycle = vec![next];
                    let mut cur = parent[next];
                    while cur != next {
                        cycle.push(cur);
                        cur = parent[cur];
                    }
                    return Some(cycle);
                }
                // Joining an already-processed region means any cycle there
                // was found from an earlier start.
                if seen[next] {
                    break;
                }
                seen[next] = true;
                on_walk[next] = true;
                node = next;
            }
        }
        None
    }
}

//! Graph primitives used during reconciliation.
//!
//! Graphs are undirected and given as an adjacency mapping `V -> set<V>`
//! with symmetric adjacency. Self-loops are tolerated and ignored. All
//! traversals use explicit work stacks; biological interaction graphs can
//! be deep enough to overflow the call stack otherwise.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Adjacency mapping of an undirected graph.
pub type Neighbors<V> = HashMap<V, HashSet<V>>;

/// Compute the connected components of the graph.
///
/// Returns one vertex set per component; the sets partition the keys of
/// `neighbors`.
pub fn connected_components<V>(neighbors: &Neighbors<V>) -> Vec<HashSet<V>>
where
    V: Copy + Eq + Hash,
{
    let mut found = HashSet::with_capacity(neighbors.len());
    let mut components = Vec::new();
    for &start in neighbors.keys() {
        if !found.insert(start) {
            continue;
        }
        let mut component = HashSet::new();
        let mut stack = vec![start];
        while let Some(v) = stack.pop() {
            component.insert(v);
            if let Some(adjacent) = neighbors.get(&v) {
                for &u in adjacent {
                    if found.insert(u) {
                        stack.push(u);
                    }
                }
            }
        }
        components.push(component);
    }
    components
}

/// Compute all maximal cliques of the graph.
///
/// Bron-Kerbosch with degeneracy ordering at the outer level and pivot
/// selection at inner levels, as described in Eppstein, Loeffler, Strash:
/// "Listing All Maximal Cliques in Sparse Graphs in Near-optimal Time".
pub fn maximal_cliques<V>(neighbors: &Neighbors<V>) -> Vec<HashSet<V>>
where
    V: Copy + Eq + Hash,
{
    let cleaned = without_self_loops(neighbors);
    maximal_cliques_inner(&cleaned)
}

/// Compute an edge-disjoint clique cover of the graph.
///
/// Alternates between pruning (dropping isolated vertices, extracting the
/// pair clique of every degree-one vertex) and greedily accepting maximal
/// cliques whose induced edges are all still uncovered, removing the
/// covered edges, until no edges remain.
pub fn edge_disjoint_cliques<V>(neighbors: &Neighbors<V>) -> Vec<HashSet<V>>
where
    V: Copy + Eq + Hash,
{
    let mut graph = without_self_loops(neighbors);
    let mut cover = Vec::new();

    loop {
        // prune isolated vertices and extract hanging pairs
        let vertices: Vec<V> = graph.keys().copied().collect();
        for v in vertices {
            let Some(adjacent) = graph.get(&v) else {
                continue;
            };
            if adjacent.is_empty() {
                graph.remove(&v);
            } else if adjacent.len() == 1 {
                let u = *adjacent.iter().next().unwrap();
                cover.push(HashSet::from_iter([v, u]));
                graph.remove(&v);
                if let Some(adjacent_u) = graph.get_mut(&u) {
                    adjacent_u.remove(&v);
                    if adjacent_u.is_empty() {
                        graph.remove(&u);
                    }
                }
            }
        }

        if graph.is_empty() {
            return cover;
        }

        // greedily accept maximal cliques whose edges are still uncovered;
        // the largest clique is always intact, so each round makes progress
        let mut cliques = maximal_cliques_inner(&graph);
        cliques.sort_by_key(|clique| std::cmp::Reverse(clique.len()));
        for clique in cliques {
            let intact = clique.iter().all(|v| {
                graph
                    .get(v)
                    .map_or(false, |adjacent| {
                        adjacent.intersection(&clique).count() == clique.len() - 1
                    })
            });
            if intact {
                for v in &clique {
                    if let Some(adjacent) = graph.get_mut(v) {
                        for u in &clique {
                            adjacent.remove(u);
                        }
                    }
                }
                cover.push(clique);
            }
        }
    }
}

/// Clone the adjacency mapping with self-loops removed.
fn without_self_loops<V>(neighbors: &Neighbors<V>) -> Neighbors<V>
where
    V: Copy + Eq + Hash,
{
    neighbors
        .iter()
        .map(|(&v, adjacent)| {
            let mut adjacent = adjacent.clone();
            adjacent.remove(&v);
            (v, adjacent)
        })
        .collect()
}

/// One suspended Bron-Kerbosch recursion level.
struct Frame<V> {
    r: HashSet<V>,
    p: HashSet<V>,
    x: HashSet<V>,
    candidates: Vec<V>,
    next: usize,
}

/// Either record `r` as maximal, discard the branch, or suspend it on the
/// work stack with its pivot-filtered candidate list.
fn descend<V>(
    r: HashSet<V>,
    p: HashSet<V>,
    x: HashSet<V>,
    neighbors: &Neighbors<V>,
    stack: &mut Vec<Frame<V>>,
    cliques: &mut Vec<HashSet<V>>,
) where
    V: Copy + Eq + Hash,
{
    if p.is_empty() {
        if x.is_empty() {
            cliques.push(r);
        }
        return;
    }
    // pivot arbitrarily from x first if non-empty, else from p; candidates
    // are the p-vertices outside the pivot's neighborhood
    let pivot = *x.iter().next().unwrap_or_else(|| p.iter().next().unwrap());
    let candidates: Vec<V> = p.difference(&neighbors[&pivot]).copied().collect();
    stack.push(Frame {
        r,
        p,
        x,
        candidates,
        next: 0,
    });
}

/// Bron-Kerbosch on an adjacency mapping known to be self-loop free.
fn maximal_cliques_inner<V>(neighbors: &Neighbors<V>) -> Vec<HashSet<V>>
where
    V: Copy + Eq + Hash,
{
    let order = degeneracy_order(neighbors);
    let mut p: HashSet<V> = order.iter().copied().collect();
    let mut x: HashSet<V> = HashSet::new();
    let mut cliques = Vec::new();
    let mut stack: Vec<Frame<V>> = Vec::new();

    for &v in &order {
        let adjacent = &neighbors[&v];
        descend(
            HashSet::from_iter([v]),
            p.intersection(adjacent).copied().collect(),
            x.intersection(adjacent).copied().collect(),
            neighbors,
            &mut stack,
            &mut cliques,
        );
        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.candidates.len() {
                stack.pop();
                continue;
            }
            let u = frame.candidates[frame.next];
            frame.next += 1;

            let adjacent = &neighbors[&u];
            let mut r2 = frame.r.clone();
            r2.insert(u);
            let p2 = frame.p.intersection(adjacent).copied().collect();
            let x2 = frame.x.intersection(adjacent).copied().collect();
            frame.p.remove(&u);
            frame.x.insert(u);

            descend(r2, p2, x2, neighbors, &mut stack, &mut cliques);
        }
        p.remove(&v);
        x.insert(v);
    }
    cliques
}

/// Compute a degeneracy ordering by repeatedly removing a vertex of
/// minimum current degree.
fn degeneracy_order<V>(neighbors: &Neighbors<V>) -> Vec<V>
where
    V: Copy + Eq + Hash,
{
    let mut degree: HashMap<V, usize> = neighbors
        .iter()
        .map(|(&v, adjacent)| (v, adjacent.len()))
        .collect();
    let mut buckets: Vec<HashSet<V>> = Vec::new();
    for (&v, &d) in &degree {
        while buckets.len() <= d {
            buckets.push(HashSet::new());
        }
        buckets[d].insert(v);
    }

    let mut order = Vec::with_capacity(degree.len());
    let mut removed: HashSet<V> = HashSet::with_capacity(degree.len());
    loop {
        let Some(d) = buckets.iter().position(|bucket| !bucket.is_empty()) else {
            break;
        };
        let v = *buckets[d].iter().next().unwrap();
        buckets[d].remove(&v);
        order.push(v);
        removed.insert(v);
        for &u in &neighbors[&v] {
            if !removed.contains(&u) {
                let du = degree[&u];
                buckets[du].remove(&u);
                degree.insert(u, du - 1);
                buckets[du - 1].insert(u);
            }
        }
        while buckets.last().map_or(false, HashSet::is_empty) {
            buckets.pop();
        }
    }
    order
}

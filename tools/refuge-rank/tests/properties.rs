//! Randomised checks of ranking invariants against a brute-force reference

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use refuge_rank::formats::RankingFile;
use refuge_rank::{
    CategorySelector, Facility, FacilityId, FacilitySet, GraphBuilder, NodeId, RankQuery,
    RankingEngine, RankingStore, StoreConfig, WeightedGraph, ALL_CATEGORY,
};
use tempfile::TempDir;

struct Case {
    graph: WeightedGraph,
    edges: Vec<(usize, usize, f64)>,
    facilities: FacilitySet,
}

/// Sparse random graph with small integer weights (plenty of exact ties),
/// usually split into several components
fn random_case(seed: u64) -> Case {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = rng.gen_range(5..40usize);
    let m = rng.gen_range(n / 2..n * 2);

    let mut b = GraphBuilder::new();
    for i in 0..n {
        b.add_node(i as NodeId * 10, rng.gen::<f64>(), rng.gen::<f64>());
    }
    let mut edges = Vec::new();
    for _ in 0..m {
        let u = rng.gen_range(0..n);
        let v = rng.gen_range(0..n);
        let w = rng.gen_range(0..5u32) as f64;
        b.add_edge(u as NodeId * 10, v as NodeId * 10, w);
        edges.push((u, v, w));
    }

    let count = rng.gen_range(1..8u32);
    let facilities = (0..count)
        .map(|id| {
            let mut categories = BTreeSet::new();
            if rng.gen_bool(0.5) {
                categories.insert("flood".to_string());
            }
            Facility {
                id: FacilityId(100 - id * 7),
                name: format!("S{}", id % 3),
                node: rng.gen_range(0..n) as NodeId * 10,
                lat: 0.0,
                lon: 0.0,
                categories,
            }
        })
        .collect();

    Case {
        graph: b.build().unwrap(),
        edges,
        facilities: FacilitySet::new(facilities, vec!["flood".into()]).unwrap(),
    }
}

/// Bellman-Ford distances over the undirected edge list
fn reference_distances(n: usize, edges: &[(usize, usize, f64)], source: usize) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; n];
    dist[source] = 0.0;
    for _ in 0..n {
        let mut changed = false;
        for &(u, v, w) in edges {
            for (a, b) in [(u, v), (v, u)] {
                if dist[a] + w < dist[b] {
                    dist[b] = dist[a] + w;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    dist
}

#[test]
fn rankings_match_brute_force_order() {
    for seed in 0..40 {
        let case = random_case(seed);
        let n = case.graph.node_count();
        let active = case.facilities.active(ALL_CATEGORY);
        let ranking = RankingEngine::new(&case.graph)
            .compute(ALL_CATEGORY, &active)
            .unwrap();

        let dists: Vec<(FacilityId, Vec<f64>)> = active
            .iter()
            .map(|f| {
                let source = (f.node / 10) as usize;
                (f.id, reference_distances(n, &case.edges, source))
            })
            .collect();

        for v in 0..n {
            let mut expected: Vec<(f64, FacilityId)> = dists
                .iter()
                .filter(|(_, d)| d[v].is_finite())
                .map(|(id, d)| (d[v], *id))
                .collect();
            expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let expected: Vec<FacilityId> = expected.into_iter().map(|(_, id)| id).collect();

            let got = ranking.at(v as NodeId * 10).unwrap();
            assert_eq!(got, expected.as_slice(), "seed {seed}, node {v}");

            let unique: BTreeSet<_> = got.iter().collect();
            assert_eq!(unique.len(), got.len(), "duplicate ids, seed {seed}");
        }
    }
}

#[test]
fn derived_ranking_equals_direct_computation() {
    for seed in 100..130 {
        let case = random_case(seed);
        if case.facilities.active("flood").is_empty() {
            continue;
        }
        let dir = TempDir::new().unwrap();
        let engine = RankingEngine::new(&case.graph);
        let store = RankingStore::open(StoreConfig::new(dir.path())).unwrap();
        store
            .compute_and_persist(ALL_CATEGORY, &engine, &case.facilities)
            .unwrap();

        let derived = store.derive("flood", ALL_CATEGORY, &case.facilities).unwrap();
        let direct = engine
            .compute("flood", &case.facilities.active("flood"))
            .unwrap();
        assert_eq!(*derived, direct, "seed {seed}");
    }
}

#[test]
fn filtered_queries_agree_with_filtered_ranking() {
    for seed in 200..220 {
        let case = random_case(seed);
        let all = RankingEngine::new(&case.graph)
            .compute(ALL_CATEGORY, &case.facilities.active(ALL_CATEGORY))
            .unwrap();
        let selector = CategorySelector::from_predicate("even", &case.facilities, |f| {
            f.id.0 % 2 == 0
        });
        let filtered = all.filtered("even", &selector);
        let q = RankQuery::new(&all);
        let qf = RankQuery::new(&filtered);

        for &node in case.graph.nodes() {
            assert_eq!(
                q.filtered_ranking(node, &selector).unwrap(),
                filtered.at(node).unwrap()
            );
            for rank in 1..4 {
                assert_eq!(
                    q.owner_at_filtered(node, rank, &selector).unwrap(),
                    qf.owner_at(node, rank).unwrap()
                );
            }
        }
    }
}

#[test]
fn recomputation_is_byte_identical() {
    for seed in 300..310 {
        let case = random_case(seed);
        let active = case.facilities.active(ALL_CATEGORY);
        let first = RankingEngine::new(&case.graph)
            .compute(ALL_CATEGORY, &active)
            .unwrap();

        // reversed input order must not matter
        let mut reversed = active.clone();
        reversed.reverse();
        let second = RankingEngine::new(&case.graph)
            .compute(ALL_CATEGORY, &reversed)
            .unwrap();

        assert_eq!(
            RankingFile::encode(&first).unwrap(),
            RankingFile::encode(&second).unwrap(),
            "seed {seed}"
        );

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("all.rnk");
        RankingFile::write(&path, &first).unwrap();
        assert_eq!(RankingFile::read(&path).unwrap(), first);
    }
}

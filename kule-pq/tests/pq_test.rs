use kule_pq::PriorityQueue;
use rand::Rng;
use std::collections::HashMap;

#[test]
fn pop_on_fresh_queue_is_none() {
    let pq: PriorityQueue<u64> = PriorityQueue::new();
    assert_eq!(pq.pop(), None);
    assert!(pq.is_empty());
}

#[test]
fn single_element_roundtrip() {
    let pq = PriorityQueue::new();
    pq.push(42u64);
    assert_eq!(pq.len(), 1);
    assert_eq!(pq.pop(), Some(42));
    assert_eq!(pq.pop(), None);
    assert!(pq.is_empty());
}

#[test]
fn drains_in_sorted_order() {
    let pq = PriorityQueue::new();
    for v in [3u64, 1, 4, 1, 5, 9, 2, 6] {
        pq.push(v);
    }
    let mut out = Vec::new();
    while let Some(v) = pq.pop() {
        out.push(v);
    }
    assert_eq!(out, vec![1, 1, 2, 3, 4, 5, 6, 9]);
}

#[test]
fn duplicates_pop_once_each() {
    let pq = PriorityQueue::new();
    pq.push(5u64);
    pq.push(5);
    pq.push(5);
    assert_eq!(pq.pop(), Some(5));
    assert_eq!(pq.pop(), Some(5));
    assert_eq!(pq.pop(), Some(5));
    assert_eq!(pq.pop(), None);
}

#[test]
fn random_bulk_is_a_sorted_permutation() {
    let mut rng = rand::thread_rng();
    let pq = PriorityQueue::new();
    let mut pushed: Vec<u64> = (0..1_000).map(|_| rng.gen_range(0..10_000)).collect();
    for &v in &pushed {
        pq.push(v);
    }

    let mut popped = Vec::new();
    while let Some(v) = pq.pop() {
        popped.push(v);
    }

    pushed.sort_unstable();
    assert_eq!(popped, pushed);
}

#[test]
fn interleaving_preserves_the_multiset() {
    let mut rng = rand::thread_rng();
    let pq = PriorityQueue::new();
    let mut balance: HashMap<u32, i64> = HashMap::new();

    for _ in 0..2_000 {
        if rng.gen_bool(0.6) {
            let v = rng.gen_range(0..50u32);
            pq.push(v);
            *balance.entry(v).or_default() += 1;
        } else if let Some(v) = pq.pop() {
            *balance.entry(v).or_default() -= 1;
        }
    }
    while let Some(v) = pq.pop() {
        *balance.entry(v).or_default() -= 1;
    }

    assert!(
        balance.values().all(|&count| count == 0),
        "multiset mismatch: {balance:?}"
    );
}

#[test]
fn len_tracks_sequential_operations() {
    let pq = PriorityQueue::new();
    for i in 0..10u64 {
        pq.push(i);
        assert_eq!(pq.len(), (i + 1) as usize);
    }
    for i in (0..10usize).rev() {
        pq.pop();
        assert_eq!(pq.len(), i);
    }
}

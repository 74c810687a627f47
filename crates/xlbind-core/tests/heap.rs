use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use xlbind_core::{BridgeError, HandleSeed, Heap, HeapConfig, Object, ObjectHandle};

fn heap() -> Heap {
    Heap::new(&HeapConfig::default().with_seed(HandleSeed::Fixed(10_000)))
}

#[test]
fn interning_twice_returns_the_same_handle() {
    let heap = heap();
    let obj = Object::text("curve");
    let a = heap.intern(&obj);
    let b = heap.intern(&obj.clone());
    assert_eq!(a, b);
    assert_eq!(heap.len(), 1);
    assert!(heap.resolve(a).unwrap().same_identity(&obj));
}

#[test]
fn concurrent_interning_of_one_instance_yields_one_handle() {
    let heap = Arc::new(heap());
    let obj = Object::double(1.5);
    let handles: Vec<ObjectHandle> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let heap = Arc::clone(&heap);
                let obj = obj.clone();
                s.spawn(move || (0..200).map(|_| heap.intern(&obj)).collect::<Vec<_>>())
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });
    let distinct: HashSet<_> = handles.into_iter().collect();
    assert_eq!(distinct.len(), 1);
    assert_eq!(heap.len(), 1);
}

#[test]
fn concurrent_interning_of_many_instances_never_collides() {
    let heap = Arc::new(heap());
    let handles: Vec<ObjectHandle> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let heap = Arc::clone(&heap);
                s.spawn(move || {
                    (0..250)
                        .map(|i| heap.intern(&Object::int(t * 1000 + i)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });
    let distinct: HashSet<_> = handles.iter().copied().collect();
    assert_eq!(distinct.len(), 1000);
    assert_eq!(heap.len(), 1000);
}

#[test]
fn unreachable_handle_survives_the_threshold_then_goes() {
    let heap = heap();
    let obj = Object::text("temp");
    let h = heap.intern(&obj);
    heap.begin_cycle();
    for cycle in 1..=3 {
        let report = heap.end_cycle(&[]);
        assert_eq!(report.collected, 0, "cycle {cycle}");
        assert!(heap.contains(h));
    }
    let report = heap.end_cycle(&[]);
    assert_eq!(report.collected, 1);
    assert!(!heap.contains(h));
    assert!(heap.handle_of(&obj).is_none());
    assert_eq!(heap.resolve(h).unwrap_err(), BridgeError::NotFound(h));
}

#[test]
fn reachability_resets_the_miss_count() {
    let heap = heap();
    let h = heap.intern(&Object::text("kept"));
    heap.begin_cycle();
    for _ in 0..3 {
        heap.end_cycle(&[]);
    }
    let report = heap.end_cycle(&[h]);
    assert_eq!(report.live, 1);
    for _ in 0..3 {
        assert_eq!(heap.end_cycle(&[]).collected, 0);
    }
    assert!(heap.contains(h));
    assert_eq!(heap.end_cycle(&[]).collected, 1);
}

#[test]
fn handles_issued_after_the_boundary_are_exempt() {
    let heap = heap();
    let old = heap.intern(&Object::text("old"));
    heap.begin_cycle();
    let young = heap.intern(&Object::text("young"));
    for _ in 0..6 {
        let report = heap.end_cycle(&[]);
        assert!(report.examined <= 1);
    }
    assert!(!heap.contains(old));
    assert!(heap.contains(young));

    // the next cycle moves the boundary past it
    heap.begin_cycle();
    for _ in 0..4 {
        heap.end_cycle(&[]);
    }
    assert!(!heap.contains(young));
    assert!(heap.is_empty());
}

#[test]
fn nothing_is_eligible_before_the_first_cycle_begins() {
    let heap = heap();
    heap.intern(&Object::bool(true));
    for _ in 0..10 {
        let report = heap.end_cycle(&[]);
        assert_eq!(report.examined, 0);
    }
    assert_eq!(heap.len(), 1);
    assert_eq!(heap.cycles_completed(), 10);
}

#[test]
fn unknown_reachable_handles_are_reported_not_fatal() {
    let heap = heap();
    let known = heap.intern(&Object::long(5));
    heap.begin_cycle();
    let stale = ObjectHandle(42);
    let report = heap.cycle(&[known, stale, stale]);
    assert_eq!(report.unrecognised, 1);
    assert_eq!(report.live, 1);
    assert!(heap.contains(known));
}

#[test]
fn collection_runs_alongside_intern_and_resolve() {
    let heap = Heap::new(
        &HeapConfig::default()
            .with_seed(HandleSeed::Fixed(1))
            .with_hysteresis(0),
    );
    let kept: Vec<Object> = (0..32).map(|i| Object::text(format!("kept-{i}"))).collect();
    let kept_handles: Vec<ObjectHandle> = kept.iter().map(|o| heap.intern(o)).collect();

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..200 {
                heap.begin_cycle();
                let report = heap.end_cycle(&kept_handles);
                assert_eq!(report.unrecognised, 0);
            }
        });
        for t in 0..4 {
            let heap = &heap;
            let kept = &kept;
            let kept_handles = &kept_handles;
            s.spawn(move || {
                for i in 0..500 {
                    let fresh = Object::int(t * 10_000 + i);
                    let h = heap.intern(&fresh);
                    // either still there as the same object, or gone from both sides
                    match heap.resolve(h) {
                        Ok(obj) => {
                            assert!(obj.same_identity(&fresh));
                            assert!(heap.handle_of(&fresh).is_none_or(|x| x == h));
                        }
                        Err(err) => {
                            assert_eq!(err, BridgeError::NotFound(h));
                            assert!(heap.handle_of(&fresh).is_none());
                        }
                    }

                    let k = i as usize % kept.len();
                    assert_eq!(heap.intern(&kept[k]), kept_handles[k]);
                    assert!(heap.resolve(kept_handles[k]).unwrap().same_identity(&kept[k]));
                }
            });
        }
    });

    for (obj, h) in kept.iter().zip(&kept_handles) {
        assert!(heap.resolve(*h).unwrap().same_identity(obj));
        assert_eq!(heap.handle_of(obj), Some(*h));
    }
}

proptest! {
    #[test]
    fn distinct_objects_get_distinct_handles(values in proptest::collection::vec(any::<i32>(), 1..64)) {
        let heap = heap();
        let objects: Vec<Object> = values.iter().map(|v| Object::int(*v)).collect();
        let handles: Vec<ObjectHandle> = objects.iter().map(|o| heap.intern(o)).collect();
        let distinct: HashSet<_> = handles.iter().copied().collect();
        prop_assert_eq!(distinct.len(), objects.len());
        for (obj, h) in objects.iter().zip(&handles) {
            prop_assert_eq!(heap.intern(obj), *h);
            prop_assert!(heap.resolve(*h).unwrap().same_identity(obj));
        }
    }

    #[test]
    fn reachable_handles_are_never_collected(keep_mask in proptest::collection::vec(any::<bool>(), 1..32), cycles in 4usize..8) {
        let heap = heap();
        let objects: Vec<Object> = (0..keep_mask.len()).map(|i| Object::int(i as i32)).collect();
        let handles: Vec<ObjectHandle> = objects.iter().map(|o| heap.intern(o)).collect();
        let reachable: Vec<ObjectHandle> = handles
            .iter()
            .zip(&keep_mask)
            .filter(|(_, keep)| **keep)
            .map(|(h, _)| *h)
            .collect();
        heap.begin_cycle();
        for _ in 0..cycles {
            heap.cycle(&reachable);
        }
        for (h, keep) in handles.iter().zip(&keep_mask) {
            prop_assert_eq!(heap.contains(*h), *keep);
        }
    }
}

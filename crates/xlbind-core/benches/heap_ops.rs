use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use xlbind_core::{
    Bridge, BridgeConfig, HandleSeed, Heap, HeapConfig, Object, ResultMode, TaggedValue, XlArray,
};

fn fixed_heap() -> Heap {
    Heap::new(&HeapConfig::default().with_seed(HandleSeed::Fixed(1)))
}

fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("Heap");

    for n in [1_000usize, 10_000] {
        let objects: Vec<Object> = (0..n).map(|i| Object::int(i as i32)).collect();

        group.bench_with_input(BenchmarkId::new("Intern/Fresh", n), &n, |b, _| {
            b.iter(|| {
                let heap = fixed_heap();
                for o in &objects {
                    black_box(heap.intern(o));
                }
            })
        });

        // the common case: cells recalculating against objects already boxed
        let heap = fixed_heap();
        let handles: Vec<_> = objects.iter().map(|o| heap.intern(o)).collect();
        group.bench_with_input(BenchmarkId::new("Intern/Existing", n), &n, |b, _| {
            b.iter(|| {
                for o in &objects {
                    black_box(heap.intern(o));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("Resolve", n), &n, |b, _| {
            b.iter(|| {
                for h in &handles {
                    let _ = black_box(heap.resolve(*h));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("Cycle/AllLive", n), &n, |b, _| {
            heap.begin_cycle();
            b.iter(|| black_box(heap.cycle(&handles)))
        });
    }
    group.finish();
}

fn bench_invoke(c: &mut Criterion) {
    let bridge = Bridge::builder()
        .with_config(BridgeConfig::default().with_heap(HeapConfig::default().with_seed(HandleSeed::Fixed(1))))
        .with_standard_converters()
        .with_builtin_classes()
        .build();
    let row = XlArray::row((0..100).map(|i| TaggedValue::Number(f64::from(i))).collect());
    let list = bridge.construct_by_name("List", &[row.into()]);
    let h = list.as_handle().expect("list constructed");

    let mut group = c.benchmark_group("Invoke");
    group.bench_function("List.get", |b| {
        b.iter(|| bridge.invoke_method(h, "get", &[TaggedValue::Number(black_box(42.0))], ResultMode::Simplest))
    });
    group.bench_function("List.toArray", |b| {
        b.iter(|| bridge.invoke_method(h, "toArray", &[], ResultMode::Simplest))
    });
    group.finish();
}

criterion_group!(benches, bench_heap, bench_invoke);
criterion_main!(benches);

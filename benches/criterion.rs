use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use strata_object::{DynamicObject, Layout, LayoutOptions, ObjectType, Value, intern};

/// Cold transition-chain construction: a fresh layout per iteration, so every
/// transition is a cache miss.
fn bench_shape_construction(c: &mut Criterion) {
    let keys: Vec<_> = (0..16).map(|i| intern(&format!("p{i}"))).collect();
    c.bench_function("shape chain construction (cold)", |b| {
        b.iter_batched(
            || Layout::new(LayoutOptions::default()),
            |layout| {
                let mut object = DynamicObject::new(layout.root_shape(ObjectType(0)));
                for (i, key) in keys.iter().enumerate() {
                    object.put(*key, Value::Int(i as i32));
                }
                object
            },
            BatchSize::SmallInput,
        )
    });
}

/// Warm transition-chain replay: one shared layout, so object construction
/// rides the transition cache end to end.
fn bench_shape_replay(c: &mut Criterion) {
    let layout = Layout::new(LayoutOptions::default());
    let keys: Vec<_> = (0..16).map(|i| intern(&format!("p{i}"))).collect();
    // Prime the cache.
    let mut primer = DynamicObject::new(layout.root_shape(ObjectType(0)));
    for (i, key) in keys.iter().enumerate() {
        primer.put(*key, Value::Int(i as i32));
    }
    c.bench_function("shape chain replay (warm)", |b| {
        b.iter(|| {
            let mut object = DynamicObject::new(layout.root_shape(ObjectType(0)));
            for (i, key) in keys.iter().enumerate() {
                object.put(*key, Value::Int(i as i32));
            }
            object
        })
    });
}

/// Repeated writes through a stable location, the inline-cache fast path.
fn bench_put_fast_path(c: &mut Criterion) {
    let layout = Layout::new(LayoutOptions::default());
    let key = intern("counter");
    let mut object = DynamicObject::new(layout.root_shape(ObjectType(0)));
    object.put(key, Value::Int(0));
    c.bench_function("put fast path", |b| {
        let mut i = 0i32;
        b.iter(|| {
            i = i.wrapping_add(1);
            object.put(key, Value::Int(i));
        })
    });
}

/// Property lookup through chains of increasing length.
fn bench_get(c: &mut Criterion) {
    let layout = Layout::new(LayoutOptions::default());
    for len in [4u32, 16, 64] {
        let keys: Vec<_> = (0..len).map(|i| intern(&format!("k{i}"))).collect();
        let mut object = DynamicObject::new(layout.root_shape(ObjectType(0)));
        for (i, key) in keys.iter().enumerate() {
            object.put(*key, Value::Int(i as i32));
        }
        let first = keys[0];
        let last = keys[len as usize - 1];
        c.bench_function(&format!("get first of {len}"), |b| {
            b.iter(|| object.get(first))
        });
        c.bench_function(&format!("get last of {len}"), |b| {
            b.iter(|| object.get(last))
        });
    }
}

/// The generalization slow path: an int property widened by a double write,
/// forcing a relayout.
fn bench_generalization(c: &mut Criterion) {
    let key_x = intern("x");
    let key_y = intern("y");
    c.bench_function("generalize int to double", |b| {
        b.iter_batched(
            || {
                let layout = Layout::new(LayoutOptions::default());
                let mut object = DynamicObject::new(layout.root_shape(ObjectType(0)));
                object.put(key_x, Value::Int(1));
                object.put(key_y, Value::Int(2));
                object
            },
            |mut object| {
                object.put(key_x, Value::Double(3.5));
                object
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_shape_construction,
    bench_shape_replay,
    bench_put_fast_path,
    bench_get,
    bench_generalization,
);
criterion_main!(benches);

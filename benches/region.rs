use criterion::{criterion_group, criterion_main, Criterion};
use kms_planner::utils::{Physical, Rectangle, Region, Size};
use rand::Rng;

fn visible_area(view: Rectangle<i32, Physical>, opaque: &Region) -> i64 {
    opaque.uncovered(view).area()
}

fn criterion_benchmark(c: &mut Criterion) {
    let stage: Size<i32, Physical> = Size::from((1920, 1080));
    let view_size: Size<i32, Physical> = Size::from((200, 100));
    let max_x = stage.w - view_size.w;
    let max_y = stage.h - view_size.h;

    let mut rand = rand::thread_rng();
    let x = rand.gen_range(0..max_x);
    let y = rand.gen_range(0..max_y);
    let view = Rectangle::new((x, y).into(), view_size);

    let x_min = (view.loc.x - view_size.w) + 1;
    let x_max = (view.loc.x + view_size.w) - 1;
    let y_min = (view.loc.y - view_size.h) + 1;
    let y_max = (view.loc.y + view_size.h) - 1;

    let opaque_rects = (0..256)
        .map(|_| {
            let x = rand.gen_range(x_min..=x_max);
            let y = rand.gen_range(y_min..=y_max);
            Rectangle::new((x, y).into(), view_size)
        })
        .collect::<Vec<_>>();

    c.bench_function("region_union", |b| {
        b.iter(|| opaque_rects.iter().copied().collect::<Region>());
    });

    let opaque: Region = opaque_rects.iter().copied().collect();
    c.bench_function("region_visible_area", |b| {
        b.iter(|| visible_area(view, &opaque));
    });

    c.bench_function("subtract_rects_many", |b| {
        b.iter(|| Rectangle::subtract_rects_many(vec![view], opaque_rects.iter().copied()));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

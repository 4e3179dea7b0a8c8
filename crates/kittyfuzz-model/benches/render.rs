//! Mutate/render hot-loop benchmarks.

use criterion::{criterion_group, criterion_main, Criterion};
use kittyfuzz_model::{
    u16_be, u32_be, Checksum, Container, Delimiter, Group, Size, Static, StringField, Template,
};

fn protocol_template() -> Template {
    Template::new(
        "bench",
        Container::new(vec![
            Static::new("\x01\x02").into(),
            Size::new("body", 32).into(),
            Checksum::new("body", 32).into(),
            Container::new(vec![
                Group::new(["GET", "PUT", "DELETE"]).with_name("verb").into(),
                Delimiter::new(" ").into(),
                StringField::new("/index.html").with_name("path").into(),
                u16_be(0x0101).into(),
                u32_be(0xdeadbeef).into(),
            ])
            .with_name("body")
            .into(),
        ]),
    )
    .expect("valid template")
}

fn bench_default_render(c: &mut Criterion) {
    let mut template = protocol_template();
    c.bench_function("render_default", |b| {
        b.iter(|| {
            template.reset();
            std::hint::black_box(template.render_bytes())
        })
    });
}

fn bench_mutate_render_walk(c: &mut Criterion) {
    let mut template = protocol_template();
    c.bench_function("mutate_render_100", |b| {
        b.iter(|| {
            template.reset();
            for _ in 0..100 {
                if !template.mutate() {
                    break;
                }
                std::hint::black_box(template.render_bytes());
            }
        })
    });
}

fn bench_skip(c: &mut Criterion) {
    let mut template = protocol_template();
    let total = template.num_mutations();
    c.bench_function("skip_to_end", |b| {
        b.iter(|| {
            template.reset();
            std::hint::black_box(template.skip(total))
        })
    });
}

criterion_group!(benches, bench_default_render, bench_mutate_render_walk, bench_skip);
criterion_main!(benches);

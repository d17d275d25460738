//! Benchmarks for rendering, loading and running operation graphs.
//!
//! Run with the `profile-with-puffin` feature to capture puffin frames:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use opgraph::prelude::*;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

/// Print how many profiling frames were captured.
#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    let Some(frame_view) = FRAME_VIEW.get() else {
        return;
    };
    let frames = frame_view.lock().recent_frames().count();
    println!("puffin: captured {frames} frame(s)");
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

/// A function with `loops` sequential counting loops, each guarded by a
/// try/finally and an early-exit branch.
fn workload(registry: &Rc<TypeRegistry>, loops: usize) -> Function {
    build_workload(registry, loops).unwrap()
}

fn build_workload(registry: &Rc<TypeRegistry>, loops: usize) -> Result<Function, OpGraphError> {
    let int = |name: &str| Expr::var(name, DataType::Int32);
    let mut b = FunctionBuilder::new(
        Rc::clone(registry),
        vec![Param::named("n", DataType::Int32)],
        DataType::Int32,
    );
    b.set("acc", Expr::constant(0))?;
    for i in 0..loops {
        let counter = format!("i{i}");
        b.set(&counter, Expr::constant(0))?;
        b.try_()?;
        b.while_(Expr::lt(int(&counter), int("n")))?;
        b.set(&counter, Expr::add(int(&counter), Expr::constant(1)))?;
        b.if_(Expr::equal(int(&counter), Expr::constant(1000)))?
            .break_()?
            .end()?;
        b.set("acc", Expr::add(int("acc"), int(&counter)))?;
        b.end()?;
        b.finally()?;
        b.set("acc", Expr::add(int("acc"), Expr::constant(1)))?;
        b.end()?;
    }
    b.ret_value(int("acc"))?;
    Ok(b.finish()?)
}

fn render_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let registry = Rc::new(TypeRegistry::with_builtins());
    let mut group = c.benchmark_group("render");
    for loops in [1, 10, 100] {
        let function = workload(&registry, loops);
        let size = render(&function).unwrap().len();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("loops_{loops}"), |b| {
            b.iter(|| {
                let text = render(black_box(&function)).unwrap();
                end_profiling_frame();
                black_box(text.len())
            });
        });
    }
    group.finish();
}

fn load_benchmarks(c: &mut Criterion) {
    let registry = Rc::new(TypeRegistry::with_builtins());
    let mut group = c.benchmark_group("load");
    for loops in [1, 10, 100] {
        let source = render(&workload(&registry, loops)).unwrap();
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_function(format!("loops_{loops}"), |b| {
            b.iter(|| {
                let function = load(black_box(&source), &registry).unwrap();
                end_profiling_frame();
                black_box(function.body.len())
            });
        });
    }
    group.finish();
}

fn run_benchmarks(c: &mut Criterion) {
    let registry = Rc::new(TypeRegistry::with_builtins());
    let compiled = compile(&workload(&registry, 10), Rc::clone(&registry)).unwrap();
    let mut group = c.benchmark_group("run");
    for n in [10, 1000] {
        group.bench_function(format!("n_{n}"), |b| {
            b.iter(|| {
                let value = compiled.call(&[Value::Int32(black_box(n))]).unwrap();
                end_profiling_frame();
                black_box(value)
            });
        });
    }
    group.finish();
    print_profiling_stats();
}

criterion_group!(benches, render_benchmarks, load_benchmarks, run_benchmarks);
criterion_main!(benches);

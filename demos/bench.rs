use sln_rs::{Sln, SlnBuilder, SlnItems};
use std::time::Instant;

/// Time `f` over `iterations` runs and report the mean plus how many
/// projects per second the run parsed (`projects` per call).
fn bench<T>(label: &str, iterations: u32, projects: usize, mut f: impl FnMut() -> T) -> T {
    std::hint::black_box(f());

    let start = Instant::now();
    let mut last = f();
    for _ in 1..iterations {
        last = std::hint::black_box(f());
    }
    let total = start.elapsed();

    let avg = total / iterations;
    let rate = (projects as f64 * f64::from(iterations)) / total.as_secs_f64().max(f64::EPSILON);
    println!("{label:<40} avg {avg:>10.3?}   {rate:>12.0} projects/s");
    last
}

fn main() {
    let source = std::fs::read_to_string("example.sln")
        .expect("example.sln not found, run from repo root");

    let iterations = 1000;
    let projects = Sln::parse(&source).unwrap().projects().len();

    println!("─── example.sln: {} bytes, {projects} projects ───", source.len());
    println!();

    let sln = bench("Sln::parse (solution)", iterations, projects, || {
        Sln::parse(&source).unwrap()
    });

    bench("projects only", iterations, projects, || {
        SlnBuilder::new().items(SlnItems::PROJECTS).parse(&source).unwrap()
    });

    bench("configuration platforms", iterations, projects, || {
        SlnBuilder::new()
            .items(SlnItems::SOLUTION_CONF_PLATFORMS)
            .parse(&source)
            .unwrap()
    });

    // Baseline: trimmed non-empty lines, no handlers.
    bench("line scan", iterations, projects, || {
        source.lines().map(str::trim).filter(|l| !l.is_empty()).count()
    });

    // Project files are not on disk, so this measures the unavailable path.
    bench("load minimal", iterations, projects, || {
        SlnBuilder::new().items(SlnItems::LOAD_MINIMAL).parse(&source).unwrap()
    });

    println!();
    println!(
        "{} projects, {} solution configurations, {} project configurations",
        sln.projects().len(),
        sln.solution_configs().len(),
        sln.project_configs().len()
    );
    println!("Done.");
}

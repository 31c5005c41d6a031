//! Criterion benchmarks for cooking and the audio block runner.
//!
//! Measures scheduler overhead independently of operator cost using a trivial
//! `Sum` operator. Three axes:
//!
//! - **Build**: name resolution plus depth scheduling
//! - **Cook**: idle pass (everything clean) vs. a dirty source recomputing the chain
//! - **Audio**: `AudioBlockRunner::process` throughput at varying block sizes
//!
//! Run with: `cargo bench -p kiln-core -- cook/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use kiln_core::{
    AudioInputs, AudioOperator, BlockContext, BuildError, CodeUnit, CookContext, Graph,
    GraphBuilder, Operator, Output, OutputKind, ParamDescriptor, ParamSet, ParamValue, Runtime,
    RuntimeSettings, TickInfo, UnitError, UnitLoader,
};

const CHAIN_LENGTHS: &[usize] = &[10, 100, 1000];
const BLOCK_SIZES: &[usize] = &[64, 256, 1024];

// ---------------------------------------------------------------------------
// Trivial operators
// ---------------------------------------------------------------------------

struct Sum {
    params: ParamSet,
}

impl Sum {
    fn new() -> Self {
        let mut params = ParamSet::new();
        params.add(ParamDescriptor::float("bias", -1.0, 1.0, 0.0));
        Self { params }
    }
}

impl Operator for Sum {
    fn type_name(&self) -> &'static str {
        "sum"
    }
    fn output_kind(&self) -> OutputKind {
        OutputKind::Value
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn compute(&mut self, ctx: &CookContext<'_>) -> Output {
        let bias = self.params.get(0).map_or(0.0, |p| p.load_f32());
        Output::Value(bias + ctx.inputs().filter_map(Output::as_value).sum::<f32>())
    }
}

struct Saw {
    params: ParamSet,
    phase: f32,
}

impl AudioOperator for Saw {
    fn type_name(&self) -> &'static str {
        "saw"
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn process(&mut self, ctx: &BlockContext, _inputs: AudioInputs<'_>, out: &mut [f32]) {
        let step = 220.0 / ctx.sample_rate;
        for sample in out.iter_mut() {
            self.phase = (self.phase + step).fract();
            *sample = self.phase * 2.0 - 1.0;
        }
    }
}

struct Scale {
    params: ParamSet,
}

impl AudioOperator for Scale {
    fn type_name(&self) -> &'static str {
        "scale"
    }
    fn params(&self) -> &ParamSet {
        &self.params
    }
    fn process(&mut self, _ctx: &BlockContext, inputs: AudioInputs<'_>, out: &mut [f32]) {
        if let Some(input) = inputs.get(0) {
            for (o, i) in out.iter_mut().zip(input) {
                *o = i * 0.5;
            }
        }
    }
}

fn make_chain(n: usize) -> Graph {
    let mut b = GraphBuilder::new();
    b.add("n0", Sum::new()).unwrap();
    for i in 1..n {
        b.add(format!("n{i}"), Sum::new())
            .unwrap()
            .input(format!("n{}", i - 1));
    }
    b.finish(256).unwrap().0
}

fn audio_unit(b: &mut GraphBuilder) -> Result<(), BuildError> {
    b.add_audio("saw", Saw { params: ParamSet::new(), phase: 0.0 })?;
    let mut prev = "saw".to_string();
    for i in 0..8 {
        let name = format!("scale{i}");
        b.add_audio(name.clone(), Scale { params: ParamSet::new() })?
            .input(prev);
        prev = name;
    }
    b.audio_output(prev);
    Ok(())
}

struct StaticLoader;

impl UnitLoader for StaticLoader {
    fn load(&mut self) -> Result<Box<dyn CodeUnit>, UnitError> {
        Ok(Box::new(audio_unit))
    }
}

// ---------------------------------------------------------------------------
// Build benchmarks
// ---------------------------------------------------------------------------

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("cook/build");
    for &n in CHAIN_LENGTHS {
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, &n| {
            b.iter(|| black_box(make_chain(n)));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Cook benchmarks
// ---------------------------------------------------------------------------

fn bench_cook(c: &mut Criterion) {
    let mut group = c.benchmark_group("cook/pass");
    let tick = TickInfo::default();

    for &n in CHAIN_LENGTHS {
        let mut graph = make_chain(n);
        graph.cook(&tick);
        group.bench_with_input(BenchmarkId::new("idle", n), &n, |b, _| {
            b.iter(|| black_box(graph.cook(&tick)));
        });

        let mut graph = make_chain(n);
        graph.cook(&tick);
        let mut flip = false;
        group.bench_with_input(BenchmarkId::new("dirty_source", n), &n, |b, _| {
            b.iter(|| {
                flip = !flip;
                let bias = if flip { 0.5 } else { 0.25 };
                graph
                    .set_param("n0", "bias", ParamValue::Float(bias))
                    .unwrap();
                black_box(graph.cook(&tick))
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Audio benchmarks
// ---------------------------------------------------------------------------

fn bench_audio(c: &mut Criterion) {
    let mut group = c.benchmark_group("cook/audio");
    for &frames in BLOCK_SIZES {
        let settings = RuntimeSettings {
            block_frames: frames,
            ..RuntimeSettings::default()
        };
        let (mut runtime, runner) = Runtime::new(settings, StaticLoader);
        runtime.reload().unwrap();
        let mut out = vec![0.0f32; frames * settings.channels];

        group.bench_with_input(BenchmarkId::new("process", frames), &frames, |b, _| {
            b.iter(|| {
                runner.process(black_box(&mut out));
                black_box(&out);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_cook, bench_audio);
criterion_main!(benches);

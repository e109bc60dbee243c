use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colsum_core::reference::{max_rel_error, sum_rows_f64};
use colsum_core::view::required_len;
use colsum_core::{DType, Element, ReduceContext, StridedMatrix, reduce_rows};
use half::{bf16, f16};
use rand::Rng;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "colsum")]
#[command(about = "colsum development CLI")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the reference scenarios and print their results.
    Smoke,
    /// Benchmark every candidate tile shape on random data.
    Tune {
        #[command(flatten)]
        problem: Problem,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run every candidate and report its error against the f64 reference.
    Check {
        #[command(flatten)]
        problem: Problem,
    },
}

#[derive(clap::Args, Clone, Copy)]
struct Problem {
    /// Number of rows (M).
    #[arg(long, default_value_t = 4096)]
    rows: usize,
    /// Number of columns (N).
    #[arg(long, default_value_t = 256)]
    cols: usize,
    /// Row stride in elements; defaults to `cols`.
    #[arg(long)]
    stride: Option<usize>,
    /// Input element type: f32, f16 or bf16.
    #[arg(long, default_value_t = DType::F32)]
    dtype: DType,
}

impl Problem {
    fn stride(&self) -> usize {
        self.stride.unwrap_or(self.cols)
    }

    fn len(&self) -> Result<usize, String> {
        required_len(self.rows, self.cols, self.stride()).ok_or_else(|| {
            format!(
                "{}x{} problem with stride {} overflows usize",
                self.rows,
                self.cols,
                self.stride()
            )
        })
    }
}

/// What to run against a generated problem.
#[derive(Clone, Copy)]
enum Action {
    Tune { json: bool },
    Check,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let result = match args.cmd {
        Cmd::Smoke => smoke(),
        Cmd::Tune { problem, json } => run_problem(problem, Action::Tune { json }),
        Cmd::Check { problem } => run_problem(problem, Action::Check),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Maximum relative error `check` accepts for inputs of `dtype`.
fn tolerance(dtype: DType) -> f64 {
    if dtype.is_reduced_precision() { 1e-5 } else { 1e-6 }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn run_problem(problem: Problem, action: Action) -> CliResult {
    let len = problem.len()?;
    let mut rng = rand::rng();
    let raw: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0f32..1.0)).collect();
    println!(
        "problem: {}x{} stride={} dtype={} ({:.1} MiB)",
        problem.rows,
        problem.cols,
        problem.stride(),
        problem.dtype,
        len as f64 * problem.dtype.size_bytes() as f64 / (1024.0 * 1024.0)
    );

    match problem.dtype {
        DType::F32 => execute(&raw, problem, action),
        DType::F16 => {
            let data: Vec<f16> = raw.iter().map(|&v| f16::from_f32(v)).collect();
            execute(&data, problem, action)
        }
        DType::BF16 => {
            let data: Vec<bf16> = raw.iter().map(|&v| bf16::from_f32(v)).collect();
            execute(&data, problem, action)
        }
    }
}

fn execute<T: Element>(data: &[T], problem: Problem, action: Action) -> CliResult {
    let x = StridedMatrix::new(data, problem.rows, problem.cols, problem.stride())?;
    let ctx = ReduceContext::from_env()?;
    tracing::debug!(
        dtype = %x.dtype(),
        threads = ?ctx.thread_pool().map(|p| p.current_num_threads()),
        "running problem"
    );
    match action {
        Action::Tune { json } => tune(&ctx, &x, json),
        Action::Check => check(&ctx, &x),
    }
}

/// Compare a smoke result against its expected value.
fn expect_sums(label: &str, got: &[f32], want: &[f32]) -> CliResult {
    println!("{label} = {got:?}");
    if got != want {
        return Err(format!("{label}: expected {want:?}, got {got:?}").into());
    }
    Ok(())
}

fn smoke() -> CliResult {
    let ctx = ReduceContext::from_env()?;

    let data = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
    let mut out = vec![0.0; 3];
    let config = reduce_rows(&ctx, &mut out, &data, 3, 4, 3)?;
    expect_sums(
        &format!("sum_rows 4x3 (tile {config})"),
        &out,
        &[22.0, 26.0, 30.0],
    )?;

    let ones = [1.0f32; 5];
    let mut out = vec![0.0; 5];
    let config = reduce_rows(&ctx, &mut out, &ones, 5, 1, 5)?;
    expect_sums(&format!("sum_rows 1x5 ones (tile {config})"), &out, &[1.0; 5])?;

    let rows = 100_000;
    let halves = vec![f16::ONE; rows];
    let mut out = vec![0.0; 1];
    let config = reduce_rows(&ctx, &mut out, &halves, 1, rows, 1)?;
    expect_sums(
        &format!("sum_rows f16 {rows}x1 ones (tile {config})"),
        &out,
        &[rows as f32],
    )?;

    let data = [1.0f32; 8];
    let mut out = vec![f32::NAN; 4];
    reduce_rows(&ctx, &mut out, &data, 4, 0, 4)?;
    expect_sums("sum_rows 0x4", &out, &[0.0; 4])?;

    println!("\ncached selections: {}", ctx.autotuner().len());
    println!("All smoke tests passed.");
    Ok(())
}

fn tune<T: Element>(ctx: &ReduceContext, x: &StridedMatrix<'_, T>, json: bool) -> CliResult {
    let mut out = vec![0.0f32; x.cols()];
    let report = ctx.tune(&mut out, x)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let settings = ctx.autotuner().settings();
    println!(
        "{} warmup + {} timed launches per candidate",
        settings.warmup, settings.iterations
    );
    println!("{:>14}  {:>12}  {:>12}  {:>12}", "tile", "median", "min", "max");
    for t in &report.timings {
        let marker = if t.config == report.best { " *" } else { "" };
        println!(
            "{:>14}  {:>12}  {:>12}  {:>12}{marker}",
            t.config.to_string(),
            format!("{:?}", t.median),
            format!("{:?}", t.min),
            format!("{:?}", t.max)
        );
    }
    match report.best_timing() {
        Some(best) => println!(
            "selected {} ({:?} median) for {}",
            report.best, best.median, report.signature
        ),
        None => println!("selected {} for {}", report.best, report.signature),
    }
    Ok(())
}

fn check<T: Element>(ctx: &ReduceContext, x: &StridedMatrix<'_, T>) -> CliResult {
    let expected = sum_rows_f64(x);
    let limit = tolerance(x.dtype());
    let mut worst = 0.0f64;
    for config in ctx.autotuner().candidates() {
        let mut out = vec![0.0f32; x.cols()];
        ctx.reduce_rows_with(&mut out, x, config)?;
        let err = max_rel_error(&out, &expected, 1.0);
        worst = worst.max(err);
        println!("{:>14}  max rel err {err:.3e}", config.to_string());
    }
    if worst >= limit {
        return Err(format!("relative error {worst:.3e} exceeds {limit:e}").into());
    }
    println!("All candidates within tolerance.");
    Ok(())
}

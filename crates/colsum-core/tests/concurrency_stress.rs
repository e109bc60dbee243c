//! Concurrency stress: shared contexts, racing first-time selection, and
//! determinism of repeated launches.

use std::sync::{Arc, Barrier};

use colsum_core::{CANDIDATES, DType, ReduceContext, Signature, TuneSettings, reduce_rows};

fn quick_ctx() -> ReduceContext {
    ReduceContext::with_settings(TuneSettings {
        warmup: 0,
        iterations: 1,
        ..TuneSettings::default()
    })
}

// ─── Racing first-time selection ────────────────────────────────────────

#[test]
fn racing_threads_agree_on_selection() {
    // 8 threads hit the same unseen signature at once. Whichever search
    // finishes first is stored, and every thread must report that entry.
    let n_threads = 8;
    let (rows, cols) = (512, 48);
    let data: Vec<f32> = (0..rows * cols).map(|i| (i % 11) as f32).collect();
    let ctx = quick_ctx();
    let barrier = Barrier::new(n_threads);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..n_threads)
            .map(|_| {
                s.spawn(|| {
                    let mut out = vec![0.0f32; cols];
                    barrier.wait();
                    let config = reduce_rows(&ctx, &mut out, &data, cols, rows, cols).unwrap();
                    (config, out)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let stored = ctx
        .autotuner()
        .cached(&Signature::new(rows, cols, DType::F32))
        .unwrap();
    let expected: Vec<f32> = (0..cols)
        .map(|c| (0..rows).map(|r| ((r * cols + c) % 11) as f32).sum())
        .collect();
    for (i, (config, out)) in results.iter().enumerate() {
        assert_eq!(*config, stored, "thread {i} saw a different selection");
        assert_eq!(*out, expected, "thread {i} produced wrong sums");
    }
    assert_eq!(ctx.autotuner().len(), 1);
    assert!(ctx.autotuner().searches() >= 1);
    assert!(ctx.autotuner().searches() <= n_threads as u64);
}

// ─── Shared context, distinct signatures ────────────────────────────────

#[test]
fn shared_context_many_signatures() {
    let n_threads = 12;
    let ctx = Arc::new(quick_ctx().threads(4).unwrap());

    std::thread::scope(|s| {
        for tid in 0..n_threads {
            let ctx = Arc::clone(&ctx);
            s.spawn(move || {
                let rows = 10 + tid * 7;
                let cols = 1 + tid * 3;
                let data = vec![1.0f32; rows * cols];
                let mut out = vec![0.0; cols];
                reduce_rows(&ctx, &mut out, &data, cols, rows, cols).unwrap();
                assert!(out.iter().all(|&v| v == rows as f32), "thread {tid}");
            });
        }
    });

    assert_eq!(ctx.autotuner().len(), n_threads);
    assert_eq!(ctx.autotuner().searches(), n_threads as u64);
}

// ─── Determinism ────────────────────────────────────────────────────────

#[test]
fn repeated_launches_bit_identical() {
    // Work stealing changes which worker runs which unit, never the result.
    let (rows, cols) = (2049, 77);
    let data: Vec<f32> = (0..rows * cols).map(|i| (i as f32 * 0.37).sin()).collect();
    let ctx = quick_ctx().threads(3).unwrap();
    let x = colsum_core::StridedMatrix::contiguous(&data, rows, cols).unwrap();

    for config in &CANDIDATES {
        let mut baseline = vec![0.0; cols];
        ctx.reduce_rows_with(&mut baseline, &x, config).unwrap();
        for _ in 0..5 {
            let mut out = vec![0.0; cols];
            ctx.reduce_rows_with(&mut out, &x, config).unwrap();
            let same = out
                .iter()
                .zip(&baseline)
                .all(|(a, b)| a.to_bits() == b.to_bits());
            assert!(same, "config {config} not deterministic");
        }
    }
}

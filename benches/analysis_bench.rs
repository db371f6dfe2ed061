use criterion::{black_box, criterion_group, criterion_main, Criterion};

use operant_suite::analysis::{self, aggregate, IngestedTrial};
use operant_suite::logger::{TrialClass, TrialResponse};

fn synthetic_trials(days: usize, per_day: usize) -> Vec<IngestedTrial> {
    let mut trials = Vec::with_capacity(days * per_day);
    for day in 0..days {
        let date: chrono::NaiveDate = chrono::NaiveDate::from_ymd_opt(2026, (day / 28) as u32 % 12 + 1, (day % 28) as u32 + 1)
            .unwrap();
        for i in 0..per_day {
            let (class, response) = match i % 4 {
                0 => (TrialClass::SPlus, TrialResponse::SPlus),
                1 => (TrialClass::SPlus, TrialResponse::SMinus),
                2 => (TrialClass::SMinus, TrialResponse::SPlus),
                _ => (TrialClass::SMinus, TrialResponse::SMinus),
            };
            trials.push(IngestedTrial {
                date,
                hour: (i % 24) as u32,
                block: "training 150".to_string(),
                class,
                response,
                indicator: analysis::classify(class, response),
            });
        }
    }
    trials
}

/// A subject run over several months produces tens of thousands of
/// trial rows; grouping by day is the hot path the `analyze summary`
/// and `analyze criteria` subcommands both run on every invocation.
fn aggregate_by_date_bench(c: &mut Criterion) {
    let trials = synthetic_trials(180, 300);

    c.bench_function("aggregate_180_days_by_date", |b| {
        b.iter(|| aggregate(black_box(&trials), &["Date"], &[]))
    });
}

fn aggregate_by_date_and_block_bench(c: &mut Criterion) {
    let trials = synthetic_trials(180, 300);

    c.bench_function("aggregate_180_days_by_date_and_block", |b| {
        b.iter(|| aggregate(black_box(&trials), &["Date", "Block"], &[]))
    });
}

criterion_group!(benches, aggregate_by_date_bench, aggregate_by_date_and_block_bench);
criterion_main!(benches);

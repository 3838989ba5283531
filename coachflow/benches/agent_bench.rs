//! Benchmarks for retry scheduling, error formatting and completion parsing.

use coachflow::config::Environment;
use coachflow::errors::{format_error_response, AgentError, CoachError, ErrorCode};
use coachflow::pipeline::{wrap_stage_error, RetryPolicy};
use coachflow::utils::parse_llm_json;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::Value;

fn retry_benchmark(c: &mut Criterion) {
    let policy = RetryPolicy::new().with_max_delay_ms(30_000);
    c.bench_function("retry_delay_for", |b| {
        b.iter(|| {
            for attempt in 0..8 {
                black_box(policy.delay_for(black_box(attempt)));
            }
        });
    });
}

fn error_benchmark(c: &mut Criterion) {
    let inner: CoachError = AgentError::external_service("upstream timed out")
        .with_detail("status", 504)
        .into();
    let wrapped = wrap_stage_error("gatherInsights", ErrorCode::ExternalService, inner);

    c.bench_function("format_error_response_production", |b| {
        b.iter(|| format_error_response(black_box(&wrapped), Environment::Production));
    });
    c.bench_function("format_error_response_development", |b| {
        b.iter(|| format_error_response(black_box(&wrapped), Environment::Development));
    });
}

fn json_benchmark(c: &mut Criterion) {
    let text = "Here is the plan:\n```json\n{\"summary\": \"Move the squat\", \"items\": [1, 2, 3]}\n```";
    c.bench_function("parse_llm_json_fenced", |b| {
        b.iter(|| parse_llm_json::<Value>(black_box(text), &["summary"]));
    });
}

criterion_group!(benches, retry_benchmark, error_benchmark, json_benchmark);
criterion_main!(benches);

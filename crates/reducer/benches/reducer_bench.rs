//! 결과 리듀서 벤치마크
//!
//! verbose 테스트 출력 파싱과 스위트 집계, JUnit 렌더링 처리량을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use imagetest_reducer::{GoTestParser, Reducer, ResultParser, render_report};

/// 통과/실패/서브테스트가 섞인 로그를 `cases`개 케이스만큼 생성합니다.
fn synthetic_log(cases: usize) -> String {
    let mut log = String::new();
    for i in 0..cases {
        log.push_str(&format!("=== RUN   TestCase{i}\n"));
        match i % 3 {
            0 => log.push_str(&format!("--- PASS: TestCase{i} (0.01s)\n")),
            1 => {
                log.push_str(&format!("    case_test.go:{i}: unexpected value\n"));
                log.push_str(&format!("--- FAIL: TestCase{i} (0.02s)\n"));
            }
            _ => {
                log.push_str(&format!("=== RUN   TestCase{i}/child\n"));
                log.push_str(&format!("--- PASS: TestCase{i} (0.00s)\n"));
                log.push_str(&format!("    --- PASS: TestCase{i}/child (0.00s)\n"));
            }
        }
    }
    log.push_str("FAIL\n");
    log
}

fn bench_parse(c: &mut Criterion) {
    let parser = GoTestParser::new();
    let mut group = c.benchmark_group("go_test_parser");

    for cases in [10usize, 100, 1000] {
        let log = synthetic_log(cases);
        group.throughput(Throughput::Bytes(log.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cases), &log, |b, log| {
            b.iter(|| parser.parse(black_box(log)).unwrap())
        });
    }

    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let reducer = Reducer::new();
    let logs: Vec<String> = (0..8).map(|_| synthetic_log(200)).collect();

    let mut group = c.benchmark_group("reduce_to_suite");
    group.throughput(Throughput::Elements(logs.len() as u64));
    group.bench_function("8_logs_200_cases", |b| {
        b.iter(|| reducer.reduce_to_suite(black_box(&logs), "bench"))
    });
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let reducer = Reducer::new();
    let suites: Vec<_> = (0..20)
        .map(|i| reducer.reduce_to_suite(&[synthetic_log(100)], &format!("suite-{i}")))
        .collect();

    c.bench_function("render_junit_20_suites", |b| {
        b.iter(|| render_report("bench", black_box(&suites)).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_reduce, bench_render);
criterion_main!(benches);

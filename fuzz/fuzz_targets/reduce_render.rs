#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use imagetest_reducer::{reduce_to_suite, render_report};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    suite: String,
    /// 로그 목록 (최대 8개로 제한)
    logs: Vec<FuzzLog>,
}

#[derive(Arbitrary, Debug)]
struct FuzzLog {
    cases: Vec<FuzzCase>,
    trailing: String,
}

#[derive(Arbitrary, Debug)]
struct FuzzCase {
    name: String,
    status: FuzzStatus,
    centis: u16,
    detail: Option<String>,
    terminated: bool,
}

#[derive(Arbitrary, Debug)]
enum FuzzStatus {
    Pass,
    Fail,
    Skip,
}

fn render_log(log: &FuzzLog) -> String {
    let mut out = String::new();
    for case in log.cases.iter().take(32) {
        let name: String = case.name.chars().filter(|c| !c.is_whitespace()).collect();
        out.push_str(&format!("=== RUN   {name}\n"));
        if let Some(detail) = &case.detail {
            out.push_str(&format!("    {}\n", detail.replace('\n', " ")));
        }
        if case.terminated {
            let status = match case.status {
                FuzzStatus::Pass => "PASS",
                FuzzStatus::Fail => "FAIL",
                FuzzStatus::Skip => "SKIP",
            };
            out.push_str(&format!(
                "--- {status}: {name} ({}.{:02}s)\n",
                case.centis / 100,
                case.centis % 100
            ));
        }
    }
    out.push_str(&log.trailing);
    out
}

fuzz_target!(|input: FuzzInput| {
    let logs: Vec<String> = input.logs.iter().take(8).map(render_log).collect();
    let suite = reduce_to_suite(&logs, &input.suite);

    // 카운터는 케이스 목록과 일치해야 함
    assert!(suite.failures <= suite.tests);
    assert!(suite.errors <= suite.tests + logs.len());
    assert_eq!(suite.cases.len(), suite.tests);

    let _ = render_report("fuzz", &[suite]);
});

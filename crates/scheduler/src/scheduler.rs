//! 스케줄러 -- 동시 실행 수 제한과 실행 간격을 지키며 워크플로를 실행
//!
//! # 실행 흐름
//! ```text
//! Vec<Workflow> -> 문서 렌더링 (실패 시 즉시 중단)
//!   -> [permit 획득 -> 직전 실행 + stagger 대기 -> spawn] 반복
//!   -> 엔진 실행 -> 로그 수집 -> reduce -> RunSummary (구성 순서)
//! ```
//!
//! 실행 순서는 워크플로 구성 순서를 따르고 완료 순서는 보장하지 않습니다.
//! 한 워크플로의 엔진 실패는 해당 스위트의 에러로만 기록됩니다.
//! 취소 토큰이 발동하면 새 실행만 멈추고 진행 중인 워크플로는 끝까지 기다립니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use imagetest_core::types::{RunSummary, TestSuiteResult};
use imagetest_graph::{Workflow, WorkflowDocument};
use imagetest_reducer::Reducer;

use crate::artifacts::{ArtifactStore, collect_workflow_logs};
use crate::engine::WorkflowEngine;
use crate::error::SchedulerError;

/// 최대 동시 실행 수
pub const MAX_PARALLEL_COUNT: usize = 1000;

/// 실행 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// 엔진으로 실행
    #[default]
    Execute,
    /// 문서만 렌더링
    Print,
    /// 그래프 검증만 수행
    Validate,
}

/// 스케줄러 옵션
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// 동시에 실행할 워크플로 최대 수
    pub parallel_count: usize,
    /// 연속 실행 사이의 최소 간격
    pub stagger: Duration,
    /// 실행, 출력, 검증 중 하나
    pub mode: RunMode,
    /// 아티팩트 저장소의 실행 결과 접두사
    pub artifacts_prefix: String,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            parallel_count: 5,
            stagger: Duration::from_secs(60),
            mode: RunMode::Execute,
            artifacts_prefix: String::new(),
        }
    }
}

/// 실행 결과
#[derive(Debug)]
pub enum RunOutcome {
    /// 엔진 실행 후 집계된 결과
    Executed(RunSummary),
    /// print 모드: 렌더링된 문서
    Printed(Vec<WorkflowDocument>),
    /// validate 모드: 검증된 워크플로 수
    Validated(usize),
}

/// 워크플로 스케줄러
pub struct Scheduler<E, S> {
    engine: Arc<E>,
    store: Arc<S>,
    reducer: Reducer,
    options: ScheduleOptions,
    run_id: String,
    cancel: CancellationToken,
}

impl<E: WorkflowEngine, S: ArtifactStore> Scheduler<E, S> {
    /// 스케줄러를 생성합니다. 동시 실행 수는 1 이상 [`MAX_PARALLEL_COUNT`] 이하여야 합니다.
    pub fn new(
        engine: Arc<E>,
        store: Arc<S>,
        run_id: impl Into<String>,
        options: ScheduleOptions,
    ) -> Result<Self, SchedulerError> {
        if options.parallel_count == 0 || options.parallel_count > MAX_PARALLEL_COUNT {
            return Err(SchedulerError::InvalidOption {
                field: "parallel_count",
                reason: format!("must be 1-{MAX_PARALLEL_COUNT}"),
            });
        }
        Ok(Self {
            engine,
            store,
            reducer: Reducer::new(),
            options,
            run_id: run_id.into(),
            cancel: CancellationToken::new(),
        })
    }

    /// 새 실행을 멈추는 데 쓰는 취소 토큰
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &ScheduleOptions {
        &self.options
    }

    /// 모드에 따라 워크플로를 실행, 렌더링 또는 검증합니다.
    pub async fn run(&self, workflows: Vec<Workflow>) -> Result<RunOutcome, SchedulerError> {
        match self.options.mode {
            RunMode::Print => Ok(RunOutcome::Printed(render_documents(&workflows)?)),
            RunMode::Validate => {
                for workflow in &workflows {
                    let order = workflow.topological_order()?;
                    debug!(workflow = %workflow.name(), steps = order.len(), "workflow validated");
                }
                Ok(RunOutcome::Validated(workflows.len()))
            }
            RunMode::Execute => {
                let documents = render_documents(&workflows)?;
                Ok(RunOutcome::Executed(self.execute(documents).await?))
            }
        }
    }

    /// 문서 목록을 실행하고 구성 순서대로 집계합니다.
    pub async fn execute(
        &self,
        documents: Vec<WorkflowDocument>,
    ) -> Result<RunSummary, SchedulerError> {
        let names: Vec<String> = documents.iter().map(|d| d.name.clone()).collect();
        let mut results: Vec<Option<TestSuiteResult>> = vec![None; documents.len()];
        let semaphore = Arc::new(Semaphore::new(self.options.parallel_count));
        let mut tasks = JoinSet::new();
        let mut launched = vec![false; documents.len()];
        let mut last_launch: Option<Instant> = None;

        info!(
            workflows = documents.len(),
            parallel = self.options.parallel_count,
            stagger_ms = self.options.stagger.as_millis() as u64,
            "starting workflows"
        );

        for (index, document) in documents.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.map_err(|e| SchedulerError::Join(e.to_string()))?
                }
            };
            if let Some(last) = last_launch {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(last + self.options.stagger) => {}
                }
            }
            last_launch = Some(Instant::now());

            info!(workflow = %document.name, index, "launching workflow");
            launched[index] = true;
            let engine = Arc::clone(&self.engine);
            let store = Arc::clone(&self.store);
            let reducer = self.reducer.clone();
            let prefix = self.options.artifacts_prefix.clone();
            let run_id = self.run_id.clone();
            tasks.spawn(async move {
                let suite =
                    run_workflow(engine, store, reducer, prefix, run_id, document, permit).await;
                (index, suite)
            });
        }

        if self.cancel.is_cancelled() {
            warn!("cancellation requested, waiting for in-flight workflows");
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, suite)) => results[index] = Some(suite),
                Err(e) => error!(error = %e, "workflow task failed"),
            }
        }

        let mut summary = RunSummary::default();
        for (index, result) in results.into_iter().enumerate() {
            let name = &names[index];
            let suite = result.unwrap_or_else(|| {
                if launched[index] {
                    warn!(workflow = %name, "workflow result lost");
                } else {
                    warn!(workflow = %name, "workflow not launched");
                }
                let mut suite = TestSuiteResult::new(name);
                suite.record_error();
                suite
            });
            summary.absorb(suite);
        }

        info!(
            suites = summary.suites.len(),
            tests = summary.tests,
            failures = summary.failures,
            errors = summary.errors,
            "all workflows finished"
        );
        Ok(summary)
    }
}

/// 모든 워크플로를 엔진 문서로 렌더링합니다. 하나라도 실패하면 중단합니다.
pub fn render_documents(workflows: &[Workflow]) -> Result<Vec<WorkflowDocument>, SchedulerError> {
    workflows
        .iter()
        .map(|workflow| {
            workflow.to_document().map_err(|source| SchedulerError::Setup {
                workflow: workflow.name().to_owned(),
                source,
            })
        })
        .collect()
}

/// 워크플로 하나를 실행하고 로그를 스위트 결과로 집계합니다.
async fn run_workflow<E: WorkflowEngine, S: ArtifactStore>(
    engine: Arc<E>,
    store: Arc<S>,
    reducer: Reducer,
    prefix: String,
    run_id: String,
    document: WorkflowDocument,
    permit: OwnedSemaphorePermit,
) -> TestSuiteResult {
    let name = document.name.clone();
    let started = Instant::now();
    let engine_result = engine.run(&document).await;
    drop(permit);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut suite = match collect_workflow_logs(store.as_ref(), &prefix, &run_id, &name).await {
        Ok(collected) => {
            let mut suite = reducer.reduce_to_suite(&collected.logs, &name);
            for _ in 0..collected.failed {
                suite.record_error();
            }
            if collected.logs.is_empty() && collected.failed == 0 && engine_result.is_ok() {
                warn!(workflow = %name, "workflow produced no test logs");
                suite.record_error();
            }
            suite
        }
        Err(e) => {
            let mut suite = TestSuiteResult::new(&name);
            if engine_result.is_ok() {
                warn!(workflow = %name, error = %e, "failed to collect test logs");
                suite.record_error();
            }
            suite
        }
    };

    match engine_result {
        Ok(()) => info!(
            workflow = %name,
            elapsed_ms,
            tests = suite.tests,
            failures = suite.failures,
            "workflow finished"
        ),
        Err(e) => {
            warn!(workflow = %name, elapsed_ms, error = %e, "workflow failed");
            suite.record_error();
        }
    }
    suite
}

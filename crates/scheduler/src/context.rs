//! 실행 컨텍스트 -- 한 번의 실행이 공유하는 조율 상태
//!
//! zone/테스트 프로젝트 라운드로빈 배정, 실행 ID, 스위트 필터를 소유하며
//! 워크플로 구성 단계에 명시적으로 전달됩니다.

use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use imagetest_graph::InstanceApi;

use crate::error::SchedulerError;
use crate::suite::SuiteFilter;

/// 내부 동기화된 라운드로빈 배정기
///
/// 여러 스위트 셋업이 동시에 호출해도 항목이 순서대로 순환합니다.
#[derive(Debug)]
pub struct RoundRobin {
    items: Vec<String>,
    next: Mutex<usize>,
}

impl RoundRobin {
    /// 항목 목록으로 배정기를 생성합니다. 빈 목록은 허용하지 않습니다.
    pub fn new(field: &'static str, items: Vec<String>) -> Result<Self, SchedulerError> {
        let items: Vec<String> = items
            .into_iter()
            .map(|item| item.trim().to_owned())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(SchedulerError::InvalidOption {
                field,
                reason: "at least one value is required".to_owned(),
            });
        }
        Ok(Self {
            items,
            next: Mutex::new(0),
        })
    }

    /// 다음 항목을 반환하고 커서를 전진시킵니다.
    pub fn next(&self) -> String {
        let mut cursor = match self.next.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let item = self.items[*cursor % self.items.len()].clone();
        *cursor = (*cursor + 1) % self.items.len();
        item
    }

    /// 전체 항목
    pub fn items(&self) -> &[String] {
        &self.items
    }
}

/// 한 번의 실행에 대한 컨텍스트
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    project: String,
    zones: RoundRobin,
    test_projects: RoundRobin,
    filter: SuiteFilter,
    exclude_discrete_tests: Option<String>,
    default_image_project: String,
    step_timeout: Option<Duration>,
    instance_api: InstanceApi,
}

/// 기본 이미지 프로젝트 (짧은 이미지 이름 해석용)
pub const DEFAULT_IMAGE_PROJECT: &str = "debian-cloud";

impl RunContext {
    /// 새 실행 컨텍스트를 생성합니다.
    ///
    /// `test_projects`가 비어 있으면 `project`만 사용합니다.
    pub fn new(
        project: impl Into<String>,
        zones: Vec<String>,
        test_projects: Vec<String>,
    ) -> Result<Self, SchedulerError> {
        let project = project.into();
        if project.trim().is_empty() {
            return Err(SchedulerError::InvalidOption {
                field: "project",
                reason: "must not be empty".to_owned(),
            });
        }
        let test_projects = if test_projects.iter().all(|p| p.trim().is_empty()) {
            vec![project.clone()]
        } else {
            test_projects
        };
        let run_id = Uuid::new_v4().to_string();
        debug!(run_id = %run_id, project = %project, "run context created");
        Ok(Self {
            run_id,
            project,
            zones: RoundRobin::new("zone", zones)?,
            test_projects: RoundRobin::new("test_projects", test_projects)?,
            filter: SuiteFilter::default(),
            exclude_discrete_tests: None,
            default_image_project: DEFAULT_IMAGE_PROJECT.to_owned(),
            step_timeout: None,
            instance_api: InstanceApi::default(),
        })
    }

    /// 스위트 필터를 설정합니다.
    pub fn with_filter(mut self, filter: SuiteFilter) -> Self {
        self.filter = filter;
        self
    }

    /// 개별 테스트 제외 패턴을 설정합니다.
    pub fn with_exclude_discrete_tests(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.exclude_discrete_tests = (!pattern.is_empty()).then_some(pattern);
        self
    }

    /// 짧은 이미지 이름을 해석할 기본 프로젝트를 설정합니다.
    pub fn with_default_image_project(mut self, project: impl Into<String>) -> Self {
        self.default_image_project = project.into();
        self
    }

    /// 스텝별 타임아웃을 설정합니다.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// 새 VM의 인스턴스 스키마를 지정합니다.
    pub fn with_instance_api(mut self, api: InstanceApi) -> Self {
        self.instance_api = api;
        self
    }

    /// 실행 ID를 고정합니다. (재현 가능한 출력 경로용)
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn filter(&self) -> &SuiteFilter {
        &self.filter
    }

    pub fn exclude_discrete_tests(&self) -> Option<&str> {
        self.exclude_discrete_tests.as_deref()
    }

    pub fn default_image_project(&self) -> &str {
        &self.default_image_project
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout
    }

    pub fn instance_api(&self) -> InstanceApi {
        self.instance_api
    }

    /// 다음 zone을 라운드로빈으로 배정합니다.
    pub fn next_zone(&self) -> String {
        self.zones.next()
    }

    /// 다음 테스트 프로젝트를 라운드로빈으로 배정합니다.
    pub fn next_test_project(&self) -> String {
        self.test_projects.next()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn zones(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let rr = RoundRobin::new("zone", zones(&["a-1", "b-1", "c-1"])).unwrap();
        let picked: Vec<_> = (0..7).map(|_| rr.next()).collect();
        assert_eq!(picked, ["a-1", "b-1", "c-1", "a-1", "b-1", "c-1", "a-1"]);
    }

    #[test]
    fn round_robin_rejects_empty_list() {
        let err = RoundRobin::new("zone", zones(&["", "  "])).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidOption { field: "zone", .. }));
    }

    #[test]
    fn round_robin_is_fair_across_threads() {
        let rr = Arc::new(RoundRobin::new("zone", zones(&["a", "b"])).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rr = Arc::clone(&rr);
                std::thread::spawn(move || (0..50).map(|_| rr.next()).collect::<Vec<_>>())
            })
            .collect();
        let all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(all.iter().filter(|z| *z == "a").count(), 100);
        assert_eq!(all.iter().filter(|z| *z == "b").count(), 100);
    }

    #[test]
    fn empty_test_projects_fall_back_to_project() {
        let ctx = RunContext::new("main", zones(&["us-central1-a"]), Vec::new()).unwrap();
        assert_eq!(ctx.next_test_project(), "main");
        assert_eq!(ctx.next_test_project(), "main");
    }

    #[test]
    fn empty_project_is_rejected() {
        assert!(RunContext::new("", zones(&["us-central1-a"]), Vec::new()).is_err());
    }

    #[test]
    fn run_id_is_unique_per_context() {
        let a = RunContext::new("p", zones(&["z-a"]), Vec::new()).unwrap();
        let b = RunContext::new("p", zones(&["z-a"]), Vec::new()).unwrap();
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.with_run_id("fixed").run_id(), "fixed");
    }

    #[test]
    fn empty_exclude_pattern_is_ignored() {
        let ctx = RunContext::new("p", zones(&["z-a"]), Vec::new())
            .unwrap()
            .with_exclude_discrete_tests("");
        assert!(ctx.exclude_discrete_tests().is_none());
    }
}

//! 스위트 레지스트리와 워크플로 구성
//!
//! 스위트는 등록 순서대로, 이미지는 입력 순서대로 조합되어
//! `{suite}-{image}` 이름의 워크플로가 만들어집니다. 구성 중 첫 번째 에러에서
//! 즉시 중단하며, 이 경우 어떤 워크플로도 실행되지 않습니다.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use imagetest_graph::vm::EXCLUDE_DISCRETE_TESTS_METADATA;
use imagetest_graph::{GraphError, Workflow};

use crate::context::RunContext;
use crate::error::SchedulerError;

/// 스위트 셋업 콜백
pub type SetupFn = dyn Fn(&mut Workflow) -> Result<(), GraphError> + Send + Sync;

/// 등록된 테스트 스위트
#[derive(Clone)]
pub struct TestSuite {
    name: String,
    setup: Arc<SetupFn>,
}

impl TestSuite {
    pub fn new<F>(name: impl Into<String>, setup: F) -> Self
    where
        F: Fn(&mut Workflow) -> Result<(), GraphError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            setup: Arc::new(setup),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 셋업 콜백을 워크플로에 적용합니다.
    pub fn setup(&self, workflow: &mut Workflow) -> Result<(), GraphError> {
        (self.setup)(workflow)
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite").field("name", &self.name).finish()
    }
}

/// 등록 순서를 보존하는 스위트 목록
#[derive(Debug, Clone, Default)]
pub struct SuiteRegistry {
    suites: Vec<TestSuite>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 스위트를 등록합니다. 같은 이름은 중복 등록할 수 없습니다.
    pub fn register<F>(&mut self, name: &str, setup: F) -> Result<(), SchedulerError>
    where
        F: Fn(&mut Workflow) -> Result<(), GraphError> + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(SchedulerError::InvalidOption {
                field: "suite",
                reason: "suite name must not be empty".to_owned(),
            });
        }
        if self.suites.iter().any(|s| s.name == name) {
            return Err(SchedulerError::InvalidOption {
                field: "suite",
                reason: format!("suite '{name}' is already registered"),
            });
        }
        self.suites.push(TestSuite::new(name, setup));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestSuite> {
        self.suites.iter()
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

/// 스위트 이름 include/exclude 필터
#[derive(Debug, Clone, Default)]
pub struct SuiteFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

fn compile(kind: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, SchedulerError> {
    match pattern.filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| SchedulerError::InvalidFilter {
                kind,
                pattern: p.to_owned(),
                reason: e.to_string(),
            }),
    }
}

impl SuiteFilter {
    /// 필터를 생성합니다. 빈 패턴은 조건 없음으로 취급합니다.
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self, SchedulerError> {
        Ok(Self {
            include: compile("include", include)?,
            exclude: compile("exclude", exclude)?,
        })
    }

    /// 스위트가 실행 대상인지 확인합니다. exclude가 include보다 우선합니다.
    pub fn matches(&self, suite: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(suite)) {
            return false;
        }
        self.include.as_ref().is_none_or(|re| re.is_match(suite))
    }
}

/// 해석된 이미지 참조
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// 전체 경로 (`projects/{project}/global/images/...`)
    pub path: String,
    /// 워크플로 이름에 쓰이는 짧은 이름
    pub short_name: String,
}

fn is_resource_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_lowercase()
                && (last.is_ascii_lowercase() || last.is_ascii_digit())
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        }
        _ => false,
    }
}

/// 이미지 참조를 해석합니다.
///
/// - `projects/p/global/images/name`
/// - `projects/p/global/images/family/name`
/// - `name` (기본 이미지 프로젝트 기준)
///
/// API URL 접두사(`https://.../projects/...`)는 제거됩니다.
pub fn resolve_image(reference: &str, default_project: &str) -> Result<ImageRef, SchedulerError> {
    let invalid = || SchedulerError::InvalidImage(reference.to_owned());
    let reference = reference.trim();
    let path = match reference.find("projects/") {
        Some(start) => &reference[start..],
        None => {
            if !is_resource_name(reference) || !is_resource_name(default_project) {
                return Err(invalid());
            }
            return Ok(ImageRef {
                path: format!("projects/{default_project}/global/images/{reference}"),
                short_name: reference.to_owned(),
            });
        }
    };

    let segments: Vec<&str> = path.split('/').collect();
    let short_name = match segments.as_slice() {
        ["projects", project, "global", "images", name]
        | ["projects", project, "global", "images", "family", name]
            if !project.is_empty() && is_resource_name(name) =>
        {
            (*name).to_owned()
        }
        _ => return Err(invalid()),
    };
    Ok(ImageRef {
        path: path.to_owned(),
        short_name,
    })
}

/// 등록된 스위트 x 이미지 조합으로 워크플로를 구성합니다.
///
/// 필터에 걸리지 않은 스위트만 대상이며, 첫 번째 구성 에러에서 중단합니다.
pub fn build_workflows(
    ctx: &RunContext,
    registry: &SuiteRegistry,
    images: &[String],
) -> Result<Vec<Workflow>, SchedulerError> {
    let images = images
        .iter()
        .map(|image| resolve_image(image, ctx.default_image_project()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    for image in &images {
        if !seen.insert(image.short_name.as_str()) {
            return Err(SchedulerError::InvalidOption {
                field: "images",
                reason: format!("image '{}' is listed more than once", image.short_name),
            });
        }
    }

    let mut workflows = Vec::new();
    for suite in registry.iter() {
        if !ctx.filter().matches(suite.name()) {
            debug!(suite = %suite.name(), "suite filtered out");
            continue;
        }
        for image in &images {
            let name = format!("{}-{}", suite.name(), image.short_name);
            let zone = ctx.next_zone();
            let project = ctx.next_test_project();
            let mut workflow = Workflow::new(&name, &image.path, project, zone)
                .map_err(|source| SchedulerError::Setup {
                    workflow: name.clone(),
                    source,
                })?
                .with_instance_api(ctx.instance_api());
            if let Some(timeout) = ctx.step_timeout() {
                workflow.set_default_timeout(timeout);
            }

            suite
                .setup(&mut workflow)
                .map_err(|source| SchedulerError::Setup {
                    workflow: name.clone(),
                    source,
                })?;
            if let Some(pattern) = ctx.exclude_discrete_tests() {
                workflow.add_metadata_to_all_vms(EXCLUDE_DISCRETE_TESTS_METADATA, pattern);
            }
            workflow
                .validate()
                .map_err(|source| SchedulerError::Setup {
                    workflow: name.clone(),
                    source,
                })?;

            debug!(
                workflow = %name,
                zone = %workflow.zone(),
                project = %workflow.project(),
                steps = workflow.graph().len(),
                "workflow built"
            );
            workflows.push(workflow);
        }
    }

    info!(
        workflows = workflows.len(),
        suites = registry.len(),
        images = images.len(),
        "workflows constructed"
    );
    Ok(workflows)
}

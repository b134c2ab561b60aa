//! 스텝 그래프 -- 이름으로 색인된 스텝과 의존성 맵, 단조 증가 카운터
//!
//! 의존성은 `스텝 -> 선행 스텝 집합` 방향으로 저장합니다.
//! `BTreeMap`/`BTreeSet`을 사용하므로 순회와 렌더링 결과가 결정적입니다.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::GraphError;
use crate::step::Step;

/// 워크플로 하나의 스텝/의존성 그래프
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    steps: BTreeMap<String, Step>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    counter: u32,
}

impl StepGraph {
    /// 빈 그래프를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 카운터 값
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// 다음 연산이 사용할 카운터 값 (증가시키지 않음)
    pub fn peek_counter(&self) -> u32 {
        self.counter.saturating_add(1)
    }

    /// 카운터를 1 증가시키고 새 값을 반환합니다.
    pub fn advance_counter(&mut self) -> u32 {
        self.counter = self.peek_counter();
        self.counter
    }

    /// 스텝 존재 여부
    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// 스텝 조회
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub(crate) fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.steps.get_mut(name)
    }

    /// 이름 순서의 스텝 순회
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// 스텝 수
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 스텝의 선행 스텝 집합
    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(name)
    }

    /// `step`이 `on`에 직접 의존하는지 확인합니다.
    pub fn depends_on(&self, step: &str, on: &str) -> bool {
        self.dependencies
            .get(step)
            .is_some_and(|deps| deps.contains(on))
    }

    /// 전체 의존성 맵
    pub fn dependencies(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.dependencies
    }

    /// 주어진 이름들이 모두 비어 있는지 확인합니다.
    ///
    /// 여러 스텝을 삽입하는 연산은 변경 전에 이 검사를 먼저 수행합니다.
    pub fn ensure_absent<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), GraphError> {
        for name in names {
            if self.contains(name) {
                return Err(GraphError::Duplicate {
                    kind: "step",
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// 스텝을 삽입합니다. 같은 이름이 있으면 에러를 반환합니다.
    pub fn add_step(&mut self, step: Step) -> Result<(), GraphError> {
        self.ensure_absent([step.name.as_str()])?;
        self.steps.insert(step.name.clone(), step);
        Ok(())
    }

    /// 의존성 간선을 추가합니다. 두 스텝 모두 존재해야 합니다.
    ///
    /// 이미 있는 간선은 무시됩니다.
    pub fn add_dependency(&mut self, step: &str, on: &str) -> Result<(), GraphError> {
        for name in [step, on] {
            if !self.contains(name) {
                return Err(GraphError::UnknownStep(name.to_owned()));
            }
        }
        self.dependencies
            .entry(step.to_owned())
            .or_default()
            .insert(on.to_owned());
        Ok(())
    }

    /// 모든 의존성이 존재하는 스텝을 가리키고 순환이 없는지 검사합니다.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.topological_order().map(|_| ())
    }

    /// 위상 정렬 순서를 반환합니다. (Kahn 알고리즘, 동순위는 이름 순)
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.steps.keys().map(|name| (name.as_str(), 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (step, deps) in &self.dependencies {
            if !self.steps.contains_key(step) {
                return Err(GraphError::UnknownStep(step.clone()));
            }
            for dep in deps {
                if !self.steps.contains_key(dep) {
                    return Err(GraphError::UnknownStep(dep.clone()));
                }
                *in_degree.entry(step.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(step.as_str());
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());

        while let Some(name) = ready.pop_front() {
            order.push(name.to_owned());
            if let Some(children) = dependents.get(name) {
                for &child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(child);
                        }
                    }
                }
            }
        }

        if order.len() != self.steps.len() {
            let stuck = in_degree
                .iter()
                .find(|(_, degree)| **degree > 0)
                .map(|(name, _)| (*name).to_owned())
                .unwrap_or_default();
            return Err(GraphError::Cycle(stuck));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    fn stop(name: &str) -> Step {
        Step::new(name, 0, StepKind::StopInstances(vec!["vm".to_owned()]))
    }

    #[test]
    fn duplicate_step_is_rejected() {
        let mut graph = StepGraph::new();
        graph.add_step(stop("a")).unwrap();
        let err = graph.add_step(stop("a")).unwrap_err();
        assert!(matches!(err, GraphError::Duplicate { kind: "step", .. }));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn dependency_requires_existing_steps() {
        let mut graph = StepGraph::new();
        graph.add_step(stop("a")).unwrap();
        assert!(matches!(
            graph.add_dependency("a", "missing"),
            Err(GraphError::UnknownStep(_))
        ));
        assert!(graph.dependencies_of("a").is_none());
    }

    #[test]
    fn counter_advances_monotonically() {
        let mut graph = StepGraph::new();
        assert_eq!(graph.peek_counter(), 1);
        assert_eq!(graph.advance_counter(), 1);
        assert_eq!(graph.advance_counter(), 2);
        assert_eq!(graph.counter(), 2);
    }

    #[test]
    fn topological_order_respects_edges() {
        let mut graph = StepGraph::new();
        for name in ["c", "b", "a"] {
            graph.add_step(stop(name)).unwrap();
        }
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "c").unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut graph = StepGraph::new();
        graph.add_step(stop("a")).unwrap();
        graph.add_step(stop("b")).unwrap();
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "a").unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn ensure_absent_reports_first_collision() {
        let mut graph = StepGraph::new();
        graph.add_step(stop("b")).unwrap();
        let err = graph.ensure_absent(["a", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "duplicate step 'b'");
    }
}

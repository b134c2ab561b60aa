//! 워크플로 문서 -- 외부 실행 엔진에 넘기는 JSON 표현
//!
//! ```text
//! {
//!   "Name": "...", "Project": "...", "Zone": "...", "DefaultTimeout": "2700s",
//!   "Steps": { "create-vms": { "CreateInstances": { "Instances": [...] } }, ... },
//!   "Dependencies": { "create-vms": ["create-disks"], ... }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::GraphError;
use crate::instance::InstanceApi;
use crate::step::{Step, StepKind, WaitMode, WaitSignal};
use crate::workflow::Workflow;

/// 엔진에 전달되는 워크플로 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkflowDocument {
    /// 워크플로 이름
    pub name: String,
    /// 프로젝트
    pub project: String,
    /// zone
    pub zone: String,
    /// 스텝 기본 타임아웃 (예: `2700s`)
    pub default_timeout: String,
    /// 스텝 이름 -> `{타입: 페이로드}`
    pub steps: BTreeMap<String, Value>,
    /// 스텝 이름 -> 선행 스텝 목록
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl WorkflowDocument {
    /// 사람이 읽기 좋은 JSON 문자열로 직렬화합니다.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 스텝 수
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl Workflow {
    /// 그래프를 검증한 뒤 엔진 문서로 렌더링합니다.
    pub fn to_document(&self) -> Result<WorkflowDocument, GraphError> {
        self.validate()?;
        let steps = self
            .graph()
            .steps()
            .map(|step| (step.name.clone(), self.render_step(step)))
            .collect();
        let dependencies = self
            .graph()
            .dependencies()
            .iter()
            .filter(|(_, deps)| !deps.is_empty())
            .map(|(step, deps)| (step.clone(), deps.iter().cloned().collect()))
            .collect();
        Ok(WorkflowDocument {
            name: self.name().to_owned(),
            project: self.project().to_owned(),
            zone: self.zone().to_owned(),
            default_timeout: format!("{}s", self.default_timeout().as_secs()),
            steps,
            dependencies,
        })
    }

    fn render_step(&self, step: &Step) -> Value {
        let payload = match &step.kind {
            StepKind::WaitForAvailableQuota(quotas) => {
                let quotas: Vec<Value> = quotas
                    .requests()
                    .into_iter()
                    .map(|q| json!({ "Metric": q.metric, "Region": q.region, "Units": q.units }))
                    .collect();
                json!({ "Quotas": quotas })
            }
            StepKind::CreateNetworks(networks) => json!(networks),
            StepKind::CreateSubnetworks(subnetworks) => json!(subnetworks),
            StepKind::CreateDisks(disks) => json!(disks),
            StepKind::CreateInstances(names) => self.render_instances(names),
            StepKind::WaitForInstancesSignal(signals) => {
                Value::Array(signals.iter().map(render_signal).collect())
            }
            StepKind::StopInstances(names)
            | StepKind::StartInstances(names)
            | StepKind::ResumeInstances(names) => json!({ "Instances": names }),
            StepKind::ResizeDisks(resizes) => json!(resizes),
            StepKind::DetachDisks(detaches) => json!(detaches),
        };
        let mut object = serde_json::Map::new();
        object.insert(step.kind.type_name().to_owned(), payload);
        Value::Object(object)
    }

    fn render_instances(&self, names: &[String]) -> Value {
        let mut stable = Vec::new();
        let mut preview = Vec::new();
        for vm in names.iter().filter_map(|name| self.vm_spec(name)) {
            let instance = vm.instance();
            match instance.api() {
                InstanceApi::Stable => stable.push(instance.to_document()),
                InstanceApi::Preview => preview.push(instance.to_document()),
            }
        }
        let mut payload = serde_json::Map::new();
        if !stable.is_empty() {
            payload.insert("Instances".to_owned(), Value::Array(stable));
        }
        if !preview.is_empty() {
            payload.insert("InstancesBeta".to_owned(), Value::Array(preview));
        }
        Value::Object(payload)
    }
}

fn render_signal(signal: &WaitSignal) -> Value {
    match &signal.mode {
        WaitMode::GuestAttribute { namespace, key } => json!({
            "Name": signal.instance,
            "GuestAttribute": { "Namespace": namespace, "KeyName": key },
        }),
        WaitMode::Status(status) => json!({
            "Name": signal.instance,
            "Status": status,
        }),
    }
}

//! 워크플로 빌더 -- (스위트, 이미지) 한 쌍의 리소스 그래프
//!
//! [`Workflow`]는 셋업 단계에서 단일 스레드로 구성되고, 완성 후에는 스케줄러에
//! 읽기 전용으로 전달됩니다.
//!
//! # 공유 스텝
//!
//! 워크플로 안의 모든 VM은 하나의 `create-disks`와 하나의 `create-vms` 스텝을
//! 공유하며, VM이 추가될 때마다 두 스텝의 페이로드가 확장됩니다.
//! 공유 스텝 사이의 의존성은 두 스텝이 모두 존재하는 순간 연결되므로
//! 네트워크와 VM의 생성 순서와 무관합니다.
//!
//! ```text
//! wait-for-quota ──▶ create-disks ──▶ create-vms ──▶ wait-{vm} ──▶ ...
//!                                      ▲   ▲
//! create-networks ──▶ create-sub-networks  │
//!        └────────────────────────────────┘
//! ```
//!
//! # 사용 예시
//! ```
//! use imagetest_graph::Workflow;
//!
//! let mut wf = Workflow::new("hostname-debian-12", "debian-12", "my-project", "us-central1-a")?;
//! wf.create_vm("vm1")?.reboot()?;
//! assert_eq!(wf.last_step_for_vm("vm1")?, "wait-vm1-1");
//! # Ok::<(), imagetest_graph::GraphError>(())
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;

use crate::error::GraphError;
use crate::graph::StepGraph;
use crate::instance::{AttachedDisk, DiskKind, InstanceApi, new_instance};
use crate::network::{Network, Subnetwork, region_from_zone, validate_region};
use crate::quota::{QuotaRequest, QuotaSet};
use crate::step::{
    CREATE_DISKS_STEP, CREATE_NETWORKS_STEP, CREATE_SUBNETWORKS_STEP, CREATE_VMS_STEP,
    DEFAULT_RESULT_KEY, DiskDetach, DiskSpec, Step, StepKind, WaitSignal, initial_wait_name,
    vm_step_name,
};
use crate::vm::{Vm, VmHandle};

/// 스텝 기본 타임아웃 (45분)
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(45 * 60);

/// 존재할 때마다 연결되는 공유 스텝 간선 `(스텝, 선행 스텝)`
const SHARED_EDGES: [(&str, &str); 4] = [
    (CREATE_SUBNETWORKS_STEP, CREATE_NETWORKS_STEP),
    (CREATE_VMS_STEP, CREATE_NETWORKS_STEP),
    (CREATE_VMS_STEP, CREATE_SUBNETWORKS_STEP),
    (CREATE_VMS_STEP, CREATE_DISKS_STEP),
];

/// 쿼터 대기 스텝에 의존하는 공유 스텝
const QUOTA_GATED_STEPS: [&str; 2] = [CREATE_DISKS_STEP, CREATE_VMS_STEP];

/// VM 생성 시 템플릿 오버라이드
#[derive(Debug, Clone, Default)]
pub struct InstanceOverrides {
    /// 인스턴스 스키마 (미지정 시 워크플로 기본값)
    pub api: Option<InstanceApi>,
    /// 머신 타입
    pub machine_type: Option<String>,
    /// zone
    pub zone: Option<String>,
}

/// (스위트, 이미지) 한 쌍의 리소스 그래프
#[derive(Debug)]
pub struct Workflow {
    name: String,
    image: String,
    project: String,
    zone: String,
    region: String,
    default_timeout: Duration,
    instance_api: InstanceApi,
    pub(crate) graph: StepGraph,
    pub(crate) vms: Vec<Vm>,
    quota_steps: BTreeSet<String>,
}

impl Workflow {
    /// 새 워크플로를 생성합니다. zone에서 region을 유도할 수 없으면 에러를 반환합니다.
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        project: impl Into<String>,
        zone: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "workflow name must not be empty".to_owned(),
            ));
        }
        let zone = zone.into();
        let region = region_from_zone(&zone)?;
        Ok(Self {
            name,
            image: image.into(),
            project: project.into(),
            zone,
            region,
            default_timeout: DEFAULT_STEP_TIMEOUT,
            instance_api: InstanceApi::default(),
            graph: StepGraph::new(),
            vms: Vec::new(),
            quota_steps: BTreeSet::new(),
        })
    }

    /// 새로 생성되는 VM의 기본 인스턴스 스키마를 지정합니다.
    pub fn with_instance_api(mut self, api: InstanceApi) -> Self {
        self.instance_api = api;
        self
    }

    /// 워크플로 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 이미지 참조
    pub fn image(&self) -> &str {
        &self.image
    }

    /// 프로젝트
    pub fn project(&self) -> &str {
        &self.project
    }

    /// zone
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// zone에서 유도된 region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// 스텝 기본 타임아웃
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// 스텝 기본 타임아웃을 설정합니다.
    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    /// 스텝 그래프
    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// 등록 순서의 VM 목록
    pub fn vms(&self) -> impl Iterator<Item = &Vm> {
        self.vms.iter()
    }

    /// 이름으로 VM을 조회합니다.
    pub fn vm_spec(&self, name: &str) -> Option<&Vm> {
        self.vms.iter().find(|vm| vm.name() == name)
    }

    fn vm_index(&self, name: &str) -> Result<usize, GraphError> {
        self.vms
            .iter()
            .position(|vm| vm.name() == name)
            .ok_or_else(|| GraphError::UnknownVm(name.to_owned()))
    }

    /// 기존 VM의 변경 핸들을 반환합니다.
    pub fn vm(&mut self, name: &str) -> Result<VmHandle<'_>, GraphError> {
        let index = self.vm_index(name)?;
        Ok(VmHandle::new(self, index))
    }

    /// VM의 마지막 스텝 이름을 반환합니다.
    pub fn last_step_for_vm(&self, name: &str) -> Result<&str, GraphError> {
        self.vm_spec(name)
            .map(Vm::last_step)
            .ok_or_else(|| GraphError::UnknownVm(name.to_owned()))
    }

    /// 워크플로 이미지로 부팅하는 VM을 생성합니다. 부트 디스크 이름은 VM 이름과 같습니다.
    pub fn create_vm(&mut self, name: &str) -> Result<VmHandle<'_>, GraphError> {
        self.create_vm_multiple_disks(vec![DiskSpec::new(name)], InstanceOverrides::default())
    }

    /// 여러 디스크를 가진 VM을 생성합니다.
    ///
    /// 첫 번째 디스크가 부트 디스크이며 VM 이름이 됩니다. 부트 디스크에 원본 이미지가
    /// 없으면 워크플로 이미지를 사용합니다. 나머지 디스크는 순서대로 연결됩니다.
    pub fn create_vm_multiple_disks(
        &mut self,
        disks: Vec<DiskSpec>,
        overrides: InstanceOverrides,
    ) -> Result<VmHandle<'_>, GraphError> {
        let Some(boot) = disks.first() else {
            return Err(GraphError::InvalidArgument(
                "a vm requires at least one disk".to_owned(),
            ));
        };
        let name = boot.name.clone();
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "vm name must not be empty".to_owned(),
            ));
        }
        if self.vm_index(&name).is_ok() {
            return Err(GraphError::Duplicate { kind: "vm", name });
        }
        let mut seen = BTreeSet::new();
        for disk in &disks {
            if !seen.insert(disk.name.as_str()) || self.has_disk(&disk.name) {
                return Err(GraphError::Duplicate {
                    kind: "disk",
                    name: disk.name.clone(),
                });
            }
        }
        if let Some(zone) = &overrides.zone {
            region_from_zone(zone)?;
        }
        let wait = initial_wait_name(&name);
        self.graph.ensure_absent([wait.as_str()])?;

        let mut disks = disks;
        if let Some(boot) = disks.first_mut() {
            boot.source_image.get_or_insert_with(|| self.image.clone());
        }

        let mut instance = new_instance(overrides.api.unwrap_or(self.instance_api), &name);
        for (index, disk) in disks.iter().enumerate() {
            let attached = if index == 0 {
                AttachedDisk::boot(&disk.name)
            } else {
                AttachedDisk::secondary(&disk.name, DiskKind::Persistent)
            };
            instance.disks_mut().push(attached);
        }
        if let Some(machine_type) = &overrides.machine_type {
            instance.set_machine_type(machine_type);
        }
        if let Some(zone) = &overrides.zone {
            instance.set_zone(zone);
        }

        self.extend_disks(disks)?;
        self.ensure_shared_step(CREATE_VMS_STEP, || StepKind::CreateInstances(Vec::new()))?;
        if let Some(Step {
            kind: StepKind::CreateInstances(instances),
            ..
        }) = self.graph.step_mut(CREATE_VMS_STEP)
        {
            instances.push(name.clone());
        }

        self.insert_step(
            wait.clone(),
            StepKind::WaitForInstancesSignal(vec![WaitSignal::guest_attribute(
                &name,
                DEFAULT_RESULT_KEY,
            )]),
            &[CREATE_VMS_STEP],
        )?;
        self.wire_shared_dependencies()?;

        debug!(workflow = %self.name, vm = %name, "vm created");
        self.vms
            .push(Vm::new(name, instance, CREATE_VMS_STEP.to_owned(), wait));
        let index = self.vms.len() - 1;
        Ok(VmHandle::new(self, index))
    }

    /// 기존 VM의 부트 디스크로 새 VM을 파생합니다.
    ///
    /// 원본 VM을 정지하고 부트 디스크를 분리한 뒤, 분리된 디스크로 전용
    /// `create-{new}-{counter}` 스텝에서 새 VM을 생성합니다.
    pub fn create_derivative_vm(
        &mut self,
        source: &str,
        new_name: &str,
    ) -> Result<VmHandle<'_>, GraphError> {
        let source_index = self.vm_index(source)?;
        if new_name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "vm name must not be empty".to_owned(),
            ));
        }
        if self.vm_index(new_name).is_ok() {
            return Err(GraphError::Duplicate {
                kind: "vm",
                name: new_name.to_owned(),
            });
        }
        let boot = self.vms[source_index]
            .instance()
            .disks()
            .first()
            .cloned()
            .ok_or_else(|| GraphError::Precondition(format!("vm '{source}' has no boot disk")))?;

        let counter = self.graph.peek_counter();
        let stop = vm_step_name("stop", source, counter);
        let detach = vm_step_name("detach", source, counter);
        let create = vm_step_name("create", new_name, counter);
        let wait = initial_wait_name(new_name);
        self.graph.ensure_absent([
            stop.as_str(),
            detach.as_str(),
            create.as_str(),
            wait.as_str(),
        ])?;

        self.graph.advance_counter();
        let anchor = self.vms[source_index].last_step().to_owned();

        self.insert_step(
            stop.clone(),
            StepKind::StopInstances(vec![source.to_owned()]),
            &[anchor.as_str()],
        )?;
        self.insert_step(
            detach.clone(),
            StepKind::DetachDisks(vec![DiskDetach {
                instance: source.to_owned(),
                device_name: boot.source.clone(),
            }]),
            &[stop.as_str()],
        )?;
        self.insert_step(
            create.clone(),
            StepKind::CreateInstances(vec![new_name.to_owned()]),
            &[detach.as_str()],
        )?;
        self.insert_step(
            wait.clone(),
            StepKind::WaitForInstancesSignal(vec![WaitSignal::guest_attribute(
                new_name,
                DEFAULT_RESULT_KEY,
            )]),
            &[create.as_str()],
        )?;

        let derived = self.vms[source_index].derive(new_name, boot, create, wait);
        self.vms[source_index].finish_operation(detach);
        debug!(workflow = %self.name, source, vm = %new_name, "derivative vm created");

        self.vms.push(derived);
        let index = self.vms.len() - 1;
        Ok(VmHandle::new(self, index))
    }

    /// 네트워크를 생성합니다.
    pub fn create_network(
        &mut self,
        name: &str,
        auto_create_subnetworks: bool,
    ) -> Result<(), GraphError> {
        self.create_network_from_spec(Network::new(name, auto_create_subnetworks))
    }

    /// 네트워크 정의로 네트워크를 생성합니다.
    pub fn create_network_from_spec(&mut self, network: Network) -> Result<(), GraphError> {
        if network.name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "network name must not be empty".to_owned(),
            ));
        }
        if self.network(&network.name).is_some() {
            return Err(GraphError::Duplicate {
                kind: "network",
                name: network.name,
            });
        }
        self.ensure_shared_step(CREATE_NETWORKS_STEP, || StepKind::CreateNetworks(Vec::new()))?;
        debug!(workflow = %self.name, network = %network.name, "network created");
        if let Some(Step {
            kind: StepKind::CreateNetworks(networks),
            ..
        }) = self.graph.step_mut(CREATE_NETWORKS_STEP)
        {
            networks.push(network);
        }
        self.wire_shared_dependencies()
    }

    /// 서브네트워크를 생성합니다.
    ///
    /// 소속 네트워크가 이 워크플로에 있어야 하며, region이 비어 있으면
    /// 워크플로 zone의 region을 사용합니다.
    pub fn create_subnetwork(&mut self, subnetwork: Subnetwork) -> Result<(), GraphError> {
        if subnetwork.name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "subnetwork name must not be empty".to_owned(),
            ));
        }
        if self.network(&subnetwork.network).is_none() {
            return Err(GraphError::UnknownNetwork(subnetwork.network));
        }
        if self.subnetwork(&subnetwork.name).is_some() {
            return Err(GraphError::Duplicate {
                kind: "subnetwork",
                name: subnetwork.name,
            });
        }
        let mut subnetwork = subnetwork;
        if subnetwork.region.is_empty() {
            subnetwork.region.clone_from(&self.region);
        } else {
            validate_region(&subnetwork.region)?;
        }

        self.ensure_shared_step(CREATE_SUBNETWORKS_STEP, || {
            StepKind::CreateSubnetworks(Vec::new())
        })?;
        debug!(
            workflow = %self.name,
            subnetwork = %subnetwork.name,
            network = %subnetwork.network,
            "subnetwork created"
        );
        if let Some(Step {
            kind: StepKind::CreateSubnetworks(subnetworks),
            ..
        }) = self.graph.step_mut(CREATE_SUBNETWORKS_STEP)
        {
            subnetworks.push(subnetwork);
        }
        self.wire_shared_dependencies()
    }

    /// 이름으로 네트워크를 조회합니다.
    pub fn network(&self, name: &str) -> Option<&Network> {
        match self.graph.step(CREATE_NETWORKS_STEP).map(|s| &s.kind) {
            Some(StepKind::CreateNetworks(networks)) => networks.iter().find(|n| n.name == name),
            _ => None,
        }
    }

    /// 이름으로 서브네트워크를 조회합니다.
    pub fn subnetwork(&self, name: &str) -> Option<&Subnetwork> {
        match self.graph.step(CREATE_SUBNETWORKS_STEP).map(|s| &s.kind) {
            Some(StepKind::CreateSubnetworks(subnetworks)) => {
                subnetworks.iter().find(|s| s.name == name)
            }
            _ => None,
        }
    }

    /// 네트워크가 하나라도 생성되었는지 확인합니다.
    pub fn has_networks(&self) -> bool {
        self.graph.contains(CREATE_NETWORKS_STEP)
    }

    /// 쿼터 요청을 대기 스텝에 병합합니다.
    ///
    /// 같은 이름의 대기 스텝이 있으면 `(metric, region)` 키로 병합하고, 없으면
    /// 새 대기 스텝을 만들어 디스크/인스턴스 생성 스텝의 선행 스텝으로 연결합니다.
    pub fn wait_for_quota(
        &mut self,
        request: QuotaRequest,
        step_name: &str,
    ) -> Result<(), GraphError> {
        if request.metric.is_empty() {
            return Err(GraphError::InvalidArgument(
                "quota metric must not be empty".to_owned(),
            ));
        }
        if request.units == 0 {
            return Err(GraphError::InvalidArgument(format!(
                "quota request for '{}' must ask for at least one unit",
                request.metric
            )));
        }
        validate_region(&request.region)?;

        match self.graph.step_mut(step_name) {
            Some(Step {
                kind: StepKind::WaitForAvailableQuota(quotas),
                ..
            }) => {
                quotas.insert(request);
                Ok(())
            }
            Some(_) => Err(GraphError::InvalidArgument(format!(
                "step '{step_name}' is not a quota wait"
            ))),
            None => {
                let mut quotas = QuotaSet::new();
                quotas.insert(request);
                self.insert_step(
                    step_name.to_owned(),
                    StepKind::WaitForAvailableQuota(quotas),
                    &[],
                )?;
                self.quota_steps.insert(step_name.to_owned());
                self.wire_shared_dependencies()
            }
        }
    }

    /// 모든 VM에 메타데이터를 추가합니다.
    pub fn add_metadata_to_all_vms(&mut self, key: &str, value: &str) {
        for vm in &mut self.vms {
            vm.instance_mut().metadata_mut().upsert(key, value);
        }
    }

    /// VM의 게스트 신호 체크포인트를 카운터 순서로 반환합니다.
    pub fn vm_checkpoints(&self, name: &str) -> Vec<&Step> {
        let mut checkpoints: Vec<&Step> = self
            .graph
            .steps()
            .filter(|step| step.checkpoint_key(name).is_some())
            .collect();
        checkpoints.sort_by(|a, b| a.counter.cmp(&b.counter).then_with(|| a.name.cmp(&b.name)));
        checkpoints
    }

    /// 의존성이 모두 존재하는 스텝을 가리키고 순환이 없는지 검사합니다.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate()
    }

    /// 위상 정렬된 스텝 이름 목록
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        self.graph.topological_order()
    }

    /// 디스크 이름이 이미 사용 중인지 확인합니다.
    pub(crate) fn has_disk(&self, name: &str) -> bool {
        let created = match self.graph.step(CREATE_DISKS_STEP).map(|s| &s.kind) {
            Some(StepKind::CreateDisks(disks)) => disks.iter().any(|d| d.name == name),
            _ => false,
        };
        created
            || self
                .vms
                .iter()
                .any(|vm| vm.instance().disks().iter().any(|d| d.source == name))
    }

    /// 공유 `create-disks` 스텝에 디스크를 추가합니다.
    pub(crate) fn extend_disks(&mut self, disks: Vec<DiskSpec>) -> Result<(), GraphError> {
        self.ensure_shared_step(CREATE_DISKS_STEP, || StepKind::CreateDisks(Vec::new()))?;
        if let Some(Step {
            kind: StepKind::CreateDisks(existing),
            ..
        }) = self.graph.step_mut(CREATE_DISKS_STEP)
        {
            existing.extend(disks);
        }
        self.wire_shared_dependencies()
    }

    fn ensure_shared_step(
        &mut self,
        name: &str,
        kind: impl FnOnce() -> StepKind,
    ) -> Result<(), GraphError> {
        if self.graph.contains(name) {
            return Ok(());
        }
        let counter = self.graph.counter();
        self.graph.add_step(Step::new(name, counter, kind()))
    }

    /// 현재 카운터로 스텝을 삽입하고 선행 스텝을 연결합니다.
    pub(crate) fn insert_step(
        &mut self,
        name: String,
        kind: StepKind,
        depends_on: &[&str],
    ) -> Result<(), GraphError> {
        let counter = self.graph.counter();
        debug!(workflow = %self.name, step = %name, kind = %kind, counter, "step added");
        self.graph.add_step(Step::new(name.clone(), counter, kind))?;
        for dep in depends_on {
            self.graph.add_dependency(&name, dep)?;
        }
        Ok(())
    }

    fn wire_shared_dependencies(&mut self) -> Result<(), GraphError> {
        for (step, on) in SHARED_EDGES {
            if self.graph.contains(step) && self.graph.contains(on) {
                self.graph.add_dependency(step, on)?;
            }
        }
        for quota in &self.quota_steps {
            for step in QUOTA_GATED_STEPS {
                if self.graph.contains(step) {
                    self.graph.add_dependency(step, quota)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{FIRST_BOOT_RESULT_KEY, WAIT_FOR_QUOTA_STEP};

    fn workflow() -> Workflow {
        Workflow::new("suite-image", "debian-12", "project", "us-central1-a").unwrap()
    }

    #[test]
    fn new_rejects_zone_without_separator() {
        let err = Workflow::new("wf", "img", "p", "uscentral1").unwrap_err();
        assert!(matches!(err, GraphError::InvalidZone { .. }));
    }

    #[test]
    fn new_derives_region() {
        assert_eq!(workflow().region(), "us-central1");
    }

    #[test]
    fn create_vm_inserts_shared_steps_and_initial_wait() {
        let mut wf = workflow();
        wf.create_vm("vm1").unwrap();

        assert!(wf.graph().contains(CREATE_DISKS_STEP));
        assert!(wf.graph().contains(CREATE_VMS_STEP));
        assert!(wf.graph().depends_on(CREATE_VMS_STEP, CREATE_DISKS_STEP));
        assert!(wf.graph().depends_on("wait-vm1", CREATE_VMS_STEP));
        assert_eq!(wf.last_step_for_vm("vm1").unwrap(), "wait-vm1");

        match &wf.graph().step(CREATE_DISKS_STEP).unwrap().kind {
            StepKind::CreateDisks(disks) => {
                assert_eq!(disks.len(), 1);
                assert_eq!(disks[0].source_image.as_deref(), Some("debian-12"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn vms_share_one_create_step_pair() {
        let mut wf = workflow();
        wf.create_vm("vm1").unwrap();
        wf.create_vm("vm2").unwrap();

        let creates: Vec<_> = wf
            .graph()
            .steps()
            .filter(|s| matches!(s.kind, StepKind::CreateInstances(_)))
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(
            creates[0].kind,
            StepKind::CreateInstances(vec!["vm1".to_owned(), "vm2".to_owned()])
        );
    }

    #[test]
    fn duplicate_vm_is_rejected_without_mutation() {
        let mut wf = workflow();
        wf.create_vm("vm1").unwrap();
        let before = wf.graph().len();
        let err = wf.create_vm("vm1").unwrap_err();
        assert!(matches!(err, GraphError::Duplicate { kind: "vm", .. }));
        assert_eq!(wf.graph().len(), before);
    }

    #[test]
    fn multiple_disks_require_unique_names() {
        let mut wf = workflow();
        let err = wf
            .create_vm_multiple_disks(
                vec![DiskSpec::new("vm1"), DiskSpec::new("vm1")],
                InstanceOverrides::default(),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::Duplicate { kind: "disk", .. }));
        assert!(wf.graph().is_empty());
    }

    #[test]
    fn empty_disk_list_is_invalid() {
        let mut wf = workflow();
        assert!(matches!(
            wf.create_vm_multiple_disks(Vec::new(), InstanceOverrides::default()),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn overrides_apply_to_instance() {
        let mut wf = workflow();
        wf.create_vm_multiple_disks(
            vec![DiskSpec::new("vm1")],
            InstanceOverrides {
                api: Some(InstanceApi::Preview),
                machine_type: Some("c3-standard-4".to_owned()),
                zone: Some("us-east1-b".to_owned()),
            },
        )
        .unwrap();
        let vm = wf.vm_spec("vm1").unwrap();
        assert_eq!(vm.instance().api(), InstanceApi::Preview);
        assert_eq!(vm.instance().machine_type(), Some("c3-standard-4"));
        assert_eq!(vm.instance().zone(), Some("us-east1-b"));
    }

    #[test]
    fn invalid_zone_override_is_rejected() {
        let mut wf = workflow();
        let overrides = InstanceOverrides {
            zone: Some("nozone".to_owned()),
            ..InstanceOverrides::default()
        };
        assert!(
            wf.create_vm_multiple_disks(vec![DiskSpec::new("vm1")], overrides)
                .is_err()
        );
        assert!(wf.graph().is_empty());
    }

    #[test]
    fn subnetwork_requires_known_network() {
        let mut wf = workflow();
        let err = wf
            .create_subnetwork(Subnetwork::new("sub", "missing", "10.0.0.0/24"))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNetwork(_)));
    }

    #[test]
    fn subnetwork_region_defaults_to_workflow_region() {
        let mut wf = workflow();
        wf.create_network("net", false).unwrap();
        wf.create_subnetwork(Subnetwork::new("sub", "net", "10.0.0.0/24"))
            .unwrap();
        assert_eq!(wf.subnetwork("sub").unwrap().region, "us-central1");
        assert!(
            wf.graph()
                .depends_on(CREATE_SUBNETWORKS_STEP, CREATE_NETWORKS_STEP)
        );
    }

    #[test]
    fn subnetwork_with_malformed_region_is_rejected() {
        let mut wf = workflow();
        wf.create_network("net", false).unwrap();
        let err = wf
            .create_subnetwork(Subnetwork::new("sub", "net", "10.0.0.0/24").with_region("central"))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidRegion(_)));
        assert!(wf.subnetwork("sub").is_none());
    }

    #[test]
    fn duplicate_network_is_rejected() {
        let mut wf = workflow();
        wf.create_network("net", true).unwrap();
        assert!(matches!(
            wf.create_network("net", false),
            Err(GraphError::Duplicate { kind: "network", .. })
        ));
    }

    #[test]
    fn quota_requests_merge_into_one_step() {
        let mut wf = workflow();
        wf.wait_for_quota(QuotaRequest::new("CPUS", "us-central1", 2), WAIT_FOR_QUOTA_STEP)
            .unwrap();
        wf.wait_for_quota(QuotaRequest::new("CPUS", "us-central1", 1), WAIT_FOR_QUOTA_STEP)
            .unwrap();
        wf.wait_for_quota(QuotaRequest::new("GPUS", "us-central1", 1), WAIT_FOR_QUOTA_STEP)
            .unwrap();

        match &wf.graph().step(WAIT_FOR_QUOTA_STEP).unwrap().kind {
            StepKind::WaitForAvailableQuota(quotas) => {
                assert_eq!(quotas.len(), 2);
                assert_eq!(quotas.units("CPUS", "us-central1"), Some(3));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn quota_gates_creation_regardless_of_order() {
        let mut before = workflow();
        before
            .wait_for_quota(QuotaRequest::new("CPUS", "us-central1", 2), WAIT_FOR_QUOTA_STEP)
            .unwrap();
        before.create_vm("vm1").unwrap();

        let mut after = workflow();
        after.create_vm("vm1").unwrap();
        after
            .wait_for_quota(QuotaRequest::new("CPUS", "us-central1", 2), WAIT_FOR_QUOTA_STEP)
            .unwrap();

        for wf in [&before, &after] {
            assert!(wf.graph().depends_on(CREATE_DISKS_STEP, WAIT_FOR_QUOTA_STEP));
            assert!(wf.graph().depends_on(CREATE_VMS_STEP, WAIT_FOR_QUOTA_STEP));
        }
    }

    #[test]
    fn quota_rejects_zero_units_and_bad_region() {
        let mut wf = workflow();
        assert!(
            wf.wait_for_quota(QuotaRequest::new("CPUS", "us-central1", 0), WAIT_FOR_QUOTA_STEP)
                .is_err()
        );
        assert!(
            wf.wait_for_quota(QuotaRequest::new("CPUS", "central", 1), WAIT_FOR_QUOTA_STEP)
                .is_err()
        );
        assert!(!wf.graph().contains(WAIT_FOR_QUOTA_STEP));
    }

    #[test]
    fn quota_step_name_must_not_collide_with_other_kind() {
        let mut wf = workflow();
        wf.create_vm("vm1").unwrap();
        let err = wf
            .wait_for_quota(QuotaRequest::new("CPUS", "us-central1", 1), CREATE_VMS_STEP)
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }

    #[test]
    fn derivative_vm_chains_through_detach() {
        let mut wf = workflow();
        wf.create_vm("vm1").unwrap();
        wf.create_derivative_vm("vm1", "vm2").unwrap();

        let graph = wf.graph();
        assert!(graph.depends_on("stop-vm1-1", "wait-vm1"));
        assert!(graph.depends_on("detach-vm1-1", "stop-vm1-1"));
        assert!(graph.depends_on("create-vm2-1", "detach-vm1-1"));
        assert!(graph.depends_on("wait-vm2", "create-vm2-1"));
        assert_eq!(wf.last_step_for_vm("vm1").unwrap(), "detach-vm1-1");
        assert_eq!(wf.last_step_for_vm("vm2").unwrap(), "wait-vm2");

        let derived = wf.vm_spec("vm2").unwrap();
        assert_eq!(derived.instance().disks().len(), 1);
        assert_eq!(derived.instance().disks()[0].source, "vm1");
        assert!(derived.instance().disks()[0].boot);
        wf.validate().unwrap();
    }

    #[test]
    fn derivative_keeps_post_reboot_wait_on_default_key() {
        let mut wf = workflow();
        let mut vm = wf.create_vm("shutdown").unwrap();
        vm.set_reboot_mid_test();
        vm.reboot().unwrap();
        wf.create_derivative_vm("shutdown", "check").unwrap();

        let graph = wf.graph();
        assert_eq!(
            graph.step("wait-shutdown").unwrap().checkpoint_key("shutdown"),
            Some(FIRST_BOOT_RESULT_KEY)
        );
        assert_eq!(
            graph.step("wait-shutdown-1").unwrap().checkpoint_key("shutdown"),
            Some(DEFAULT_RESULT_KEY)
        );
        assert!(graph.depends_on("stop-shutdown-2", "wait-shutdown-1"));
    }

    #[test]
    fn derivative_without_reboot_leaves_initial_wait_alone() {
        let mut wf = workflow();
        wf.create_vm("vm1").unwrap().set_reboot_mid_test();
        wf.create_derivative_vm("vm1", "vm2").unwrap();
        assert_eq!(
            wf.graph().step("wait-vm1").unwrap().checkpoint_key("vm1"),
            Some(DEFAULT_RESULT_KEY)
        );
    }

    #[test]
    fn derivative_of_unknown_vm_fails() {
        let mut wf = workflow();
        assert!(matches!(
            wf.create_derivative_vm("missing", "vm2"),
            Err(GraphError::UnknownVm(_))
        ));
    }

    #[test]
    fn metadata_reaches_every_vm() {
        let mut wf = workflow();
        wf.create_vm("vm1").unwrap();
        wf.create_vm("vm2").unwrap();
        wf.add_metadata_to_all_vms("_exclude_discrete_tests", "TestSlow");
        for vm in wf.vms() {
            assert_eq!(
                vm.instance().metadata().get("_exclude_discrete_tests"),
                Some("TestSlow")
            );
        }
    }

    #[test]
    fn topological_order_starts_with_roots() {
        let mut wf = workflow();
        wf.wait_for_quota(QuotaRequest::new("CPUS", "us-central1", 2), WAIT_FOR_QUOTA_STEP)
            .unwrap();
        wf.create_vm("vm1").unwrap();
        let order = wf.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|s| s == name).unwrap();
        assert!(pos(WAIT_FOR_QUOTA_STEP) < pos(CREATE_DISKS_STEP));
        assert!(pos(CREATE_DISKS_STEP) < pos(CREATE_VMS_STEP));
        assert!(pos(CREATE_VMS_STEP) < pos("wait-vm1"));
    }
}

//! VM 수명주기 모델 -- VM별 변경 API와 스텝 체인
//!
//! 각 VM은 자신에게 마지막으로 삽입된 스텝(`last_step`)을 기억하며, VM에 대한 모든
//! 수명주기 연산은 그 스텝에 의존하는 새 스텝을 추가합니다. 따라서 한 VM의 스텝은
//! 엄격한 체인을 이루고, 서로 다른 VM의 스텝은 독립적으로 진행됩니다.
//!
//! 재부팅 계열 연산(reboot / resume / resize-and-reboot)은 워크플로 카운터를 1 증가시키고
//! 게스트 신호 체크포인트를 하나 추가합니다.

use tracing::debug;

use crate::error::GraphError;
use crate::instance::{
    AliasIpRange, AttachedDisk, DiskKind, InstanceSpec, NetworkInterface,
};
use crate::network::region_from_zone;
use crate::step::{
    DEFAULT_RESULT_KEY, DiskResize, DiskSpec, FIRST_BOOT_RESULT_KEY, InstanceStatus, StepKind,
    WaitSignal, vm_step_name,
};
use crate::workflow::Workflow;

/// `ssh-keys` 메타데이터 키
pub const SSH_KEYS_METADATA: &str = "ssh-keys";
/// 테스트 실행 패턴 메타데이터 키
pub const TEST_RUN_METADATA: &str = "_test_run";
/// 개별 테스트 제외 패턴 메타데이터 키
pub const EXCLUDE_DISCRETE_TESTS_METADATA: &str = "_exclude_discrete_tests";
/// gVNIC NIC 타입
pub const GVNIC: &str = "GVNIC";

/// 워크플로에 등록된 VM
#[derive(Debug, Clone)]
pub struct Vm {
    name: String,
    instance: Box<dyn InstanceSpec>,
    create_step: String,
    last_step: String,
    operations: u32,
    ssh_keys: Vec<String>,
    custom_network: bool,
    nic_type: Option<String>,
    reboot_mid_test: bool,
    rebooted: bool,
    first_boot_wait: Option<String>,
    test_pattern: Option<String>,
}

impl Vm {
    pub(crate) fn new(
        name: String,
        instance: Box<dyn InstanceSpec>,
        create_step: String,
        initial_wait: String,
    ) -> Self {
        Self {
            name,
            instance,
            create_step,
            last_step: initial_wait,
            operations: 0,
            ssh_keys: Vec::new(),
            custom_network: false,
            nic_type: None,
            reboot_mid_test: false,
            rebooted: false,
            first_boot_wait: None,
            test_pattern: None,
        }
    }

    /// VM 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 백킹 인스턴스 스펙
    pub fn instance(&self) -> &dyn InstanceSpec {
        self.instance.as_ref()
    }

    pub(crate) fn instance_mut(&mut self) -> &mut dyn InstanceSpec {
        self.instance.as_mut()
    }

    /// 이 VM을 생성하는 스텝
    pub fn create_step(&self) -> &str {
        &self.create_step
    }

    /// 이 VM에 마지막으로 삽입된 스텝
    pub fn last_step(&self) -> &str {
        &self.last_step
    }

    /// 적용된 수명주기 연산 수
    pub fn operations(&self) -> u32 {
        self.operations
    }

    /// 테스트 도중 재부팅 여부
    pub fn reboot_mid_test(&self) -> bool {
        self.reboot_mid_test
    }

    /// 실행할 테스트 이름 패턴 (`|`로 구분된 alternation)
    pub fn test_pattern(&self) -> Option<&str> {
        self.test_pattern.as_deref()
    }

    pub(crate) fn finish_operation(&mut self, last_step: String) {
        self.last_step = last_step;
        self.operations += 1;
    }

    /// 부트 디스크를 넘겨받는 파생 VM을 만듭니다.
    pub(crate) fn derive(
        &self,
        name: &str,
        boot: AttachedDisk,
        create_step: String,
        initial_wait: String,
    ) -> Self {
        let mut instance = self.instance.clone_box();
        instance.set_name(name);
        *instance.disks_mut() = vec![AttachedDisk {
            boot: true,
            ..boot
        }];
        Self {
            name: name.to_owned(),
            instance,
            create_step,
            last_step: initial_wait,
            operations: 0,
            ssh_keys: self.ssh_keys.clone(),
            custom_network: self.custom_network,
            nic_type: self.nic_type.clone(),
            reboot_mid_test: false,
            rebooted: false,
            first_boot_wait: None,
            test_pattern: self.test_pattern.clone(),
        }
    }
}

impl Workflow {
    /// 첫 재부팅 계열 연산 직전의 게스트 체크포인트를 첫 부팅 대기로 기록합니다.
    ///
    /// 두 번째 이후의 재부팅, 파생 VM을 위한 정지는 대상이 아닙니다. VM이 테스트
    /// 도중 재부팅하도록 표시되어 있으면 즉시 첫 부팅 키로 교체합니다.
    pub(crate) fn mark_first_boot_wait(&mut self, index: usize) {
        let Workflow { graph, vms, .. } = self;
        let vm = &mut vms[index];
        if vm.rebooted {
            return;
        }
        vm.rebooted = true;
        let last = vm.last_step.clone();
        let is_checkpoint = graph
            .step(&last)
            .is_some_and(|step| step.checkpoint_key(&vm.name).is_some());
        if !is_checkpoint {
            return;
        }
        if vm.reboot_mid_test {
            if let Some(step) = graph.step_mut(&last) {
                step.rewrite_checkpoint_key(&vm.name, FIRST_BOOT_RESULT_KEY);
            }
        }
        vm.first_boot_wait = Some(last);
    }

    /// `stop -> start -> wait` 체인을 삽입하고 wait 스텝 이름을 반환합니다.
    fn push_reboot_chain(
        &mut self,
        vm: &str,
        counter: u32,
        anchor: &str,
    ) -> Result<String, GraphError> {
        let stop = vm_step_name("stop", vm, counter);
        let start = vm_step_name("start", vm, counter);
        let wait = vm_step_name("wait", vm, counter);
        self.insert_step(
            stop.clone(),
            StepKind::StopInstances(vec![vm.to_owned()]),
            &[anchor],
        )?;
        self.insert_step(
            start.clone(),
            StepKind::StartInstances(vec![vm.to_owned()]),
            &[stop.as_str()],
        )?;
        self.insert_step(
            wait.clone(),
            StepKind::WaitForInstancesSignal(vec![WaitSignal::guest_attribute(
                vm,
                DEFAULT_RESULT_KEY,
            )]),
            &[start.as_str()],
        )?;
        Ok(wait)
    }
}

/// 단일 VM에 대한 변경 핸들
///
/// [`Workflow::create_vm`]이나 [`Workflow::vm`]으로 얻습니다.
/// 실패한 연산은 워크플로를 변경하지 않습니다.
#[derive(Debug)]
pub struct VmHandle<'a> {
    workflow: &'a mut Workflow,
    index: usize,
}

impl<'a> VmHandle<'a> {
    pub(crate) fn new(workflow: &'a mut Workflow, index: usize) -> Self {
        Self { workflow, index }
    }

    fn vm(&self) -> &Vm {
        &self.workflow.vms[self.index]
    }

    fn vm_mut(&mut self) -> &mut Vm {
        &mut self.workflow.vms[self.index]
    }

    /// VM 이름
    pub fn name(&self) -> &str {
        self.vm().name()
    }

    /// 현재 VM 상태
    pub fn spec(&self) -> &Vm {
        self.vm()
    }

    /// 메타데이터를 추가합니다. 같은 키가 있으면 값을 교체합니다.
    pub fn add_metadata(&mut self, key: &str, value: &str) {
        self.vm_mut().instance_mut().metadata_mut().upsert(key, value);
    }

    /// 부트가 아닌 디스크를 연결합니다.
    ///
    /// 영구 디스크는 공유 `create-disks` 스텝에도 추가됩니다. 부트 디스크는 항상
    /// 인덱스 0에 남고, 추가 디스크는 호출 순서대로 뒤에 붙습니다.
    pub fn add_disk(&mut self, kind: DiskKind, disk: DiskSpec) -> Result<(), GraphError> {
        if disk.name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "disk name must not be empty".to_owned(),
            ));
        }
        if self.workflow.has_disk(&disk.name) {
            return Err(GraphError::Duplicate {
                kind: "disk",
                name: disk.name,
            });
        }
        let attached = AttachedDisk::secondary(&disk.name, kind);
        if kind == DiskKind::Persistent {
            self.workflow.extend_disks(vec![disk])?;
        }
        self.vm_mut().instance_mut().disks_mut().push(attached);
        Ok(())
    }

    /// SSH 사용자를 추가합니다.
    ///
    /// 모든 사용자는 `name:key` 줄을 호출 순서대로 개행으로 이어 붙인 하나의
    /// `ssh-keys` 메타데이터 값에 기록됩니다. 같은 이름으로 다시 호출하면
    /// 기존 줄을 덮어쓰지 않고 새 줄을 추가합니다.
    pub fn add_user(&mut self, user: &str, public_key: &str) {
        let vm = self.vm_mut();
        vm.ssh_keys.push(format!("{user}:{public_key}"));
        let value = vm.ssh_keys.join("\n");
        vm.instance_mut()
            .metadata_mut()
            .upsert(SSH_KEYS_METADATA, value);
    }

    /// 워크플로에 생성된 네트워크에 인터페이스를 연결합니다.
    ///
    /// 첫 호출은 기본 인터페이스를 대체하고, 이후 호출은 인터페이스를 추가합니다.
    pub fn add_custom_network(
        &mut self,
        network: &str,
        subnetwork: Option<&str>,
    ) -> Result<(), GraphError> {
        if !self.workflow.has_networks() {
            return Err(GraphError::Precondition(format!(
                "no network has been created in workflow '{}'",
                self.workflow.name()
            )));
        }
        let auto_subnets = self
            .workflow
            .network(network)
            .map(|n| n.auto_create_subnetworks)
            .ok_or_else(|| GraphError::UnknownNetwork(network.to_owned()))?;
        if !auto_subnets && subnetwork.is_none() {
            return Err(GraphError::MissingSubnetwork(network.to_owned()));
        }
        if let Some(sub) = subnetwork.and_then(|s| self.workflow.subnetwork(s)) {
            if sub.network != network {
                return Err(GraphError::InvalidArgument(format!(
                    "subnetwork '{}' belongs to network '{}', not '{network}'",
                    sub.name, sub.network
                )));
            }
        }

        let vm = self.vm_mut();
        let mut interface = NetworkInterface::new(network, subnetwork.map(str::to_owned));
        interface.nic_type.clone_from(&vm.nic_type);
        let interfaces = vm.instance.network_interfaces_mut();
        if !vm.custom_network {
            interfaces.clear();
        }
        interfaces.push(interface);
        vm.custom_network = true;
        Ok(())
    }

    /// 첫 번째 인터페이스에 별칭 IP 범위를 추가합니다.
    ///
    /// [`add_custom_network`](Self::add_custom_network)가 먼저 성공해야 합니다.
    pub fn add_alias_ip_ranges(
        &mut self,
        ip_cidr_range: &str,
        range_name: &str,
    ) -> Result<(), GraphError> {
        let vm = self.vm_mut();
        if !vm.custom_network {
            return Err(GraphError::Precondition(format!(
                "vm '{}' has no custom network for alias ip ranges",
                vm.name
            )));
        }
        let name = vm.name.clone();
        let interface = vm
            .instance
            .network_interfaces_mut()
            .first_mut()
            .ok_or_else(|| {
                GraphError::Precondition(format!("vm '{name}' has no network interface"))
            })?;
        interface.alias_ip_ranges.push(AliasIpRange {
            ip_cidr_range: ip_cidr_range.to_owned(),
            subnetwork_range_name: range_name.to_owned(),
        });
        Ok(())
    }

    /// VM을 재부팅합니다. (`stop -> start -> wait`)
    pub fn reboot(&mut self) -> Result<(), GraphError> {
        let vm = self.name().to_owned();
        let counter = self.workflow.graph.peek_counter();
        let names = ["stop", "start", "wait"].map(|kind| vm_step_name(kind, &vm, counter));
        self.workflow
            .graph
            .ensure_absent(names.iter().map(String::as_str))?;

        self.workflow.mark_first_boot_wait(self.index);
        self.workflow.graph.advance_counter();
        let anchor = self.vm().last_step.clone();
        let wait = self.workflow.push_reboot_chain(&vm, counter, &anchor)?;
        debug!(workflow = %self.workflow.name(), vm = %vm, counter, "reboot added");
        self.vm_mut().finish_operation(wait);
        Ok(())
    }

    /// 스스로 일시 중단한 VM을 재개합니다.
    ///
    /// 중단 상태 대기는 VM의 마지막 스텝에 의존합니다. 단, 아직 수명주기 연산이
    /// 없던 VM은 생성 스텝에 의존합니다. (게스트가 완료 신호 전에 스스로 중단)
    pub fn resume(&mut self) -> Result<(), GraphError> {
        let vm = self.name().to_owned();
        let counter = self.workflow.graph.peek_counter();
        let suspended = vm_step_name("wait-suspended", &vm, counter);
        let resume = vm_step_name("resume", &vm, counter);
        let wait = vm_step_name("wait", &vm, counter);
        self.workflow
            .graph
            .ensure_absent([suspended.as_str(), resume.as_str(), wait.as_str()])?;

        self.workflow.mark_first_boot_wait(self.index);
        self.workflow.graph.advance_counter();
        let anchor = if self.vm().operations == 0 {
            self.vm().create_step.clone()
        } else {
            self.vm().last_step.clone()
        };

        self.workflow.insert_step(
            suspended.clone(),
            StepKind::WaitForInstancesSignal(vec![WaitSignal::status(
                &vm,
                InstanceStatus::Suspended,
            )]),
            &[anchor.as_str()],
        )?;
        self.workflow.insert_step(
            resume.clone(),
            StepKind::ResumeInstances(vec![vm.clone()]),
            &[suspended.as_str()],
        )?;
        self.workflow.insert_step(
            wait.clone(),
            StepKind::WaitForInstancesSignal(vec![WaitSignal::guest_attribute(
                &vm,
                DEFAULT_RESULT_KEY,
            )]),
            &[resume.as_str()],
        )?;
        debug!(workflow = %self.workflow.name(), vm = %vm, counter, "resume added");
        self.vm_mut().finish_operation(wait);
        Ok(())
    }

    /// 부트 디스크 크기를 변경한 뒤 재부팅합니다.
    pub fn resize_disk_and_reboot(&mut self, size_gb: u64) -> Result<(), GraphError> {
        if size_gb == 0 {
            return Err(GraphError::InvalidArgument(
                "disk size must be positive".to_owned(),
            ));
        }
        let vm = self.name().to_owned();
        let boot = self
            .vm()
            .instance()
            .disks()
            .first()
            .map(|d| d.source.clone())
            .ok_or_else(|| GraphError::Precondition(format!("vm '{vm}' has no boot disk")))?;
        let counter = self.workflow.graph.peek_counter();
        let resize = vm_step_name("resize", &vm, counter);
        let chain = ["stop", "start", "wait"].map(|kind| vm_step_name(kind, &vm, counter));
        self.workflow.graph.ensure_absent(
            std::iter::once(resize.as_str()).chain(chain.iter().map(String::as_str)),
        )?;

        self.workflow.mark_first_boot_wait(self.index);
        self.workflow.graph.advance_counter();
        let anchor = self.vm().last_step.clone();
        self.workflow.insert_step(
            resize.clone(),
            StepKind::ResizeDisks(vec![DiskResize {
                name: boot,
                size_gb,
            }]),
            &[anchor.as_str()],
        )?;
        let wait = self.workflow.push_reboot_chain(&vm, counter, &resize)?;
        debug!(workflow = %self.workflow.name(), vm = %vm, size_gb, counter, "resize and reboot added");
        self.vm_mut().finish_operation(wait);
        Ok(())
    }

    /// shielded secure boot를 활성화합니다.
    pub fn enable_secure_boot(&mut self) {
        self.vm_mut().instance_mut().set_secure_boot(true);
    }

    /// 모든 인터페이스에 gVNIC을 사용합니다.
    ///
    /// 인터페이스가 없으면 기본 네트워크 인터페이스를 하나 추가합니다.
    pub fn use_gvnic(&mut self) {
        let vm = self.vm_mut();
        vm.nic_type = Some(GVNIC.to_owned());
        let interfaces = vm.instance.network_interfaces_mut();
        if interfaces.is_empty() {
            interfaces.push(NetworkInterface::new("default", None));
        }
        for interface in interfaces.iter_mut() {
            interface.nic_type = Some(GVNIC.to_owned());
        }
    }

    /// 머신 타입을 고정합니다.
    pub fn force_machine_type(&mut self, machine_type: &str) -> Result<(), GraphError> {
        if machine_type.is_empty() {
            return Err(GraphError::InvalidArgument(
                "machine type must not be empty".to_owned(),
            ));
        }
        self.vm_mut().instance_mut().set_machine_type(machine_type);
        Ok(())
    }

    /// zone을 고정합니다.
    pub fn force_zone(&mut self, zone: &str) -> Result<(), GraphError> {
        region_from_zone(zone)?;
        self.vm_mut().instance_mut().set_zone(zone);
        Ok(())
    }

    /// 호스트 유지보수 시 인스턴스를 종료하도록 설정합니다. (GPU, 컨피덴셜 VM 등)
    pub fn terminate_on_host_maintenance(&mut self) {
        self.vm_mut()
            .instance_mut()
            .set_on_host_maintenance("TERMINATE");
    }

    /// 테스트 도중 재부팅하도록 표시합니다.
    ///
    /// 첫 재부팅 계열 연산 직전의 대기만 첫 부팅 키를 기다리고, 이후 대기는 모두
    /// 기본 키를 사용합니다. 재부팅 호출 전후 어느 시점에 표시해도 결과는 같습니다.
    pub fn set_reboot_mid_test(&mut self) {
        let Workflow { graph, vms, .. } = &mut *self.workflow;
        let vm = &mut vms[self.index];
        vm.reboot_mid_test = true;
        if let Some(step) = vm.first_boot_wait.as_deref().and_then(|w| graph.step_mut(w)) {
            step.rewrite_checkpoint_key(&vm.name, FIRST_BOOT_RESULT_KEY);
        }
    }

    /// 이 VM에서 실행할 테스트 이름 패턴을 기록합니다.
    pub fn run_tests(&mut self, pattern: &str) {
        let vm = self.vm_mut();
        vm.test_pattern = Some(pattern.to_owned());
        vm.instance_mut()
            .metadata_mut()
            .upsert(TEST_RUN_METADATA, pattern);
    }
}

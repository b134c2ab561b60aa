//! Built-in test suite setups.
//!
//! Each setup declares the VMs, networks, disks and quota a suite needs.
//! The suite binaries themselves run inside the guest and are selected
//! through the `run_tests` pattern.

use imagetest_graph::instance::DiskKind;
use imagetest_graph::network::Subnetwork;
use imagetest_graph::{DiskSpec, GraphError, InstanceOverrides, QuotaRequest, Workflow};
use imagetest_scheduler::{SchedulerError, SuiteRegistry};

/// Quota step shared by suites that need dedicated capacity.
const QUOTA_STEP: &str = "wait-for-quota";

/// Register every built-in suite, in run order.
pub fn builtin_registry() -> Result<SuiteRegistry, SchedulerError> {
    let mut registry = SuiteRegistry::new();
    registry.register("hostname", hostname)?;
    registry.register("ssh", ssh)?;
    registry.register("disk", disk)?;
    registry.register("imageboot", imageboot)?;
    registry.register("suspendresume", suspend_resume)?;
    registry.register("network", network)?;
    registry.register("lssd", lssd)?;
    registry.register("shutdownscripts", shutdown_scripts)?;
    Ok(registry)
}

fn hostname(wf: &mut Workflow) -> Result<(), GraphError> {
    let mut vm1 = wf.create_vm("vm1")?;
    vm1.run_tests("TestHostname|TestFQDN|TestHostKeysGeneratedOnce");

    let mut vm2 = wf.create_vm("vm2")?;
    vm2.add_metadata("hostname", "custom-hostname.example.com");
    vm2.run_tests("TestCustomHostname");
    Ok(())
}

fn ssh(wf: &mut Workflow) -> Result<(), GraphError> {
    let mut client = wf.create_vm("client")?;
    client.add_user("test-user", "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIClient test-user");
    client.run_tests("TestSSHClient");

    let mut server = wf.create_vm("server")?;
    server.add_user("test-user", "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIServer test-user");
    server.run_tests("TestEmptyTest");
    Ok(())
}

fn disk(wf: &mut Workflow) -> Result<(), GraphError> {
    let mut vm = wf.create_vm_multiple_disks(
        vec![
            DiskSpec::new("resize").with_size_gb(20),
            DiskSpec::new("resize-data").with_size_gb(10).with_type("pd-balanced"),
        ],
        InstanceOverrides::default(),
    )?;
    vm.resize_disk_and_reboot(200)?;
    vm.run_tests("TestDiskResize|TestDiskAttached");
    Ok(())
}

fn imageboot(wf: &mut Workflow) -> Result<(), GraphError> {
    let mut boot = wf.create_vm("boot")?;
    boot.reboot()?;
    boot.run_tests("TestGuestBoot|TestGuestReboot");

    let mut secure = wf.create_vm("secureboot")?;
    secure.enable_secure_boot();
    secure.run_tests("TestGuestSecureBoot");
    Ok(())
}

fn suspend_resume(wf: &mut Workflow) -> Result<(), GraphError> {
    let mut vm = wf.create_vm("suspend")?;
    vm.force_machine_type("n2-standard-2")?;
    vm.resume()?;
    vm.run_tests("TestSuspend");
    Ok(())
}

fn network(wf: &mut Workflow) -> Result<(), GraphError> {
    let region = wf.region().to_owned();
    wf.create_network("imagetest-net", false)?;
    wf.create_subnetwork(
        Subnetwork::new("imagetest-subnet", "imagetest-net", "10.128.0.0/20")
            .with_secondary_range("secondary-range", "10.14.8.0/24"),
    )?;
    wf.wait_for_quota(QuotaRequest::new("CPUS", &region, 4), QUOTA_STEP)?;

    let mut vm1 = wf.create_vm("vm1")?;
    vm1.add_custom_network("imagetest-net", Some("imagetest-subnet"))?;
    vm1.add_alias_ip_ranges("10.14.8.0/24", "secondary-range")?;
    vm1.use_gvnic();
    vm1.run_tests("TestAliases|TestGVNIC");

    let mut vm2 = wf.create_vm("vm2")?;
    vm2.add_custom_network("imagetest-net", Some("imagetest-subnet"))?;
    vm2.run_tests("TestPing");
    Ok(())
}

fn lssd(wf: &mut Workflow) -> Result<(), GraphError> {
    let region = wf.region().to_owned();
    wf.wait_for_quota(QuotaRequest::new("LOCAL_SSD_TOTAL_GB", &region, 750), QUOTA_STEP)?;
    wf.wait_for_quota(QuotaRequest::new("CPUS", &region, 8), QUOTA_STEP)?;

    let mut vm = wf.create_vm("mount")?;
    vm.force_machine_type("n2-standard-8")?;
    vm.terminate_on_host_maintenance();
    vm.add_disk(DiskKind::Scratch, DiskSpec::new("local-ssd-0"))?;
    vm.add_disk(DiskKind::Scratch, DiskSpec::new("local-ssd-1"))?;
    vm.run_tests("TestMount");
    Ok(())
}

fn shutdown_scripts(wf: &mut Workflow) -> Result<(), GraphError> {
    let mut vm = wf.create_vm("shutdown")?;
    vm.add_metadata("shutdown-script", "#!/bin/bash\necho shutdown > /shutdown.txt");
    vm.set_reboot_mid_test();
    vm.reboot()?;
    vm.run_tests("TestShutdownScript");

    wf.create_derivative_vm("shutdown", "shutdown-check")?
        .run_tests("TestShutdownScriptResult");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagetest_graph::InstanceApi;

    fn workflow(api: InstanceApi) -> Workflow {
        Workflow::new("suite-debian-12", "projects/debian-cloud/global/images/debian-12", "p", "us-central1-a")
            .unwrap()
            .with_instance_api(api)
    }

    #[test]
    fn registry_order_is_stable() {
        let registry = builtin_registry().unwrap();
        let names: Vec<_> = registry.iter().map(|s| s.name()).collect();
        assert_eq!(names[0], "hostname");
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn every_builtin_suite_builds_a_valid_graph() {
        let registry = builtin_registry().unwrap();
        for api in [InstanceApi::Stable, InstanceApi::Preview] {
            for suite in registry.iter() {
                let mut wf = workflow(api);
                suite
                    .setup(&mut wf)
                    .unwrap_or_else(|e| panic!("{} failed: {e}", suite.name()));
                wf.validate().unwrap();
                wf.to_document().unwrap();
            }
        }
    }

    #[test]
    fn lssd_merges_quota_requests() {
        let mut wf = workflow(InstanceApi::Stable);
        lssd(&mut wf).unwrap();
        let step = wf.graph().step(QUOTA_STEP).unwrap();
        match &step.kind {
            imagetest_graph::StepKind::WaitForAvailableQuota(quota) => assert_eq!(quota.len(), 2),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn shutdown_scripts_waits_for_second_boot_result() {
        use imagetest_graph::step::{DEFAULT_RESULT_KEY, FIRST_BOOT_RESULT_KEY};

        let mut wf = workflow(InstanceApi::Stable);
        shutdown_scripts(&mut wf).unwrap();
        let graph = wf.graph();
        assert_eq!(
            graph.step("wait-shutdown").unwrap().checkpoint_key("shutdown"),
            Some(FIRST_BOOT_RESULT_KEY)
        );
        assert_eq!(
            graph.step("wait-shutdown-1").unwrap().checkpoint_key("shutdown"),
            Some(DEFAULT_RESULT_KEY)
        );
    }
}

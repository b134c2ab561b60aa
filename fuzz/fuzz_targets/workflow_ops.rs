#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use imagetest_graph::{InstanceApi, Workflow};

/// 퍼저용 구조적 입력: VM별 수명주기 연산 나열
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    preview: bool,
    network_first: bool,
    vms: Vec<FuzzVm>,
}

#[derive(Arbitrary, Debug)]
struct FuzzVm {
    name: u8,
    reboot_mid_test: bool,
    ops: Vec<FuzzOp>,
}

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Reboot,
    Resume,
    Resize(u16),
    AddUser(u8),
    Gvnic,
}

fuzz_target!(|input: FuzzInput| {
    let api = if input.preview {
        InstanceApi::Preview
    } else {
        InstanceApi::Stable
    };
    let Ok(wf) = Workflow::new("fuzz-debian-12", "debian-12", "project", "us-central1-a") else {
        return;
    };
    let mut wf = wf.with_instance_api(api);
    if input.network_first {
        let _ = wf.create_network("net", true);
    }

    for spec in input.vms.iter().take(4) {
        let Ok(mut vm) = wf.create_vm(&format!("vm{}", spec.name % 4)) else {
            continue;
        };
        if spec.reboot_mid_test {
            vm.set_reboot_mid_test();
        }
        for op in spec.ops.iter().take(8) {
            let _ = match op {
                FuzzOp::Reboot => vm.reboot(),
                FuzzOp::Resume => vm.resume(),
                FuzzOp::Resize(size) => vm.resize_disk_and_reboot(u64::from(*size)),
                FuzzOp::AddUser(n) => {
                    vm.add_user(&format!("user{n}"), "ssh-ed25519 AAAA");
                    Ok(())
                }
                FuzzOp::Gvnic => {
                    vm.use_gvnic();
                    Ok(())
                }
            };
        }
    }

    if !input.network_first {
        let _ = wf.create_network("net", true);
    }

    // 성공한 연산만으로 구성된 그래프는 항상 유효해야 함
    assert!(wf.validate().is_ok());
    assert!(wf.to_document().is_ok());
});

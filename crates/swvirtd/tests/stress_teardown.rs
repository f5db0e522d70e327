//! Stress test: teardown racing the delayed promiscuity correction
//!
//! Each round schedules a correction and tears the chip down at a varying
//! point relative to the correction firing. Teardown must never finish
//! while the correction still holds the primary interface.

use std::sync::Arc;
use std::time::Duration;

use swvirt_chip::{PromiscLevel, SimulatedProbe, SimulatedSwitch, SwitchChip};
use swvirt_common::SwvirtConfig;
use swvirtd::{InterfaceNamespace, LifecycleCoordinator, StatusEndpoint};

const ROUNDS: u64 = 200;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_teardown_races_correction() {
    let mut config = SwvirtConfig::default();
    config.promiscuity.reset_delay_ms = 1;

    let namespace = Arc::new(InterfaceNamespace::new(16));
    let coordinator = LifecycleCoordinator::new(
        config,
        Arc::clone(&namespace),
        Arc::new(StatusEndpoint::new()),
    );

    let mut fired = 0;
    let mut cancelled = 0;
    for round in 0..ROUNDS {
        let sim = Arc::new(SimulatedSwitch::builder().port_count(4).build());
        let chip: Arc<dyn SwitchChip> = sim.clone();
        let attached = coordinator
            .start(Some(chip), &SimulatedProbe::empty())
            .await
            .unwrap();
        let ctx = Arc::clone(attached.context());
        let primary = Arc::downgrade(attached.registry().primary());

        sim.script_program_results([Ok(PromiscLevel::Ambiguous)]);
        let sibling = attached.registry().sibling(1 + (round % 3) as u16).unwrap();
        sibling
            .set_address(format!("02:bb:00:00:00:{:02x}", round % 256).parse().unwrap())
            .unwrap();
        drop(sibling);

        // Spread teardown around the 1ms correction deadline.
        tokio::time::sleep(Duration::from_micros((round * 37) % 2000)).await;

        let order = coordinator.shutdown(attached).await;
        assert_eq!(order, vec![3, 2, 1, 0]);
        assert!(!ctx.correction_pending());
        assert!(
            primary.upgrade().is_none(),
            "primary outlived teardown in round {}",
            round
        );
        assert!(namespace.is_empty());

        match ctx.promisc_level() {
            PromiscLevel::Off => fired += 1,
            PromiscLevel::On => cancelled += 1,
            PromiscLevel::Ambiguous => panic!("ambiguous level stored in round {}", round),
        }
    }
    assert_eq!(fired + cancelled, ROUNDS);
}

//! Chip-wide promiscuity arbitration.
//!
//! Programming a port address makes the chip report the promiscuity the host
//! port ended up in. Some chips answer a first foreign address with a
//! transitional level 2 instead of 1; the arbiter treats that answer as "on"
//! and schedules a one-shot correction that resets the level to "off" once
//! the chip has settled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swvirt_chip::{MacAddress, PromiscLevel};
use swvirt_common::{SwitchError, SwitchResult};

use crate::context::SwitchContext;
use crate::interface::LogicalInterface;

/// A spawned correction task, kept until teardown reaps it.
#[derive(Debug)]
struct CorrectionTask {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Promiscuity bookkeeping, guarded by the chip lock.
#[derive(Debug, Default)]
pub struct PromiscuityState {
    /// Level the chip was last reported to be in.
    pub requested_level: PromiscLevel,
    /// Generation of the correction that has not fired yet.
    pending: Option<u64>,
    generation: u64,
    tasks: Vec<CorrectionTask>,
}

impl PromiscuityState {
    /// Returns true while a correction is scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Serializes address programming and arbitrates the resulting
/// promiscuity level.
#[derive(Debug, Clone)]
pub struct PromiscuityArbiter {
    reset_delay: Duration,
}

impl PromiscuityArbiter {
    /// Creates an arbiter that resets ambiguous answers after `reset_delay`.
    pub fn new(reset_delay: Duration) -> Self {
        Self { reset_delay }
    }

    /// Delay before an ambiguous answer is reset.
    pub fn reset_delay(&self) -> Duration {
        self.reset_delay
    }

    /// Applies `address` to `iface` and programs it into the chip.
    ///
    /// The address stays applied locally when the chip transaction fails.
    pub fn set_address(
        &self,
        iface: &Arc<LogicalInterface>,
        address: MacAddress,
    ) -> SwitchResult<()> {
        if iface.address() == address {
            // Nothing to program; the primary re-applies its station address.
            iface.program_station_address(address);
            return Ok(());
        }

        iface.store_address(address);

        // Chip programming goes through the primary's binding.
        let primary = iface.primary().unwrap_or(iface);
        let ctx = primary.context();
        let port = iface.port_index();

        let mut state = ctx.lock_state();
        let prior = state.promisc.requested_level;
        let reported = ctx
            .chip()
            .program_address(port, address, prior)
            .map_err(|e| SwitchError::address_program(port, e))?;

        if reported != prior {
            let mut level = reported;
            if prior == PromiscLevel::Off && reported == PromiscLevel::Ambiguous {
                level = PromiscLevel::On;
                if !state.promisc.is_pending() && !state.detaching {
                    let generation = state.promisc.generation.wrapping_add(1);
                    let task = self.schedule_correction(ctx, Arc::clone(primary), generation);
                    let promisc = &mut state.promisc;
                    promisc.tasks.retain(|t| !t.handle.is_finished());
                    promisc.tasks.push(task);
                    promisc.generation = generation;
                    promisc.pending = Some(generation);
                }
            }
            state.promisc.requested_level = level;
            info!(
                chip = %ctx.info().name,
                port,
                %prior,
                %reported,
                %level,
                "Chip promiscuity changed"
            );

            // Only the correction turns the local flag off again.
            if prior.is_settled() && level.is_settled() {
                iface.set_promiscuous(true);
                iface.recompute_rx_filter();
            }
        }
        drop(state);

        if iface.is_primary() {
            iface.program_station_address(address);
        }
        Ok(())
    }

    fn schedule_correction(
        &self,
        ctx: &SwitchContext,
        primary: Arc<LogicalInterface>,
        generation: u64,
    ) -> CorrectionTask {
        let token = CancellationToken::new();
        let delay = self.reset_delay;
        debug!(generation, ?delay, "scheduling promiscuity correction");
        let handle = ctx
            .runtime()
            .spawn(run_correction(primary, token.clone(), generation, delay));
        CorrectionTask {
            generation,
            token,
            handle,
        }
    }

    /// Cancels every correction task and waits for them to finish.
    ///
    /// Marks the chip as detaching so no further correction is scheduled.
    /// Returns true if a correction had not fired yet.
    pub(crate) async fn drain(ctx: &SwitchContext) -> bool {
        let (was_pending, tasks) = Self::cancel_tasks(ctx);

        for task in tasks {
            if let Err(e) = task.handle.await {
                if e.is_panic() {
                    warn!(generation = task.generation, "promiscuity correction panicked");
                }
            }
            debug!(generation = task.generation, "reaped promiscuity correction");
        }
        was_pending
    }

    /// Cancels every correction task without waiting for it.
    ///
    /// Cancelled tasks exit at their next poll and drop the primary they
    /// hold. Returns the number of tasks cancelled.
    pub(crate) fn cancel_all(ctx: &SwitchContext) -> usize {
        let (_, tasks) = Self::cancel_tasks(ctx);
        tasks.len()
    }

    fn cancel_tasks(ctx: &SwitchContext) -> (bool, Vec<CorrectionTask>) {
        let mut state = ctx.lock_state();
        state.detaching = true;
        let was_pending = state.promisc.pending.take().is_some();
        let tasks = std::mem::take(&mut state.promisc.tasks);
        for task in &tasks {
            task.token.cancel();
        }
        (was_pending, tasks)
    }
}

async fn run_correction(
    primary: Arc<LogicalInterface>,
    token: CancellationToken,
    generation: u64,
    delay: Duration,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }

    let ctx = primary.context();
    let mut state = ctx.lock_state();
    if token.is_cancelled() {
        return;
    }
    state.promisc.requested_level = PromiscLevel::Off;
    if state.promisc.pending == Some(generation) {
        state.promisc.pending = None;
    }
    primary.set_promiscuous(false);
    primary.recompute_rx_filter();
    info!(chip = %ctx.info().name, generation, "Promiscuity reset after ambiguous answer");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use swvirt_chip::{ChipError, SimulatedProbe, SimulatedSwitch, SwitchChip};
    use swvirt_common::SwvirtConfig;

    use crate::interface::RxFilterMode;
    use crate::namespace::InterfaceNamespace;
    use crate::registry::VirtualInterfaceRegistry;

    const DELAY: Duration = Duration::from_millis(100);

    fn setup(ports: u16) -> (Arc<SimulatedSwitch>, VirtualInterfaceRegistry) {
        let sim = Arc::new(SimulatedSwitch::builder().port_count(ports).build());
        let chip: Arc<dyn SwitchChip> = sim.clone();
        let mut reg = VirtualInterfaceRegistry::attach(
            Some(chip),
            &SimulatedProbe::empty(),
            Arc::new(InterfaceNamespace::new(8)),
            &SwvirtConfig::default(),
        )
        .unwrap();
        reg.expand(ports, 1500).unwrap();
        (sim, reg)
    }

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    async fn settle(delay: Duration) {
        tokio::time::sleep(delay).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_same_address_skips_chip() {
        let (sim, reg) = setup(2);
        let sibling = reg.sibling(1).unwrap();
        let addr = mac("02:00:00:00:00:11");

        sibling.set_address(addr).unwrap();
        let level = reg.context().promisc_level();
        assert_eq!(sim.program_calls(), 1);

        sibling.set_address(addr).unwrap();
        assert_eq!(sim.program_calls(), 1);
        assert_eq!(reg.context().promisc_level(), level);
    }

    #[tokio::test]
    async fn test_settled_level_drives_filter() {
        let (sim, reg) = setup(2);
        let sibling = reg.sibling(1).unwrap();

        sim.script_program_results([Ok(PromiscLevel::On)]);
        sibling.set_address(mac("02:00:00:00:00:11")).unwrap();
        assert_eq!(reg.context().promisc_level(), PromiscLevel::On);
        assert!(sibling.is_promiscuous());
        assert_eq!(sibling.rx_filter_mode(), RxFilterMode::Promiscuous);

        sim.script_program_results([Ok(PromiscLevel::Off)]);
        sibling.set_address(mac("02:00:00:00:00:12")).unwrap();
        assert_eq!(reg.context().promisc_level(), PromiscLevel::Off);
        assert!(sibling.is_promiscuous());
        assert_eq!(sibling.rx_filter_recomputations(), 2);
    }

    #[tokio::test]
    async fn test_leaving_transitional_level_leaves_filter_alone() {
        let (sim, reg) = setup(3);
        let ctx = Arc::clone(reg.context());
        let first = reg.sibling(1).unwrap();
        let second = reg.sibling(2).unwrap();

        sim.script_program_results([
            Ok(PromiscLevel::On),
            Ok(PromiscLevel::Ambiguous),
            Ok(PromiscLevel::Off),
            Ok(PromiscLevel::Ambiguous),
            Ok(PromiscLevel::On),
        ]);
        first.set_address(mac("02:00:00:00:00:11")).unwrap();
        assert_eq!(first.rx_filter_recomputations(), 1);

        // 1 -> 2 is stored as reported and does not touch the filter.
        second.set_address(mac("02:00:00:00:00:12")).unwrap();
        assert_eq!(ctx.promisc_level(), PromiscLevel::Ambiguous);
        assert!(!ctx.correction_pending());
        assert_eq!(second.rx_filter_recomputations(), 0);

        // 2 -> 0
        second.set_address(mac("02:00:00:00:00:13")).unwrap();
        assert_eq!(ctx.promisc_level(), PromiscLevel::Off);
        assert_eq!(second.rx_filter_recomputations(), 0);
        assert!(!second.is_promiscuous());

        // 0 -> 2 is stored as 1 and updates the filter.
        second.set_address(mac("02:00:00:00:00:14")).unwrap();
        assert_eq!(ctx.promisc_level(), PromiscLevel::On);
        assert_eq!(second.rx_filter_recomputations(), 1);
        PromiscuityArbiter::drain(&ctx).await;

        // 1 -> 1 is unchanged; force a stored 2 and leave it with 1.
        ctx.lock_state().promisc.requested_level = PromiscLevel::Ambiguous;
        first.set_address(mac("02:00:00:00:00:15")).unwrap();
        assert_eq!(ctx.promisc_level(), PromiscLevel::On);
        assert_eq!(first.rx_filter_recomputations(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_level_leaves_filter_alone() {
        let (sim, reg) = setup(2);
        let sibling = reg.sibling(1).unwrap();

        sim.script_program_results([Ok(PromiscLevel::Off)]);
        sibling.set_address(mac("02:00:00:00:00:11")).unwrap();
        assert_eq!(sibling.rx_filter_recomputations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambiguous_answer_is_corrected() {
        let (sim, reg) = setup(2);
        let primary = Arc::clone(reg.primary());
        let sibling = reg.sibling(1).unwrap();
        let ctx = Arc::clone(reg.context());

        sim.script_program_results([Ok(PromiscLevel::Ambiguous)]);
        sibling.set_address(mac("02:00:00:00:00:11")).unwrap();
        assert_eq!(ctx.promisc_level(), PromiscLevel::On);
        assert!(ctx.correction_pending());
        assert!(sibling.is_promiscuous());

        settle(DELAY / 2).await;
        assert_eq!(ctx.promisc_level(), PromiscLevel::On);

        settle(DELAY).await;
        assert_eq!(ctx.promisc_level(), PromiscLevel::Off);
        assert!(!ctx.correction_pending());
        assert!(!primary.is_promiscuous());
        assert!(primary.rx_filter_recomputations() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_correction_pending() {
        let (sim, reg) = setup(3);
        let ctx = Arc::clone(reg.context());

        sim.script_program_results([
            Ok(PromiscLevel::Ambiguous),
            Ok(PromiscLevel::Off),
            Ok(PromiscLevel::Ambiguous),
        ]);
        reg.sibling(1).unwrap().set_address(mac("02:00:00:00:00:11")).unwrap();
        let first = ctx.lock_state().promisc.generation;
        reg.sibling(2).unwrap().set_address(mac("02:00:00:00:00:12")).unwrap();
        assert_eq!(ctx.promisc_level(), PromiscLevel::Off);
        reg.sibling(1).unwrap().set_address(mac("02:00:00:00:00:13")).unwrap();
        assert_eq!(ctx.promisc_level(), PromiscLevel::On);
        assert_eq!(ctx.lock_state().promisc.generation, first);

        settle(DELAY * 2).await;
        assert_eq!(ctx.promisc_level(), PromiscLevel::Off);
        assert!(!ctx.correction_pending());
    }

    #[tokio::test]
    async fn test_chip_failure_keeps_local_address() {
        let (sim, reg) = setup(2);
        let sibling = reg.sibling(1).unwrap();
        let addr = mac("02:00:00:00:00:11");

        sim.script_program_results([Err(ChipError::timeout("program_address"))]);
        let err = sibling.set_address(addr).unwrap_err();
        assert!(matches!(err, SwitchError::AddressProgram { port: 1, .. }));
        assert_eq!(sibling.address(), addr);
        assert_eq!(reg.context().promisc_level(), PromiscLevel::Off);
    }

    #[tokio::test]
    async fn test_primary_programs_station_address() {
        let (sim, reg) = setup(2);
        let primary = Arc::clone(reg.primary());
        let addr = mac("02:00:00:00:00:99");

        primary.set_address(addr).unwrap();
        assert_eq!(primary.station_address(), Some(addr));
        assert_eq!(sim.program_log(), vec![(0, addr, PromiscLevel::Off)]);

        let sibling = reg.sibling(1).unwrap();
        sibling.set_address(mac("02:00:00:00:00:98")).unwrap();
        assert_eq!(sibling.station_address(), None);
        assert_eq!(primary.station_address(), Some(addr));
    }

    #[tokio::test]
    async fn test_rejects_group_address() {
        let (sim, reg) = setup(2);
        let err = reg
            .sibling(1)
            .unwrap()
            .set_address(mac("01:00:5e:00:00:01"))
            .unwrap_err();
        assert!(matches!(err, SwitchError::InvalidAddress { .. }));
        assert_eq!(sim.program_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_cancels_correction() {
        let (sim, reg) = setup(2);
        let ctx = Arc::clone(reg.context());

        sim.script_program_results([Ok(PromiscLevel::Ambiguous)]);
        reg.sibling(1).unwrap().set_address(mac("02:00:00:00:00:11")).unwrap();
        assert!(PromiscuityArbiter::drain(&ctx).await);
        assert!(!ctx.correction_pending());

        settle(DELAY * 2).await;
        assert_eq!(ctx.promisc_level(), PromiscLevel::On);
        assert!(!PromiscuityArbiter::drain(&ctx).await);
    }
}

//! Transmit backpressure propagation.
//!
//! All logical interfaces share one set of hardware queues. When a queue
//! fills or drains on the transport, the transition is mirrored onto every
//! running sibling so no interface keeps queueing into a full ring. These
//! calls run on the completion path: they never block and never take the
//! chip lock.

use std::sync::Weak;

use tracing::trace;

use crate::context::SwitchContext;
use crate::interface::{LogicalInterface, QueueSelector};

/// Mirrors queue transitions across the interfaces of a chip.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFlowController;

impl QueueFlowController {
    /// Stops `queue` on every running interface other than `origin`.
    ///
    /// Returns the number of interfaces on which a queue was stopped.
    pub fn stop_queue(ctx: &SwitchContext, origin: &LogicalInterface, queue: QueueSelector) -> usize {
        let mut affected = 0;
        for iface in Self::peers(ctx, origin) {
            if iface.stop_queue_local(queue) > 0 {
                affected += 1;
            }
        }
        trace!(origin = %origin.name(), ?queue, affected, "propagated queue stop");
        affected
    }

    /// Wakes `queue` on every running interface other than `origin`.
    ///
    /// A single queue is only woken where it is stopped; `All` activates
    /// every queue unconditionally. Either way, one chip-wide wake
    /// broadcast is issued per call. Returns the number of interfaces on
    /// which a queue became active.
    pub fn wake_queue(ctx: &SwitchContext, origin: &LogicalInterface, queue: QueueSelector) -> usize {
        let mut affected = 0;
        for iface in Self::peers(ctx, origin) {
            let woken = match queue {
                QueueSelector::Queue(q) if iface.is_queue_stopped(q) => iface.wake_queue_local(queue),
                QueueSelector::Queue(_) => 0,
                QueueSelector::All => iface.wake_queue_local(queue),
            };
            if woken > 0 {
                affected += 1;
            }
        }
        ctx.broadcast_queue_wake();
        trace!(origin = %origin.name(), ?queue, affected, "propagated queue wake");
        affected
    }

    fn peers<'a>(
        ctx: &SwitchContext,
        origin: &'a LogicalInterface,
    ) -> impl Iterator<Item = std::sync::Arc<LogicalInterface>> + 'a {
        let slots = ctx.slot_snapshot();
        (0..slots.len())
            .filter_map(move |i| slots[i].as_ref().and_then(Weak::upgrade))
            .filter(move |iface| !std::ptr::eq(iface.as_ref(), origin) && iface.is_running())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use swvirt_chip::{SimulatedProbe, SimulatedSwitch, SwitchChip};
    use swvirt_common::SwvirtConfig;

    use crate::interface::QueueState;
    use crate::namespace::InterfaceNamespace;
    use crate::registry::VirtualInterfaceRegistry;

    fn registry(ports: u16, tx_queues: u16) -> VirtualInterfaceRegistry {
        let chip: Arc<dyn SwitchChip> =
            Arc::new(SimulatedSwitch::builder().port_count(ports).build());
        let mut config = SwvirtConfig::default();
        config.interface.tx_queues = tx_queues;
        let mut registry = VirtualInterfaceRegistry::attach(
            Some(chip),
            &SimulatedProbe::empty(),
            Arc::new(InterfaceNamespace::new(16)),
            &config,
        )
        .unwrap();
        registry.expand(ports, 1500).unwrap();
        for iface in registry.interfaces() {
            iface.open().unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_stop_skips_origin_and_closed() {
        let reg = registry(4, 1);
        let primary = Arc::clone(reg.primary());
        reg.sibling(2).unwrap().close().unwrap();

        let affected = QueueFlowController::stop_queue(reg.context(), &primary, QueueSelector::Queue(0));
        assert_eq!(affected, 2);
        assert!(!primary.is_queue_stopped(0));
        assert!(reg.sibling(1).unwrap().is_queue_stopped(0));
        assert!(reg.sibling(3).unwrap().is_queue_stopped(0));
    }

    #[tokio::test]
    async fn test_wake_restores_only_stopped_queues() {
        let reg = registry(3, 2);
        let primary = Arc::clone(reg.primary());
        let ctx = reg.context();

        QueueFlowController::stop_queue(ctx, &primary, QueueSelector::Queue(1));
        let woken = QueueFlowController::wake_queue(ctx, &primary, QueueSelector::Queue(0));
        assert_eq!(woken, 0);
        assert_eq!(ctx.wake_broadcasts(), 1);

        let woken = QueueFlowController::wake_queue(ctx, &primary, QueueSelector::Queue(1));
        assert_eq!(woken, 2);
        assert_eq!(ctx.wake_broadcasts(), 2);
        for sibling in reg.siblings() {
            assert_eq!(sibling.queue_states(), vec![QueueState::Active; 2]);
        }
    }

    #[tokio::test]
    async fn test_wake_all_is_unconditional() {
        let reg = registry(2, 4);
        let primary = Arc::clone(reg.primary());
        let sibling = reg.sibling(1).unwrap();

        sibling.stop_queue_local(QueueSelector::Queue(3));
        let woken = QueueFlowController::wake_queue(reg.context(), &primary, QueueSelector::All);
        assert_eq!(woken, 1);
        assert_eq!(sibling.queue_states(), vec![QueueState::Active; 4]);
        assert_eq!(reg.context().wake_broadcasts(), 1);
    }

    #[tokio::test]
    async fn test_single_interface_still_broadcasts() {
        let reg = registry(1, 1);
        let primary = Arc::clone(reg.primary());
        assert_eq!(
            QueueFlowController::stop_queue(reg.context(), &primary, QueueSelector::All),
            0
        );
        assert_eq!(
            QueueFlowController::wake_queue(reg.context(), &primary, QueueSelector::All),
            0
        );
        assert_eq!(reg.context().wake_broadcasts(), 1);
    }
}

//! Per-chip shared state.
//!
//! A [`SwitchContext`] exists once per attached chip. Every logical interface
//! on the chip holds an `Arc` to it. Mutable chip-wide state lives in
//! [`ChipState`] behind the chip lock; the transmit completion path never
//! takes that lock and reads a copy-on-write snapshot of the slot table
//! instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, info};

use swvirt_chip::{FeatureFlags, PromiscLevel, SwitchChip};
use swvirt_common::{SwitchError, SwitchResult};

use crate::interface::{InterfaceSnapshot, LogicalInterface};
use crate::mtu::MtuNegotiator;
use crate::promisc::{PromiscuityArbiter, PromiscuityState};

/// Chip layout resolved once at attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// Chip identifier.
    pub name: String,
    /// Ports exposed as logical interfaces.
    pub port_count: u16,
    /// Additional ports hidden from the host.
    pub device_offset: u16,
    /// Largest frame the chip forwards.
    pub mtu_limit: u32,
    /// Tagging overhead on the host port.
    pub mtu_overhead: u32,
    /// Optional capabilities.
    pub features: FeatureFlags,
}

impl ChipInfo {
    /// Reads the layout from the chip.
    pub fn resolve(chip: &dyn SwitchChip) -> SwitchResult<Self> {
        let port_count = chip
            .enumerate_ports()
            .map_err(|e| SwitchError::attach(format!("port enumeration failed: {}", e)))?;
        if port_count == 0 {
            return Err(SwitchError::attach(format!(
                "chip {} reports no ports",
                chip.name()
            )));
        }
        Ok(Self {
            name: chip.name().to_string(),
            port_count,
            device_offset: chip.device_offset(),
            mtu_limit: chip.mtu_limit(),
            mtu_overhead: chip.mtu_overhead(),
            features: chip.features(),
        })
    }

    /// Number of interface slots, including the hidden ports.
    pub fn slot_count(&self) -> usize {
        usize::from(self.port_count) + usize::from(self.device_offset)
    }

    /// Feature names as written in configuration files.
    pub fn feature_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.features.contains(FeatureFlags::PTP) {
            names.push("ptp");
        }
        if self.features.contains(FeatureFlags::DLR) {
            names.push("dlr");
        }
        names
    }
}

/// State mutated only under the chip lock.
#[derive(Debug)]
pub(crate) struct ChipState {
    /// Interface slots, indexed by port.
    pub(crate) interfaces: Vec<Option<Weak<LogicalInterface>>>,
    pub(crate) promisc: PromiscuityState,
    /// Set once teardown has begun; no new deferred work is scheduled.
    pub(crate) detaching: bool,
}

/// Chip-wide status for the management surface.
#[derive(Debug, Clone, Serialize)]
pub struct ChipSnapshot {
    pub chip: String,
    pub port_count: u16,
    pub device_offset: u16,
    pub mtu_ceiling: u32,
    pub features: Vec<&'static str>,
    pub promisc_level: PromiscLevel,
    pub correction_pending: bool,
    pub wake_broadcasts: u64,
    pub interfaces: Vec<InterfaceSnapshot>,
}

/// Shared state of one attached switch chip.
pub struct SwitchContext {
    chip: Arc<dyn SwitchChip>,
    info: ChipInfo,
    runtime: Handle,
    negotiator: MtuNegotiator,
    arbiter: PromiscuityArbiter,
    state: Mutex<ChipState>,
    slots: RwLock<Arc<[Option<Weak<LogicalInterface>>]>>,
    queue_wait: Notify,
    wake_broadcasts: AtomicU64,
}

impl std::fmt::Debug for SwitchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchContext")
            .field("chip", &self.chip)
            .field("info", &self.info)
            .field("arbiter", &self.arbiter)
            .finish_non_exhaustive()
    }
}

impl SwitchContext {
    pub(crate) fn new(
        chip: Arc<dyn SwitchChip>,
        info: ChipInfo,
        runtime: Handle,
        reset_delay: Duration,
    ) -> Arc<Self> {
        let slot_count = info.slot_count();
        let interfaces = vec![None; slot_count];
        let slots: Arc<[Option<Weak<LogicalInterface>>]> = Arc::from(interfaces.clone());

        info!(
            chip = %info.name,
            ports = info.port_count,
            device_offset = info.device_offset,
            "Created switch context"
        );

        Arc::new(Self {
            chip,
            info,
            runtime,
            negotiator: MtuNegotiator::new(),
            arbiter: PromiscuityArbiter::new(reset_delay),
            state: Mutex::new(ChipState {
                interfaces,
                promisc: PromiscuityState::default(),
                detaching: false,
            }),
            slots: RwLock::new(slots),
            queue_wait: Notify::new(),
            wake_broadcasts: AtomicU64::new(0),
        })
    }

    /// The bound chip.
    pub fn chip(&self) -> &Arc<dyn SwitchChip> {
        &self.chip
    }

    /// Layout resolved at attach.
    pub fn info(&self) -> &ChipInfo {
        &self.info
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn arbiter(&self) -> &PromiscuityArbiter {
        &self.arbiter
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock()
    }

    /// MTU ceiling for interfaces on this chip.
    pub fn mtu_ceiling(&self) -> u32 {
        self.negotiator.ceiling(Some(self.chip.as_ref()))
    }

    /// Clamps `requested` to the MTU ceiling.
    pub fn clamp_mtu(&self, requested: u32) -> u32 {
        self.negotiator.clamp(Some(self.chip.as_ref()), requested)
    }

    /// Validates and clamps an MTU request.
    pub fn admit_mtu(&self, requested: u32) -> SwitchResult<u32> {
        self.negotiator.admit(Some(self.chip.as_ref()), requested)
    }

    /// Binds or clears a slot and republishes the slot snapshot.
    ///
    /// Must be called with the chip lock held.
    pub(crate) fn publish_slot(
        &self,
        state: &mut ChipState,
        slot: usize,
        iface: Option<&Arc<LogicalInterface>>,
    ) {
        if let Some(entry) = state.interfaces.get_mut(slot) {
            *entry = iface.map(Arc::downgrade);
            *self.slots.write() = Arc::from(state.interfaces.clone());
            debug!(chip = %self.info.name, slot, bound = iface.is_some(), "published slot");
        }
    }

    /// Lock-free view of the slot table for the completion path.
    pub(crate) fn slot_snapshot(&self) -> Arc<[Option<Weak<LogicalInterface>>]> {
        Arc::clone(&self.slots.read())
    }

    /// Live interfaces in slot order.
    pub fn interfaces(&self) -> Vec<Arc<LogicalInterface>> {
        self.slot_snapshot()
            .iter()
            .flatten()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// The interface bound to `port`, if any.
    pub fn interface(&self, port: u16) -> Option<Arc<LogicalInterface>> {
        self.slot_snapshot()
            .get(usize::from(port))
            .and_then(|slot| slot.as_ref())
            .and_then(Weak::upgrade)
    }

    /// Chip-wide promiscuity as last reported by the chip.
    pub fn promisc_level(&self) -> PromiscLevel {
        self.state.lock().promisc.requested_level
    }

    /// Returns true while a promiscuity correction is scheduled.
    pub fn correction_pending(&self) -> bool {
        self.state.lock().promisc.is_pending()
    }

    /// Wakes every task waiting for transmit capacity on any interface.
    pub(crate) fn broadcast_queue_wake(&self) {
        self.wake_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.queue_wait.notify_waiters();
    }

    /// Future that completes at the next queue wake broadcast.
    ///
    /// The future observes broadcasts issued any time after it is created,
    /// even before it is first polled.
    pub fn wait_queue_available(&self) -> Notified<'_> {
        self.queue_wait.notified()
    }

    /// Number of queue wake broadcasts issued so far.
    pub fn wake_broadcasts(&self) -> u64 {
        self.wake_broadcasts.load(Ordering::Relaxed)
    }

    /// Status of one port.
    pub fn port_snapshot(&self, port: u16) -> Option<InterfaceSnapshot> {
        self.interface(port).map(|iface| iface.snapshot())
    }

    /// Status of every live interface.
    pub fn snapshots(&self) -> Vec<InterfaceSnapshot> {
        self.interfaces().iter().map(|iface| iface.snapshot()).collect()
    }

    /// Chip-wide status.
    pub fn chip_snapshot(&self) -> ChipSnapshot {
        let (promisc_level, correction_pending) = {
            let state = self.state.lock();
            (state.promisc.requested_level, state.promisc.is_pending())
        };
        ChipSnapshot {
            chip: self.info.name.clone(),
            port_count: self.info.port_count,
            device_offset: self.info.device_offset,
            mtu_ceiling: self.mtu_ceiling(),
            features: self.info.feature_names(),
            promisc_level,
            correction_pending,
            wake_broadcasts: self.wake_broadcasts(),
            interfaces: self.snapshots(),
        }
    }

    /// Brings a port administratively up or down.
    pub fn set_port_admin(&self, port: u16, up: bool) -> SwitchResult<()> {
        let iface = self
            .interface(port)
            .ok_or(SwitchError::InterfaceNotFound { port })?;
        if up {
            iface.open()
        } else {
            iface.close()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swvirt_chip::SimulatedSwitch;

    fn context(ports: u16, offset: u16) -> Arc<SwitchContext> {
        let chip: Arc<dyn SwitchChip> = Arc::new(
            SimulatedSwitch::builder()
                .port_count(ports)
                .device_offset(offset)
                .features(FeatureFlags::PTP)
                .build(),
        );
        let info = ChipInfo::resolve(chip.as_ref()).unwrap();
        SwitchContext::new(chip, info, Handle::current(), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_slot_count_includes_offset() {
        let ctx = context(3, 1);
        assert_eq!(ctx.info().slot_count(), 4);
        assert_eq!(ctx.slot_snapshot().len(), 4);
        assert!(ctx.interfaces().is_empty());
        assert!(ctx.interface(0).is_none());
        assert!(ctx.interface(9).is_none());
    }

    #[test]
    fn test_resolve_rejects_empty_chip() {
        let chip = SimulatedSwitch::builder().port_count(0).build();
        assert!(matches!(
            ChipInfo::resolve(&chip),
            Err(SwitchError::Attach { .. })
        ));
    }

    #[test]
    fn test_resolve_enumeration_failure() {
        let chip = SimulatedSwitch::builder().build();
        chip.set_fail_enumerate(true);
        let err = ChipInfo::resolve(&chip).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("port enumeration failed"));
    }

    #[tokio::test]
    async fn test_broadcast_counts_and_wakes() {
        let ctx = context(2, 0);
        let waiter = ctx.wait_queue_available();
        ctx.broadcast_queue_wake();
        waiter.await;
        assert_eq!(ctx.wake_broadcasts(), 1);
    }

    #[tokio::test]
    async fn test_chip_snapshot_defaults() {
        let ctx = context(2, 0);
        let snap = ctx.chip_snapshot();
        assert_eq!(snap.promisc_level, PromiscLevel::Off);
        assert!(!snap.correction_pending);
        assert_eq!(snap.features, vec!["ptp"]);
        assert_eq!(snap.mtu_ceiling, 3046);
    }

    #[tokio::test]
    async fn test_set_port_admin_unknown_port() {
        let ctx = context(2, 0);
        assert!(matches!(
            ctx.set_port_admin(1, true),
            Err(SwitchError::InterfaceNotFound { port: 1 })
        ));
    }
}

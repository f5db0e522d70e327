//! Logical network interfaces.
//!
//! Each switch port is exposed as one [`LogicalInterface`]. Port 0 is the
//! primary and owns the shared transport; siblings hold an `Arc` to it so the
//! primary is always released last.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, trace};

use swvirt_chip::{LinkListener, LinkStatus, MacAddress};
use swvirt_common::{SwitchError, SwitchResult};

use crate::context::SwitchContext;
use crate::queue_flow::QueueFlowController;

/// Number of valid 802.1Q VLAN ids.
pub const VLAN_N_VID: u16 = 4096;

/// Where an interface sits on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortBinding {
    /// Switch port index; 0 is the primary.
    pub port_index: u16,
    /// Slot in the chip's interface table.
    pub slot: usize,
}

impl PortBinding {
    /// Binding of `port` in the slot of the same index.
    pub fn new(port_index: u16) -> Self {
        Self {
            port_index,
            slot: usize::from(port_index),
        }
    }
}

/// Selects one transmit queue or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSelector {
    /// A single queue.
    Queue(u16),
    /// Every queue of the interface.
    All,
}

/// Transmit queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Active,
    Stopped,
}

/// Receive filter derived from the promiscuous flag and multicast list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RxFilterMode {
    /// Accept every frame.
    Promiscuous,
    /// Accept the station address, broadcast and the listed groups.
    Filtered { groups: Vec<MacAddress> },
}

#[derive(Debug)]
struct RxFilter {
    promiscuous: bool,
    groups: Vec<MacAddress>,
    mode: RxFilterMode,
    recomputations: u64,
}

impl RxFilter {
    fn new() -> Self {
        Self {
            promiscuous: false,
            groups: Vec::new(),
            mode: RxFilterMode::Filtered { groups: Vec::new() },
            recomputations: 0,
        }
    }

    fn recompute(&mut self) {
        self.mode = if self.promiscuous {
            RxFilterMode::Promiscuous
        } else {
            RxFilterMode::Filtered {
                groups: self.groups.clone(),
            }
        };
        self.recomputations += 1;
    }
}

/// Parameters for a new interface.
#[derive(Debug, Clone)]
pub(crate) struct InterfaceParams {
    pub(crate) port: u16,
    pub(crate) name: String,
    pub(crate) address: MacAddress,
    pub(crate) mtu: u32,
    pub(crate) tx_queues: u16,
    pub(crate) rx_queues: u16,
    pub(crate) link: LinkStatus,
}

/// Serializable status of one interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceSnapshot {
    pub port: u16,
    pub name: String,
    pub primary: bool,
    pub address: MacAddress,
    pub mtu: u32,
    pub running: bool,
    pub carrier: bool,
    pub link: LinkStatus,
    pub promiscuous: bool,
    pub rx_filter: RxFilterMode,
    pub queues: Vec<QueueState>,
    pub vlans: Vec<u16>,
    pub queue_stops: u64,
    pub queue_wakes: u64,
}

/// One per-port network interface.
pub struct LogicalInterface {
    binding: PortBinding,
    name: String,
    ctx: Arc<SwitchContext>,
    /// Set on siblings only.
    primary: Option<Arc<LogicalInterface>>,
    attached: AtomicBool,
    address: Mutex<MacAddress>,
    /// Unicast filter of the shared transport; primary only.
    station_address: Mutex<Option<MacAddress>>,
    mtu: AtomicU32,
    running: AtomicBool,
    carrier: AtomicBool,
    link: Mutex<LinkStatus>,
    rx_queues: u16,
    tx_stopped: Box<[AtomicBool]>,
    tx_wake: Notify,
    rx_filter: Mutex<RxFilter>,
    vlans: Mutex<BTreeSet<u16>>,
    queue_stops: AtomicU64,
    queue_wakes: AtomicU64,
}

impl fmt::Debug for LogicalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalInterface")
            .field("name", &self.name)
            .field("binding", &self.binding)
            .field("primary", &self.is_primary())
            .finish_non_exhaustive()
    }
}

impl LogicalInterface {
    pub(crate) fn new_primary(ctx: Arc<SwitchContext>, params: InterfaceParams) -> Arc<Self> {
        let address = params.address;
        Self::build(ctx, None, Some(address), params)
    }

    pub(crate) fn new_sibling(primary: &Arc<LogicalInterface>, params: InterfaceParams) -> Arc<Self> {
        Self::build(
            Arc::clone(&primary.ctx),
            Some(Arc::clone(primary)),
            None,
            params,
        )
    }

    fn build(
        ctx: Arc<SwitchContext>,
        primary: Option<Arc<LogicalInterface>>,
        station_address: Option<MacAddress>,
        params: InterfaceParams,
    ) -> Arc<Self> {
        let tx_stopped = (0..params.tx_queues.max(1))
            .map(|_| AtomicBool::new(false))
            .collect();
        Arc::new(Self {
            binding: PortBinding::new(params.port),
            name: params.name,
            ctx,
            primary,
            attached: AtomicBool::new(true),
            address: Mutex::new(params.address),
            station_address: Mutex::new(station_address),
            mtu: AtomicU32::new(params.mtu),
            running: AtomicBool::new(false),
            carrier: AtomicBool::new(false),
            link: Mutex::new(params.link),
            rx_queues: params.rx_queues.max(1),
            tx_stopped,
            tx_wake: Notify::new(),
            rx_filter: Mutex::new(RxFilter::new()),
            vlans: Mutex::new(BTreeSet::new()),
            queue_stops: AtomicU64::new(0),
            queue_wakes: AtomicU64::new(0),
        })
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port binding.
    pub fn binding(&self) -> PortBinding {
        self.binding
    }

    /// Switch port index.
    pub fn port_index(&self) -> u16 {
        self.binding.port_index
    }

    /// Returns true for the interface that owns the shared transport.
    pub fn is_primary(&self) -> bool {
        self.primary.is_none()
    }

    /// The primary interface of the chip; `None` on the primary itself.
    pub fn primary(&self) -> Option<&Arc<LogicalInterface>> {
        self.primary.as_ref()
    }

    /// Chip this interface is bound to.
    pub fn context(&self) -> &Arc<SwitchContext> {
        &self.ctx
    }

    /// Returns false once the interface has been torn down.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn mark_detached(&self) {
        self.attached.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }

    fn ensure_attached(&self) -> SwitchResult<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(SwitchError::InterfaceNotFound {
                port: self.port_index(),
            })
        }
    }

    /// Current hardware address.
    pub fn address(&self) -> MacAddress {
        *self.address.lock()
    }

    /// Station address programmed into the shared transport.
    pub fn station_address(&self) -> Option<MacAddress> {
        *self.station_address.lock()
    }

    /// Current MTU.
    pub fn mtu(&self) -> u32 {
        self.mtu.load(Ordering::Relaxed)
    }

    /// Returns true while the interface is open.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns true while the port reports carrier.
    pub fn has_carrier(&self) -> bool {
        self.carrier.load(Ordering::Acquire)
    }

    /// Last link state reported for the port.
    pub fn link(&self) -> LinkStatus {
        *self.link.lock()
    }

    /// Number of transmit queues.
    pub fn tx_queue_count(&self) -> u16 {
        u16::try_from(self.tx_stopped.len()).unwrap_or(u16::MAX)
    }

    /// Number of receive queues.
    pub fn rx_queue_count(&self) -> u16 {
        self.rx_queues
    }

    /// Returns true if `queue` exists and is stopped.
    pub fn is_queue_stopped(&self, queue: u16) -> bool {
        self.tx_stopped
            .get(usize::from(queue))
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// State of every transmit queue.
    pub fn queue_states(&self) -> Vec<QueueState> {
        self.tx_stopped
            .iter()
            .map(|flag| {
                if flag.load(Ordering::Acquire) {
                    QueueState::Stopped
                } else {
                    QueueState::Active
                }
            })
            .collect()
    }

    /// Returns true while the receive path is promiscuous.
    pub fn is_promiscuous(&self) -> bool {
        self.rx_filter.lock().promiscuous
    }

    /// Current receive filter.
    pub fn rx_filter_mode(&self) -> RxFilterMode {
        self.rx_filter.lock().mode.clone()
    }

    /// Number of times the receive filter has been recomputed.
    pub fn rx_filter_recomputations(&self) -> u64 {
        self.rx_filter.lock().recomputations
    }

    /// VLAN ids registered through this interface.
    pub fn vlans(&self) -> Vec<u16> {
        self.vlans.lock().iter().copied().collect()
    }

    /// Assigns a hardware address.
    ///
    /// The chip reports the resulting host-port promiscuity, which is
    /// arbitrated chip-wide.
    #[instrument(skip(self), fields(iface = %self.name))]
    pub fn set_address(self: &Arc<Self>, address: MacAddress) -> SwitchResult<()> {
        self.ensure_attached()?;
        if !address.is_valid_unicast() {
            return Err(SwitchError::InvalidAddress { address });
        }
        self.ctx.arbiter().set_address(self, address)
    }

    /// Sets the MTU, clamped to the chip ceiling. Returns the applied MTU.
    #[instrument(skip(self), fields(iface = %self.name))]
    pub fn set_mtu(&self, requested: u32) -> SwitchResult<u32> {
        self.ensure_attached()?;
        let applied = self.ctx.admit_mtu(requested)?;
        self.mtu.store(applied, Ordering::Relaxed);
        if applied < requested {
            debug!(requested, applied, "MTU clamped to chip ceiling");
        }
        Ok(applied)
    }

    /// Adds `vid` to the chip's VLAN table.
    #[instrument(skip(self), fields(iface = %self.name))]
    pub fn add_vlan_id(&self, vid: u16) -> SwitchResult<()> {
        self.ensure_attached()?;
        if vid >= VLAN_N_VID {
            return Err(SwitchError::InvalidVlan { vid });
        }
        self.ctx
            .chip()
            .add_vlan(vid)
            .map_err(|e| SwitchError::chip("add_vlan", e))?;
        self.vlans.lock().insert(vid);
        Ok(())
    }

    /// Removes `vid` from the chip's VLAN table.
    #[instrument(skip(self), fields(iface = %self.name))]
    pub fn remove_vlan_id(&self, vid: u16) -> SwitchResult<()> {
        self.ensure_attached()?;
        if vid >= VLAN_N_VID {
            return Err(SwitchError::InvalidVlan { vid });
        }
        self.ctx
            .chip()
            .remove_vlan(vid)
            .map_err(|e| SwitchError::chip("remove_vlan", e))?;
        self.vlans.lock().remove(&vid);
        Ok(())
    }

    /// Opens the interface and starts all of its transmit queues.
    #[instrument(skip(self), fields(iface = %self.name))]
    pub fn open(&self) -> SwitchResult<()> {
        self.ensure_attached()?;
        for flag in self.tx_stopped.iter() {
            flag.store(false, Ordering::Release);
        }
        self.running.store(true, Ordering::Release);
        self.tx_wake.notify_waiters();
        info!("Interface opened");
        Ok(())
    }

    /// Stops all transmit queues and closes the interface.
    #[instrument(skip(self), fields(iface = %self.name))]
    pub fn close(&self) -> SwitchResult<()> {
        self.ensure_attached()?;
        self.running.store(false, Ordering::Release);
        for flag in self.tx_stopped.iter() {
            flag.store(true, Ordering::Release);
        }
        info!("Interface closed");
        Ok(())
    }

    /// Subscribes the interface to a multicast group.
    pub fn join_multicast(&self, group: MacAddress) -> SwitchResult<()> {
        self.ensure_attached()?;
        if !group.is_multicast() {
            return Err(SwitchError::InvalidAddress { address: group });
        }
        let mut filter = self.rx_filter.lock();
        if !filter.groups.contains(&group) {
            filter.groups.push(group);
            filter.recompute();
        }
        Ok(())
    }

    /// Unsubscribes the interface from a multicast group.
    pub fn leave_multicast(&self, group: MacAddress) -> SwitchResult<()> {
        self.ensure_attached()?;
        let mut filter = self.rx_filter.lock();
        let before = filter.groups.len();
        filter.groups.retain(|g| *g != group);
        if filter.groups.len() != before {
            filter.recompute();
        }
        Ok(())
    }

    /// Transmit completion path: the shared hardware queue filled up.
    ///
    /// Stops the queue here and on every running sibling.
    pub fn on_tx_queue_full(&self, queue: QueueSelector) -> usize {
        self.stop_queue_local(queue);
        QueueFlowController::stop_queue(&self.ctx, self, queue)
    }

    /// Transmit completion path: the shared hardware queue drained.
    ///
    /// Wakes the queue here and on every running sibling.
    pub fn on_tx_queue_drained(&self, queue: QueueSelector) -> usize {
        match queue {
            QueueSelector::Queue(q) => {
                if self.is_queue_stopped(q) {
                    self.wake_queue_local(queue);
                }
            }
            QueueSelector::All => {
                self.wake_queue_local(queue);
            }
        }
        QueueFlowController::wake_queue(&self.ctx, self, queue)
    }

    /// Waits until `queue` can accept frames again.
    ///
    /// Returns immediately for unknown queues.
    pub async fn wait_queue_active(&self, queue: u16) {
        loop {
            let notified = self.tx_wake.notified();
            if !self.is_queue_stopped(queue) {
                return;
            }
            notified.await;
        }
    }

    /// Marks queues stopped. Returns the number of queues that changed.
    pub(crate) fn stop_queue_local(&self, queue: QueueSelector) -> usize {
        let changed = self
            .select(queue)
            .filter(|flag| !flag.swap(true, Ordering::AcqRel))
            .count();
        if changed > 0 {
            self.queue_stops.fetch_add(1, Ordering::Relaxed);
            trace!(iface = %self.name, ?queue, changed, "stopped tx queue");
        }
        changed
    }

    /// Marks queues active and notifies blocked senders.
    pub(crate) fn wake_queue_local(&self, queue: QueueSelector) -> usize {
        let changed = self
            .select(queue)
            .filter(|flag| flag.swap(false, Ordering::AcqRel))
            .count();
        self.queue_wakes.fetch_add(1, Ordering::Relaxed);
        self.tx_wake.notify_waiters();
        trace!(iface = %self.name, ?queue, changed, "woke tx queue");
        changed
    }

    fn select(&self, queue: QueueSelector) -> impl Iterator<Item = &AtomicBool> {
        let range = match queue {
            QueueSelector::Queue(q) => {
                let q = usize::from(q);
                q.min(self.tx_stopped.len())..(q + 1).min(self.tx_stopped.len())
            }
            QueueSelector::All => 0..self.tx_stopped.len(),
        };
        self.tx_stopped[range].iter()
    }

    pub(crate) fn store_address(&self, address: MacAddress) -> MacAddress {
        std::mem::replace(&mut *self.address.lock(), address)
    }

    /// Programs the shared transport's unicast filter. Primary only.
    pub(crate) fn program_station_address(&self, address: MacAddress) {
        if self.is_primary() {
            *self.station_address.lock() = Some(address);
            debug!(iface = %self.name, %address, "programmed station address");
        }
    }

    pub(crate) fn set_promiscuous(&self, promiscuous: bool) {
        self.rx_filter.lock().promiscuous = promiscuous;
    }

    pub(crate) fn recompute_rx_filter(&self) {
        self.rx_filter.lock().recompute();
    }

    fn apply_link(&self, status: LinkStatus) {
        *self.link.lock() = status;
        self.carrier.store(status.up, Ordering::Release);
        info!(
            iface = %self.name,
            up = status.up,
            speed = status.speed_mbps,
            full_duplex = status.full_duplex,
            "Link changed"
        );
    }

    /// Serializable status.
    pub fn snapshot(&self) -> InterfaceSnapshot {
        InterfaceSnapshot {
            port: self.port_index(),
            name: self.name.clone(),
            primary: self.is_primary(),
            address: self.address(),
            mtu: self.mtu(),
            running: self.is_running(),
            carrier: self.has_carrier(),
            link: self.link(),
            promiscuous: self.is_promiscuous(),
            rx_filter: self.rx_filter_mode(),
            queues: self.queue_states(),
            vlans: self.vlans(),
            queue_stops: self.queue_stops.load(Ordering::Relaxed),
            queue_wakes: self.queue_wakes.load(Ordering::Relaxed),
        }
    }
}

/// Forwards PHY link events to an interface without keeping it alive.
#[derive(Debug)]
pub struct LinkForwarder {
    target: Weak<LogicalInterface>,
}

impl LinkForwarder {
    /// Creates a forwarder for `iface`.
    pub fn new(iface: &Arc<LogicalInterface>) -> Self {
        Self {
            target: Arc::downgrade(iface),
        }
    }
}

impl LinkListener for LinkForwarder {
    fn link_changed(&self, port: u16, status: LinkStatus) {
        match self.target.upgrade() {
            Some(iface) if iface.is_attached() => iface.apply_link(status),
            _ => trace!(port, "link event for released interface"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use swvirt_chip::{SimulatedSwitch, SwitchChip};
    use tokio::runtime::Handle;

    use crate::context::ChipInfo;

    fn primary_with(chip: SimulatedSwitch, tx_queues: u16) -> Arc<LogicalInterface> {
        let chip: Arc<dyn SwitchChip> = Arc::new(chip);
        let info = ChipInfo::resolve(chip.as_ref()).unwrap();
        let ctx = SwitchContext::new(chip, info, Handle::current(), Duration::from_millis(100));
        LogicalInterface::new_primary(
            ctx,
            InterfaceParams {
                port: 0,
                name: "eth0".to_string(),
                address: "02:10:a1:00:00:01".parse().unwrap(),
                mtu: 1500,
                tx_queues,
                rx_queues: 1,
                link: LinkStatus::down(),
            },
        )
    }

    fn primary() -> Arc<LogicalInterface> {
        primary_with(SimulatedSwitch::builder().build(), 1)
    }

    #[tokio::test]
    async fn test_new_primary_defaults() {
        let iface = primary();
        assert!(iface.is_primary());
        assert!(iface.primary().is_none());
        assert_eq!(iface.port_index(), 0);
        assert_eq!(iface.binding(), PortBinding { port_index: 0, slot: 0 });
        assert!(!iface.is_running());
        assert!(!iface.has_carrier());
        assert_eq!(iface.queue_states(), vec![QueueState::Active]);
        assert_eq!(iface.station_address(), Some(iface.address()));
    }

    #[tokio::test]
    async fn test_set_mtu_clamps() {
        let iface = primary();
        assert_eq!(iface.set_mtu(9000).unwrap(), 3046);
        assert_eq!(iface.mtu(), 3046);
        assert_eq!(iface.set_mtu(1400).unwrap(), 1400);
        assert!(matches!(
            iface.set_mtu(20),
            Err(SwitchError::InvalidMtu { requested: 20, .. })
        ));
        assert_eq!(iface.mtu(), 1400);
    }

    #[tokio::test]
    async fn test_vlan_ids() {
        let iface = primary();
        iface.add_vlan_id(10).unwrap();
        iface.add_vlan_id(4095).unwrap();
        assert!(matches!(
            iface.add_vlan_id(4096),
            Err(SwitchError::InvalidVlan { vid: 4096 })
        ));
        iface.remove_vlan_id(10).unwrap();
        assert_eq!(iface.vlans(), vec![4095]);
    }

    #[tokio::test]
    async fn test_open_close_queue_state() {
        let iface = primary_with(SimulatedSwitch::builder().build(), 2);
        iface.open().unwrap();
        assert!(iface.is_running());
        assert_eq!(iface.queue_states(), vec![QueueState::Active; 2]);

        iface.close().unwrap();
        assert!(!iface.is_running());
        assert_eq!(iface.queue_states(), vec![QueueState::Stopped; 2]);

        iface.open().unwrap();
        assert_eq!(iface.queue_states(), vec![QueueState::Active; 2]);
    }

    #[tokio::test]
    async fn test_local_queue_transitions() {
        let iface = primary_with(SimulatedSwitch::builder().build(), 4);
        assert_eq!(iface.stop_queue_local(QueueSelector::Queue(2)), 1);
        assert_eq!(iface.stop_queue_local(QueueSelector::Queue(2)), 0);
        assert!(iface.is_queue_stopped(2));
        assert!(!iface.is_queue_stopped(1));

        // Out of range selects nothing.
        assert_eq!(iface.stop_queue_local(QueueSelector::Queue(9)), 0);
        assert!(!iface.is_queue_stopped(9));

        assert_eq!(iface.stop_queue_local(QueueSelector::All), 3);
        assert_eq!(iface.wake_queue_local(QueueSelector::Queue(0)), 1);
        assert_eq!(iface.wake_queue_local(QueueSelector::All), 3);
        assert_eq!(iface.queue_states(), vec![QueueState::Active; 4]);
    }

    #[tokio::test]
    async fn test_completion_path_full_then_drained() {
        let iface = primary_with(SimulatedSwitch::builder().build(), 2);
        iface.open().unwrap();

        assert_eq!(iface.on_tx_queue_full(QueueSelector::Queue(1)), 0);
        assert!(iface.is_queue_stopped(1));
        assert_eq!(iface.on_tx_queue_drained(QueueSelector::Queue(1)), 0);
        assert!(!iface.is_queue_stopped(1));

        iface.on_tx_queue_full(QueueSelector::All);
        assert_eq!(iface.queue_states(), vec![QueueState::Stopped; 2]);
        assert_eq!(iface.on_tx_queue_drained(QueueSelector::All), 0);
        assert_eq!(iface.queue_states(), vec![QueueState::Active; 2]);
        assert_eq!(iface.context().wake_broadcasts(), 2);
    }

    #[tokio::test]
    async fn test_wait_queue_active_resumes_on_wake() {
        let iface = primary();
        iface.stop_queue_local(QueueSelector::Queue(0));

        let waiter = {
            let iface = Arc::clone(&iface);
            tokio::spawn(async move { iface.wait_queue_active(0).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        iface.wake_queue_local(QueueSelector::Queue(0));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_multicast_filter() {
        let iface = primary();
        let group: MacAddress = "01:00:5e:00:00:fb".parse().unwrap();
        iface.join_multicast(group).unwrap();
        iface.join_multicast(group).unwrap();
        assert_eq!(
            iface.rx_filter_mode(),
            RxFilterMode::Filtered {
                groups: vec![group]
            }
        );
        assert_eq!(iface.rx_filter_recomputations(), 1);

        let unicast: MacAddress = "02:00:00:00:00:01".parse().unwrap();
        assert!(matches!(
            iface.join_multicast(unicast),
            Err(SwitchError::InvalidAddress { .. })
        ));

        iface.set_promiscuous(true);
        iface.recompute_rx_filter();
        assert_eq!(iface.rx_filter_mode(), RxFilterMode::Promiscuous);

        iface.set_promiscuous(false);
        iface.leave_multicast(group).unwrap();
        assert_eq!(
            iface.rx_filter_mode(),
            RxFilterMode::Filtered { groups: vec![] }
        );
    }

    #[tokio::test]
    async fn test_detached_interface_rejects_operations() {
        let iface = primary();
        iface.mark_detached();
        assert!(!iface.is_attached());
        assert!(matches!(
            iface.set_mtu(1500),
            Err(SwitchError::InterfaceNotFound { port: 0 })
        ));
        assert!(iface.open().is_err());
    }

    #[tokio::test]
    async fn test_link_forwarder() {
        let iface = primary();
        let forwarder = LinkForwarder::new(&iface);
        forwarder.link_changed(0, LinkStatus::up(100, true));
        assert!(iface.has_carrier());
        assert_eq!(iface.link().speed_mbps, 100);

        forwarder.link_changed(0, LinkStatus::down());
        assert!(!iface.has_carrier());

        drop(iface);
        // Released target is ignored.
        forwarder.link_changed(0, LinkStatus::up(1000, true));
    }
}

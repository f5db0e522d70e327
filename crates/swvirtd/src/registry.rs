//! Creation and teardown of the logical interfaces of one chip.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use swvirt_chip::{LinkStatus, SwitchChip, SwitchProbe};
use swvirt_common::{CreateReason, SwitchError, SwitchResult, SwvirtConfig};

use crate::context::{ChipInfo, SwitchContext};
use crate::interface::{InterfaceParams, LogicalInterface};
use crate::namespace::InterfaceNamespace;
use crate::promisc::PromiscuityArbiter;

/// Link reported by siblings until the PHY layer says otherwise.
const SIBLING_LINK: LinkStatus = LinkStatus {
    up: false,
    speed_mbps: 1000,
    full_duplex: true,
};

/// Owns the primary and sibling interfaces of an attached chip.
#[derive(Debug)]
pub struct VirtualInterfaceRegistry {
    ctx: Arc<SwitchContext>,
    namespace: Arc<InterfaceNamespace>,
    primary: Arc<LogicalInterface>,
    /// Siblings in creation order.
    siblings: Vec<Arc<LogicalInterface>>,
}

impl VirtualInterfaceRegistry {
    /// Binds the primary interface to a chip.
    ///
    /// Uses `bound` when a chip is already bound, otherwise probes the
    /// configured id. Must be called from within a tokio runtime, which
    /// runs the deferred promiscuity work for the lifetime of the chip.
    #[instrument(skip_all, fields(probe_id = config.lifecycle.probe_id))]
    pub fn attach(
        bound: Option<Arc<dyn SwitchChip>>,
        probe: &dyn SwitchProbe,
        namespace: Arc<InterfaceNamespace>,
        config: &SwvirtConfig,
    ) -> SwitchResult<Self> {
        let probe_id = config.lifecycle.probe_id;
        let chip = bound
            .or_else(|| probe.probe(probe_id))
            .ok_or(SwitchError::NoSwitchFound { probe_id })?;

        let runtime = Handle::try_current()
            .map_err(|e| SwitchError::attach(format!("no async runtime: {}", e)))?;
        let info = ChipInfo::resolve(chip.as_ref())?;

        let base_name = config.interface.base_name.clone();
        namespace
            .reserve(&base_name)
            .map_err(|reason| SwitchError::attach(format!("cannot register {}: {}", base_name, reason)))?;

        let ctx = SwitchContext::new(chip, info, runtime, config.reset_delay());
        let primary = LogicalInterface::new_primary(
            Arc::clone(&ctx),
            InterfaceParams {
                port: 0,
                name: base_name,
                address: config.interface.mac_address,
                mtu: ctx.clamp_mtu(config.interface.default_mtu),
                tx_queues: config.interface.tx_queues,
                rx_queues: config.interface.rx_queues,
                link: LinkStatus::down(),
            },
        );
        {
            let mut state = ctx.lock_state();
            ctx.publish_slot(&mut state, primary.binding().slot, Some(&primary));
        }

        info!(
            chip = %ctx.info().name,
            iface = %primary.name(),
            address = %primary.address(),
            mtu = primary.mtu(),
            "Attached primary interface"
        );

        Ok(Self {
            ctx,
            namespace,
            primary,
            siblings: Vec::new(),
        })
    }

    /// Creates one sibling for every port in `1..port_count` that has none.
    ///
    /// On failure the siblings created by this call are removed again, in
    /// reverse order; siblings from earlier calls are kept.
    #[instrument(skip(self), fields(base = %self.primary.name()))]
    pub fn expand(&mut self, port_count: u16, mtu_hint: u32) -> SwitchResult<Vec<Arc<LogicalInterface>>> {
        let mut created: Vec<Arc<LogicalInterface>> = Vec::new();
        for port in 1..port_count {
            if self.sibling(port).is_some() {
                continue;
            }
            match self.create_sibling(port, mtu_hint) {
                Ok(iface) => created.push(iface),
                Err(reason) => {
                    warn!(port, %reason, unwinding = created.len(), "Sibling creation failed");
                    for iface in created.iter().rev() {
                        self.release(iface);
                    }
                    return Err(SwitchError::create(port, reason));
                }
            }
        }

        self.siblings.extend(created.iter().cloned());
        info!(created = created.len(), total = self.siblings.len() + 1, "Expanded interfaces");
        Ok(created)
    }

    fn create_sibling(&self, port: u16, mtu_hint: u32) -> Result<Arc<LogicalInterface>, CreateReason> {
        let port_count = self.ctx.info().port_count;
        if port >= port_count {
            return Err(CreateReason::PortOutOfRange { port_count });
        }

        let name = format!("{}.{}", self.primary.name(), port);
        self.namespace.reserve(&name)?;

        let iface = LogicalInterface::new_sibling(
            &self.primary,
            InterfaceParams {
                port,
                name,
                address: self.primary.address(),
                mtu: self.ctx.clamp_mtu(mtu_hint),
                tx_queues: self.primary.tx_queue_count(),
                rx_queues: self.primary.rx_queue_count(),
                link: SIBLING_LINK,
            },
        );
        {
            let mut state = self.ctx.lock_state();
            self.ctx.publish_slot(&mut state, iface.binding().slot, Some(&iface));
        }
        debug!(iface = %iface.name(), port, mtu = iface.mtu(), "created sibling");
        Ok(iface)
    }

    fn release(&self, iface: &LogicalInterface) {
        iface.mark_detached();
        {
            let mut state = self.ctx.lock_state();
            self.ctx.publish_slot(&mut state, iface.binding().slot, None);
        }
        self.namespace.release(iface.name());
        debug!(iface = %iface.name(), "released interface");
    }

    /// Tears every interface down and returns the ports in release order.
    ///
    /// Siblings go first, newest first. A pending promiscuity correction is
    /// cancelled and awaited before the primary is released.
    pub async fn detach_all(mut self) -> Vec<u16> {
        let mut order = Vec::with_capacity(self.siblings.len() + 1);
        while let Some(sibling) = self.siblings.pop() {
            self.release(&sibling);
            order.push(sibling.port_index());
        }

        if PromiscuityArbiter::drain(&self.ctx).await {
            debug!("pending promiscuity correction drained");
        }

        self.release(&self.primary);
        order.push(self.primary.port_index());
        info!(chip = %self.ctx.info().name, ?order, "Detached all interfaces");
        order
    }

    /// The primary interface.
    pub fn primary(&self) -> &Arc<LogicalInterface> {
        &self.primary
    }

    /// Siblings in creation order.
    pub fn siblings(&self) -> &[Arc<LogicalInterface>] {
        &self.siblings
    }

    /// The sibling bound to `port`.
    pub fn sibling(&self, port: u16) -> Option<Arc<LogicalInterface>> {
        self.siblings
            .iter()
            .find(|iface| iface.port_index() == port)
            .cloned()
    }

    /// Primary followed by the siblings.
    pub fn interfaces(&self) -> Vec<Arc<LogicalInterface>> {
        std::iter::once(&self.primary)
            .chain(self.siblings.iter())
            .cloned()
            .collect()
    }

    /// Shared chip state.
    pub fn context(&self) -> &Arc<SwitchContext> {
        &self.ctx
    }

    /// Name registry the interfaces are registered in.
    pub fn namespace(&self) -> &Arc<InterfaceNamespace> {
        &self.namespace
    }
}

impl Drop for VirtualInterfaceRegistry {
    /// Releases interfaces that were never detached.
    ///
    /// Corrections are cancelled but not awaited; use
    /// [`VirtualInterfaceRegistry::detach_all`] for an orderly teardown.
    fn drop(&mut self) {
        if !self.primary.is_attached() {
            return;
        }
        let cancelled = PromiscuityArbiter::cancel_all(&self.ctx);
        while let Some(sibling) = self.siblings.pop() {
            self.release(&sibling);
        }
        self.release(&self.primary);
        warn!(
            chip = %self.ctx.info().name,
            cancelled,
            "Interfaces dropped without detach; released names and cancelled corrections"
        );
    }
}

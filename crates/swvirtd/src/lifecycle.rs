//! Attach and teardown sequencing.
//!
//! Start-up order:
//! 1. attach the primary interface to the chip
//! 2. bind PHY link events for the primary
//! 3. create one sibling per remaining port
//! 4. attach the management endpoints
//! 5. attach the protocol extensions the chip supports
//!
//! Shutdown runs the same steps backwards, after closing every running
//! interface.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use swvirt_chip::{SwitchChip, SwitchProbe};
use swvirt_common::{SwitchError, SwitchResult, SwvirtConfig};

use crate::context::SwitchContext;
use crate::endpoints::{ManagementEndpoints, ProtocolExtension};
use crate::interface::{LinkForwarder, LogicalInterface};
use crate::namespace::InterfaceNamespace;
use crate::registry::VirtualInterfaceRegistry;

/// A chip brought up by [`LifecycleCoordinator::start`].
#[derive(Debug)]
pub struct AttachedSwitch {
    registry: VirtualInterfaceRegistry,
    extensions: Vec<Arc<dyn ProtocolExtension>>,
    link_bound: bool,
    expansion_error: Option<SwitchError>,
}

impl AttachedSwitch {
    /// The interfaces of the chip.
    pub fn registry(&self) -> &VirtualInterfaceRegistry {
        &self.registry
    }

    /// Shared chip state.
    pub fn context(&self) -> &Arc<SwitchContext> {
        self.registry.context()
    }

    /// Primary followed by the siblings.
    pub fn interfaces(&self) -> Vec<Arc<LogicalInterface>> {
        self.registry.interfaces()
    }

    /// Names of the protocol extensions in service.
    pub fn active_extensions(&self) -> Vec<String> {
        self.extensions.iter().map(|e| e.name().to_string()).collect()
    }

    /// Returns true if PHY link events reach the primary.
    pub fn link_bound(&self) -> bool {
        self.link_bound
    }

    /// Why sibling creation stopped early, if it did.
    pub fn expansion_error(&self) -> Option<&SwitchError> {
        self.expansion_error.as_ref()
    }
}

/// Sequences attach and teardown of a chip and its collaborators.
pub struct LifecycleCoordinator {
    config: SwvirtConfig,
    namespace: Arc<InterfaceNamespace>,
    management: Arc<dyn ManagementEndpoints>,
    extensions: Vec<Arc<dyn ProtocolExtension>>,
}

impl LifecycleCoordinator {
    /// Creates a coordinator without protocol extensions.
    pub fn new(
        config: SwvirtConfig,
        namespace: Arc<InterfaceNamespace>,
        management: Arc<dyn ManagementEndpoints>,
    ) -> Self {
        Self {
            config,
            namespace,
            management,
            extensions: Vec::new(),
        }
    }

    /// Registers a protocol extension.
    pub fn with_extension(mut self, extension: Arc<dyn ProtocolExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &SwvirtConfig {
        &self.config
    }

    /// Attaches a chip and brings up its interfaces and collaborators.
    ///
    /// Only attach failures are returned. A sibling that cannot be created
    /// leaves the chip running with fewer interfaces.
    #[instrument(skip_all, fields(probe_id = self.config.lifecycle.probe_id))]
    pub async fn start(
        &self,
        bound: Option<Arc<dyn SwitchChip>>,
        probe: &dyn SwitchProbe,
    ) -> SwitchResult<AttachedSwitch> {
        let mut registry = VirtualInterfaceRegistry::attach(
            bound,
            probe,
            Arc::clone(&self.namespace),
            &self.config,
        )?;
        let ctx = Arc::clone(registry.context());
        let primary = Arc::clone(registry.primary());
        let port_count = ctx.info().port_count;

        let link_bound = match ctx
            .chip()
            .bind_link_listener(primary.port_index(), Arc::new(LinkForwarder::new(&primary)))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(iface = %primary.name(), error = %e, "Failed to bind link events");
                false
            }
        };

        if primary.tx_queue_count() > 1 && port_count > 1 {
            if self.config.lifecycle.strict_expansion {
                error!(
                    tx_queues = primary.tx_queue_count(),
                    port_count,
                    "Refusing to share a multi-queue transport between interfaces"
                );
                if link_bound {
                    ctx.chip().unbind_link_listener(primary.port_index());
                }
                registry.detach_all().await;
                return Err(SwitchError::attach(format!(
                    "{} transmit queues cannot be shared by {} interfaces",
                    primary.tx_queue_count(),
                    port_count
                )));
            }
            warn!(
                tx_queues = primary.tx_queue_count(),
                port_count,
                "Multi-queue transport shared by several interfaces; queue backpressure is only mirrored per queue index"
            );
        }

        info!(base = %primary.name(), port_count, "Expanding interfaces");
        let expansion_error = match registry.expand(port_count, primary.mtu()) {
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Continuing with fewer interfaces");
                Some(e)
            }
        };

        if let Err(e) = self.management.on_attach(&ctx) {
            warn!(error = %e, "Management endpoints failed to attach");
        }

        let features = ctx.info().features;
        let mut extensions = Vec::new();
        for extension in &self.extensions {
            if !features.contains(extension.required_feature()) {
                info!(extension = %extension.name(), "Chip lacks feature; extension skipped");
                continue;
            }
            match extension.on_attach(&ctx) {
                Ok(()) => extensions.push(Arc::clone(extension)),
                Err(e) => warn!(extension = %extension.name(), error = %e, "Extension failed to attach"),
            }
        }

        info!(
            chip = %ctx.info().name,
            interfaces = registry.interfaces().len(),
            extensions = extensions.len(),
            "Switch attached"
        );

        Ok(AttachedSwitch {
            registry,
            extensions,
            link_bound,
            expansion_error,
        })
    }

    /// Tears a chip down. Returns the ports in release order.
    #[instrument(skip_all)]
    pub async fn shutdown(&self, attached: AttachedSwitch) -> Vec<u16> {
        let AttachedSwitch {
            registry,
            extensions,
            link_bound,
            ..
        } = attached;
        let ctx = Arc::clone(registry.context());

        for iface in registry.interfaces() {
            if iface.is_running() {
                if let Err(e) = iface.close() {
                    warn!(iface = %iface.name(), error = %e, "Failed to close interface");
                }
            }
        }

        if link_bound {
            ctx.chip().unbind_link_listener(registry.primary().port_index());
        }

        for extension in extensions.iter().rev() {
            extension.on_detach(&ctx);
        }
        self.management.on_detach(&ctx);

        let order = registry.detach_all().await;
        info!(chip = %ctx.info().name, released = order.len(), "Switch detached");
        order
    }
}

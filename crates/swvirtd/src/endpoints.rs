//! Hooks for the management surface and the protocol extensions.
//!
//! The lifecycle coordinator calls these after the interfaces exist and
//! before they are torn down. Endpoint failures are logged and never abort
//! an attach.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use swvirt_chip::FeatureFlags;

use crate::context::{ChipSnapshot, SwitchContext};

/// Failure reported by a management or protocol endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Endpoint {endpoint} failed: {message}")]
pub struct EndpointError {
    /// Endpoint name.
    pub endpoint: String,
    /// Error message.
    pub message: String,
}

impl EndpointError {
    /// Creates an endpoint error.
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Status and control surface bound to an attached chip.
pub trait ManagementEndpoints: Send + Sync {
    /// Called once every interface of the chip exists.
    fn on_attach(&self, ctx: &Arc<SwitchContext>) -> Result<(), EndpointError>;

    /// Called before the interfaces are torn down.
    fn on_detach(&self, ctx: &Arc<SwitchContext>);
}

/// Optional protocol support enabled by a chip capability.
pub trait ProtocolExtension: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Capability the chip must report for the extension to attach.
    fn required_feature(&self) -> FeatureFlags;

    /// Called after the management endpoints are attached.
    fn on_attach(&self, ctx: &Arc<SwitchContext>) -> Result<(), EndpointError>;

    /// Called before the management endpoints are detached.
    fn on_detach(&self, ctx: &Arc<SwitchContext>);
}

impl std::fmt::Debug for dyn ProtocolExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProtocolExtension({})", self.name())
    }
}

/// Keeps the attached chip reachable for status queries.
#[derive(Debug, Default)]
pub struct StatusEndpoint {
    attached: Mutex<Option<Arc<SwitchContext>>>,
}

impl StatusEndpoint {
    /// Creates an endpoint with no chip attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a chip is attached.
    pub fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }

    /// Status of the attached chip.
    pub fn snapshot(&self) -> Option<ChipSnapshot> {
        self.attached.lock().as_ref().map(|ctx| ctx.chip_snapshot())
    }

    /// Status of the attached chip as pretty-printed JSON.
    pub fn to_json(&self) -> Result<Option<String>, serde_json::Error> {
        self.snapshot()
            .map(|snapshot| serde_json::to_string_pretty(&snapshot))
            .transpose()
    }
}

impl ManagementEndpoints for StatusEndpoint {
    fn on_attach(&self, ctx: &Arc<SwitchContext>) -> Result<(), EndpointError> {
        let mut attached = self.attached.lock();
        if attached.is_some() {
            return Err(EndpointError::new("status", "a chip is already attached"));
        }
        *attached = Some(Arc::clone(ctx));
        info!(chip = %ctx.info().name, ports = ctx.info().port_count, "Status endpoint attached");
        Ok(())
    }

    fn on_detach(&self, ctx: &Arc<SwitchContext>) {
        let mut attached = self.attached.lock();
        if attached.as_ref().is_some_and(|a| Arc::ptr_eq(a, ctx)) {
            *attached = None;
            info!(chip = %ctx.info().name, "Status endpoint detached");
        }
    }
}

/// Extension that tracks whether a chip capability is in service.
///
/// Stands in for the protocol engines (precision time, ring redundancy)
/// that live outside this daemon.
#[derive(Debug)]
pub struct FeatureEndpoint {
    name: String,
    feature: FeatureFlags,
    active: Mutex<bool>,
}

impl FeatureEndpoint {
    /// Creates an extension for `feature`.
    pub fn new(name: impl Into<String>, feature: FeatureFlags) -> Self {
        Self {
            name: name.into(),
            feature,
            active: Mutex::new(false),
        }
    }

    /// Precision time protocol extension.
    pub fn ptp() -> Self {
        Self::new("ptp", FeatureFlags::PTP)
    }

    /// Device level ring extension.
    pub fn dlr() -> Self {
        Self::new("dlr", FeatureFlags::DLR)
    }

    /// Returns true while attached.
    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }
}

impl ProtocolExtension for FeatureEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_feature(&self) -> FeatureFlags {
        self.feature
    }

    fn on_attach(&self, ctx: &Arc<SwitchContext>) -> Result<(), EndpointError> {
        *self.active.lock() = true;
        info!(extension = %self.name, chip = %ctx.info().name, "Protocol extension attached");
        Ok(())
    }

    fn on_detach(&self, ctx: &Arc<SwitchContext>) {
        *self.active.lock() = false;
        debug!(extension = %self.name, chip = %ctx.info().name, "protocol extension detached");
    }
}

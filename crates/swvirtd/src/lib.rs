//! Switch port virtualization daemon.
//!
//! Exposes every port of a switch chip that sits behind one host transport
//! as its own logical network interface. Addresses, MTU, queue state and
//! lifecycle are per interface; the chip, its promiscuity and the hardware
//! queues stay shared.
//!
//! # Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`VirtualInterfaceRegistry`] | Creates the primary and one sibling per port, tears them down |
//! | [`PromiscuityArbiter`] | Serializes address programming, corrects ambiguous chip answers |
//! | [`MtuNegotiator`] | Computes the MTU ceiling shared by all interfaces |
//! | [`QueueFlowController`] | Mirrors transmit backpressure onto every sibling |
//! | [`LifecycleCoordinator`] | Orders attach and teardown with the endpoints |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swvirtd::{InterfaceNamespace, LifecycleCoordinator, StatusEndpoint};
//!
//! let coordinator = LifecycleCoordinator::new(
//!     config,
//!     Arc::new(InterfaceNamespace::new(64)),
//!     Arc::new(StatusEndpoint::new()),
//! );
//! let attached = coordinator.start(None, &probe).await?;
//! // ...
//! coordinator.shutdown(attached).await;
//! ```

pub mod context;
pub mod endpoints;
pub mod interface;
pub mod lifecycle;
pub mod mtu;
pub mod namespace;
pub mod promisc;
pub mod queue_flow;
pub mod registry;

pub use context::{ChipInfo, ChipSnapshot, SwitchContext};
pub use endpoints::{
    EndpointError, FeatureEndpoint, ManagementEndpoints, ProtocolExtension, StatusEndpoint,
};
pub use interface::{
    InterfaceSnapshot, LinkForwarder, LogicalInterface, PortBinding, QueueSelector, QueueState,
    RxFilterMode,
};
pub use lifecycle::{AttachedSwitch, LifecycleCoordinator};
pub use mtu::{MtuNegotiator, BASELINE_MTU_CEILING};
pub use namespace::InterfaceNamespace;
pub use promisc::PromiscuityArbiter;
pub use queue_flow::QueueFlowController;
pub use registry::VirtualInterfaceRegistry;

//! Host interface namespace.
//!
//! Logical interfaces register their names here before they become visible.
//! The namespace is shared by every chip attached in the process, so two
//! chips cannot hand out the same interface name.

use parking_lot::Mutex;
use tracing::debug;

use swvirt_common::config::MAX_INTERFACE_NAME_LEN;
use swvirt_common::CreateReason;

/// Bounded set of registered interface names.
#[derive(Debug)]
pub struct InterfaceNamespace {
    max_interfaces: usize,
    names: Mutex<Vec<String>>,
}

impl InterfaceNamespace {
    /// Creates a namespace that holds at most `max_interfaces` names.
    pub fn new(max_interfaces: usize) -> Self {
        Self {
            max_interfaces,
            names: Mutex::new(Vec::new()),
        }
    }

    /// Registers `name`.
    pub fn reserve(&self, name: &str) -> Result<(), CreateReason> {
        if name.is_empty() || name.len() > MAX_INTERFACE_NAME_LEN {
            return Err(CreateReason::NameTooLong {
                name: name.to_string(),
            });
        }

        let mut names = self.names.lock();
        if names.iter().any(|n| n == name) {
            return Err(CreateReason::NameConflict {
                name: name.to_string(),
            });
        }
        if names.len() >= self.max_interfaces {
            return Err(CreateReason::NamespaceExhausted {
                limit: self.max_interfaces,
            });
        }
        names.push(name.to_string());
        debug!(name, registered = names.len(), "registered interface name");
        Ok(())
    }

    /// Unregisters `name`. Returns false if it was not registered.
    pub fn release(&self, name: &str) -> bool {
        let mut names = self.names.lock();
        match names.iter().position(|n| n == name) {
            Some(index) => {
                names.remove(index);
                debug!(name, registered = names.len(), "released interface name");
                true
            }
            None => false,
        }
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().iter().any(|n| n == name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.names.lock().clone()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the namespace.
    pub fn capacity(&self) -> usize {
        self.max_interfaces
    }
}

// Proxy Control - Mapping Reconciler
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Resolve the current network to a profile and apply it.
//!
//! [`Reconciler::apply_mapping`] is debounced: rapid calls collapse into a
//! single run with the arguments of the last call. Every run ends with
//! exactly one notification, and every failure path leaves the proxy
//! disabled.

use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::debounce::Debouncer;
use super::mapping::{MappingStore, MappingTarget};
use super::notifier::Notifier;
use crate::models::NetworkIdentity;
use crate::storage::ConfigStore;
use crate::sync::{read, write};
use crate::system::SystemState;

/// Debounce window of [`Reconciler::apply_mapping`].
pub const APPLY_MAPPING_DELAY: Duration = Duration::from_millis(2000);

/// How a reconciliation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The network could not be determined; proxy disabled.
    Unidentified,
    /// A profile was applied and the proxy enabled.
    Applied {
        network: NetworkIdentity,
        profile: String,
    },
    /// The governing entry disables the proxy, or its profile is gone.
    Disabled { network: NetworkIdentity },
    /// Nothing maps this network; proxy disabled.
    NoMapping { network: NetworkIdentity },
    /// Writing the profile failed; proxy disabled.
    Failed {
        network: NetworkIdentity,
        profile: String,
        reason: String,
    },
}

/// Shared state of the reconciler.
pub struct ReconcileCore {
    system: Arc<dyn SystemState>,
    config: Arc<ConfigStore>,
    mappings: Arc<MappingStore>,
    notifier: Arc<dyn Notifier>,
    last_identity: RwLock<Option<NetworkIdentity>>,
}

impl ReconcileCore {
    fn refresh_identity(&self) -> Option<NetworkIdentity> {
        let identity = match self.system.read_network_identity() {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Cannot determine network identity: {}", e);
                None
            }
        };
        *write(&self.last_identity, "last identity") = identity.clone();
        identity
    }

    fn disable(&self) {
        if let Err(e) = self.system.set_proxy_enabled(false) {
            error!("Failed to disable proxy: {}", e);
        }
    }

    fn reconcile(&self, force: bool) -> Outcome {
        let identity = if force {
            self.refresh_identity()
        } else {
            read(&self.last_identity, "last identity").clone()
        };

        let outcome = match identity {
            None => {
                self.disable();
                Outcome::Unidentified
            }
            Some(identity) => self.reconcile_identity(identity),
        };

        self.notifier.notify(&message(&outcome));
        outcome
    }

    fn reconcile_identity(&self, current: NetworkIdentity) -> Outcome {
        let Some(entry) = self.mappings.resolve(&current) else {
            self.disable();
            return Outcome::NoMapping { network: current };
        };
        let network = entry.identity;

        let name = match entry.target {
            MappingTarget::Profile(name) => name,
            MappingTarget::Disabled | MappingTarget::Stale => {
                self.disable();
                return Outcome::Disabled { network };
            }
        };

        let Some(profile) = self.config.profile(&name) else {
            // Deleted since the maintenance pass ran.
            self.disable();
            return Outcome::Disabled { network };
        };

        match self.system.write_proxy_settings(&profile, true) {
            Ok(()) => {
                info!("Applied proxy profile {} for network {}", name, network);
                Outcome::Applied {
                    network,
                    profile: name,
                }
            }
            Err(e) => {
                error!("Failed to apply proxy profile {}: {}", name, e);
                self.disable();
                Outcome::Failed {
                    network,
                    profile: name,
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn message(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Unidentified => "Unable to determine the network, proxy disabled".to_string(),
        Outcome::Applied { network, profile } => {
            format!("Network [{}]: using profile [{}]", network, profile)
        }
        Outcome::Disabled { network } => format!("Network [{}]: proxy disabled", network),
        Outcome::NoMapping { network } => {
            format!("No profile found for network [{}], proxy disabled", network)
        }
        Outcome::Failed {
            network,
            profile,
            reason,
        } => format!(
            "Network [{}]: cannot apply profile [{}] ({}), proxy disabled",
            network, profile, reason
        ),
    }
}

/// Debounced "apply mapping" operation.
pub struct Reconciler {
    core: Arc<ReconcileCore>,
    debouncer: Debouncer<bool>,
}

impl Reconciler {
    /// Create a reconciler with a custom debounce window.
    pub fn with_delay(
        system: Arc<dyn SystemState>,
        config: Arc<ConfigStore>,
        mappings: Arc<MappingStore>,
        notifier: Arc<dyn Notifier>,
        delay: Duration,
    ) -> Self {
        let core = Arc::new(ReconcileCore {
            system,
            config,
            mappings,
            notifier,
            last_identity: RwLock::new(None),
        });

        let runner = Arc::clone(&core);
        let debouncer = Debouncer::new("apply-mapping", delay, move |force| {
            let outcome = runner.reconcile(force);
            debug!("Reconciliation finished: {:?}", outcome);
        });

        Self { core, debouncer }
    }

    /// Schedule a reconciliation. With `force`, the network identity is
    /// re-read first instead of using the last recorded one.
    pub fn apply_mapping(&self, force: bool) {
        debug!("Reconciliation requested (force: {})", force);
        self.debouncer.call(force);
    }

    /// Reconcile immediately on the calling thread.
    pub fn reconcile_now(&self, force: bool) -> Outcome {
        self.core.reconcile(force)
    }

    /// Drop a scheduled reconciliation that has not started yet.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    pub fn last_identity(&self) -> Option<NetworkIdentity> {
        read(&self.core.last_identity, "last identity").clone()
    }

    pub fn record_identity(&self, identity: Option<NetworkIdentity>) {
        *write(&self.core.last_identity, "last identity") = identity;
    }

    /// Re-read the live identity and record it.
    pub fn refresh_identity(&self) -> Option<NetworkIdentity> {
        self.core.refresh_identity()
    }
}

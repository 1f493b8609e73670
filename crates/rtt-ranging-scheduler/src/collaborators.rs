//! The scheduler's out-of-scope dependencies, bundled for convenient threading through
//! [`crate::spawn`] and the [`crate::engine::Engine`].

use std::sync::Arc;

use rtt_ranging_types::{
    Clock, CredentialStore, DiscoveryResolver, LivenessRegistry, PermissionOracle,
    RangingController,
};

#[derive(Clone)]
pub struct Collaborators {
    pub controller: Arc<dyn RangingController>,
    pub resolver: Arc<dyn DiscoveryResolver>,
    pub credentials: Arc<dyn CredentialStore>,
    pub permissions: Arc<dyn PermissionOracle>,
    pub liveness: Arc<dyn LivenessRegistry>,
    pub clock: Arc<dyn Clock>,
}

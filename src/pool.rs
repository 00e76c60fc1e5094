use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::ec2::{Ec2Api, Ec2Client};
use crate::session::Session;

/// Builds a region-bound API client.
pub trait ClientFactory: Send + Sync {
    fn create(&self, region: &str) -> Arc<dyn Ec2Api>;
}

/// Derives SDK clients from the startup session.
pub struct SdkClientFactory {
    session: Session,
}

impl SdkClientFactory {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl ClientFactory for SdkClientFactory {
    fn create(&self, region: &str) -> Arc<dyn Ec2Api> {
        Arc::new(Ec2Client::from_sdk_config(self.session.sdk_config(), region))
    }
}

/// Lazily built, per-region client cache.
pub struct ClientPool {
    factory: Arc<dyn ClientFactory>,
    clients: RwLock<HashMap<String, Arc<dyn Ec2Api>>>,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached client for `region`, creating it on first use.
    pub fn client_for(&self, region: &str) -> Arc<dyn Ec2Api> {
        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(region)
        {
            return Arc::clone(client);
        }

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        // Another scanner may have inserted it between the two locks.
        let client = clients.entry(region.to_string()).or_insert_with(|| {
            debug!(region = %region, "Creating EC2 client for region");
            self.factory.create(region)
        });

        Arc::clone(client)
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use clickmig_client::Client;
use std::collections::BTreeMap;

use crate::{
    error::{Error, Result},
    migration::DatabaseId,
};

/// Clients of the configured databases, keyed by identifier.
#[derive(Clone, Default)]
pub struct Databases {
    clients: BTreeMap<DatabaseId, Client>,
}

impl Databases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<DatabaseId>, client: Client) -> Self {
        self.insert(id, client);
        self
    }

    pub fn insert(&mut self, id: impl Into<DatabaseId>, client: Client) {
        self.clients.insert(id.into(), client);
    }

    pub fn get(&self, id: &DatabaseId) -> Result<&Client> {
        self.clients
            .get(id)
            .ok_or_else(|| Error::Configuration(format!("database `{id}` is not configured")))
    }

    pub fn ids(&self) -> impl Iterator<Item = &DatabaseId> {
        self.clients.keys()
    }
}

use std::sync::OnceLock;

use async_trait::async_trait;
use mongodb::{bson::doc, Client};

use super::{BackingStore, StoreError};

/// MongoDB document store
///
/// The client is created by the first successful `connect` and stays
/// unavailable until then.
pub struct DocumentStore {
    uri: String,
    client: OnceLock<Client>,
}

impl DocumentStore {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client: OnceLock::new(),
        }
    }

    /// Connected client, if the store has come up
    pub fn client(&self) -> Option<&Client> {
        self.client.get()
    }
}

#[async_trait]
impl BackingStore for DocumentStore {
    fn name(&self) -> &'static str {
        "Mongo"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        let client = Client::with_uri_str(&self.uri).await?;

        // Client construction is lazy; a ping forces server selection.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        let _ = self.client.set(client);
        Ok(())
    }
}

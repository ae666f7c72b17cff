//! In-process client of the embedded store.

use crate::backend::{StoreClient, StoreError};
use crate::commands::CommandHandler;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;

/// A client bound to a shared [`StorageEngine`].
///
/// Like a socket, each client has its own selected database; clones start
/// from the clone source's selection and diverge from there.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    handler: CommandHandler,
}

impl MemoryClient {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            handler: CommandHandler::new(storage),
        }
    }
}

impl StoreClient for MemoryClient {
    async fn call(&mut self, argv: Vec<Bytes>) -> Result<RespValue, StoreError> {
        Ok(self.handler.execute(RespValue::command(argv)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::argv;

    #[tokio::test]
    async fn test_call_and_default_pipeline() {
        let storage = Arc::new(StorageEngine::new());
        let mut client = MemoryClient::new(Arc::clone(&storage));

        assert_eq!(
            client.call(argv(["SET", "k", "v"])).await.unwrap(),
            RespValue::ok()
        );
        let replies = client
            .pipeline(vec![argv(["TYPE", "k"]), argv(["TTL", "k"]), argv(["BOGUS"])])
            .await
            .unwrap();
        assert_eq!(replies[0], RespValue::simple_string("string"));
        assert_eq!(replies[1], RespValue::integer(-1));
        assert!(replies[2].is_error());
    }

    #[tokio::test]
    async fn test_selected_database_is_per_client() {
        let storage = Arc::new(StorageEngine::new());
        let mut first = MemoryClient::new(Arc::clone(&storage));
        let mut second = MemoryClient::new(Arc::clone(&storage));

        first.call(argv(["SELECT", "1"])).await.unwrap();
        first.call(argv(["SET", "k", "v"])).await.unwrap();

        assert_eq!(
            second.call(argv(["GET", "k"])).await.unwrap(),
            RespValue::null()
        );
        assert_eq!(storage.get(1, b"k").unwrap(), Some(Bytes::from("v")));
    }
}

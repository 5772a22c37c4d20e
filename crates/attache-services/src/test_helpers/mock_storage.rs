//! In-memory storage backend for testing

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use attache_storage::{ByteStream, Storage, StorageError, StorageResult};

/// Storage backend holding objects in a map. Supports append, so it can act as staging.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len_of(&self, key: &str) -> Option<u64> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|data| data.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn store_stream(&self, key: &str, mut stream: ByteStream) -> StorageResult<u64> {
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        let written = data.len() as u64;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(written)
    }

    async fn append(&self, key: &str, data: &[u8]) -> StorageResult<u64> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects.entry(key.to_string()).or_default();
        object.extend_from_slice(data);
        Ok(object.len() as u64)
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        self.get_bytes(key)
            .map(Bytes::from)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn read_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let data = self.read(key).await?;
        // Two chunks, so consumers are exercised on multi-chunk streams.
        let split = data.len() / 2;
        let chunks = vec![Ok(data.slice(..split)), Ok(data.slice(split..))];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn size(&self, key: &str) -> StorageResult<u64> {
        self.len_of(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let data = self
            .get_bytes(from_key)
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        self.objects
            .lock()
            .unwrap()
            .insert(to_key.to_string(), data);
        Ok(())
    }
}

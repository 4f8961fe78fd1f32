//! A minimal object-storage seam, shaped like Thanos' `objstore.Bucket`:
//! upload, existence check, iteration and delete by key, nothing else. The
//! shipper is the only consumer; swapping in S3/GCS/Azure backends means
//! implementing this trait, not touching the shipper.

use async_trait::async_trait;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
	async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), String>;
	async fn exists(&self, key: &str) -> Result<bool, String>;
	async fn iter(&self, prefix: &str) -> Result<Vec<String>, String>;
	async fn delete(&self, key: &str) -> Result<(), String>;
}

/// An in-process bucket, useful for tests and for single-node deployments
/// that ship blocks to a local mount instead of a remote bucket.
#[derive(Default)]
pub struct InMemoryStorage {
	objects: std::sync::Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
	async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), String> {
		self.objects.lock().unwrap().insert(key.to_string(), data);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, String> {
		Ok(self.objects.lock().unwrap().contains_key(key))
	}

	async fn iter(&self, prefix: &str) -> Result<Vec<String>, String> {
		Ok(self
			.objects
			.lock()
			.unwrap()
			.keys()
			.filter(|k| k.starts_with(prefix))
			.cloned()
			.collect())
	}

	async fn delete(&self, key: &str) -> Result<(), String> {
		self.objects.lock().unwrap().remove(key);
		Ok(())
	}
}

// pgmanager/src/storage/s3.rs
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::StorageBackend;
use crate::config::S3Config;
use crate::errors::{AppError, Result};
use crate::utils::discard_scratch_file;

/// Backups kept as objects under `base_path` in an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: s3::Client,
    bucket: String,
    base_path: String,
}

impl S3Storage {
    /// Builds a client from the configured endpoint, region and static
    /// credentials. Anything left unset comes from the default AWS provider
    /// chain (environment, `~/.aws`, instance metadata).
    pub async fn connect(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                key_id, secret, None, // session_token
                None, // expiry
                "Static",
            ));
        }
        let sdk_config = loader.load().await;
        Self::with_client(s3::Client::new(&sdk_config), config)
    }

    pub fn with_client(client: s3::Client, config: &S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket_name.clone(),
            base_path: config.bucket_backup_path.clone(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.base_path, key)
    }

    fn relative_key<'a>(&self, object_key: &'a str) -> Option<&'a str> {
        object_key
            .strip_prefix(self.base_path.as_str())
            .filter(|key| !key.is_empty() && !key.ends_with('/'))
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(self.object_key(prefix))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::storage(format!("list {}", self.uri(prefix)), e))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter_map(|key| self.relative_key(key))
                    .map(str::to_string),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        debug!(bucket = %self.bucket, count = keys.len(), "listed objects");
        keys.sort();
        Ok(keys)
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let uri = self.uri(key);
        info!("Uploading {} to {}", local_path.display(), uri);

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::storage(format!("read {} for upload", local_path.display()), e)
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("upload {}", uri), e))?;

        // the object is stored; a leftover local file is only worth a warning
        discard_scratch_file(local_path);
        info!("✅ Uploaded {}", uri);
        Ok(())
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        let uri = self.uri(key);
        info!("Downloading {} to {}", uri, local_path.display());

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(AppError::NotFound(key.to_string()));
            }
            Err(e) => return Err(AppError::storage(format!("download {}", uri), e)),
        };

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut output_file = tokio::fs::File::create(local_path).await?;
        let mut body = response.body;
        let mut total_bytes = 0usize;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| AppError::storage(format!("read body of {}", uri), e))?
        {
            output_file.write_all(&chunk).await?;
            total_bytes += chunk.len();
        }
        output_file.flush().await?;

        info!("✅ Downloaded {} bytes from {}", total_bytes, uri);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.base_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(base_path: &str) -> S3Storage {
        let client = s3::Client::from_conf(
            s3::Config::builder()
                .behavior_version(s3::config::BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .build(),
        );
        S3Storage::with_client(
            client,
            &S3Config {
                bucket_name: "backups".to_string(),
                bucket_backup_path: base_path.to_string(),
                region: None,
                endpoint_url: None,
                access_key_id: None,
                secret_access_key: None,
            },
        )
    }

    #[test]
    fn keys_are_relative_to_the_bucket_path() {
        let storage = storage("postgres/prod/");
        assert_eq!(
            storage.object_key("backup-20230101-000000-app.dump.gz"),
            "postgres/prod/backup-20230101-000000-app.dump.gz"
        );
        assert_eq!(
            storage.relative_key("postgres/prod/backup-20230101-000000-app.dump.gz"),
            Some("backup-20230101-000000-app.dump.gz")
        );
        assert_eq!(storage.relative_key("postgres/prod/"), None);
        assert_eq!(storage.relative_key("postgres/other/backup.dump.gz"), None);
        assert_eq!(storage.describe(), "s3://backups/postgres/prod/");
    }

    #[test]
    fn empty_bucket_path_keeps_keys_unchanged() {
        let storage = storage("");
        assert_eq!(storage.object_key("a.gz"), "a.gz");
        assert_eq!(storage.relative_key("a.gz"), Some("a.gz"));
        assert_eq!(storage.uri("a.gz"), "s3://backups/a.gz");
    }
}

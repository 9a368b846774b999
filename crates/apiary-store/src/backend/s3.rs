//! S3 backend (optional).

#![cfg(feature = "s3")]

use anyhow::Result;
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use bytes::Bytes;
use time::OffsetDateTime;

use super::{ObjectBackend, ObjectEntry};

#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    pub prefix: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    /// When set, static keys are ignored and the ambient role is used.
    pub iam_role_enabled: bool,
}

pub struct S3Backend {
    bucket: String,
    prefix: String,
    client: Client,
}

impl S3Backend {
    pub async fn new(opts: S3Options) -> Result<Self> {
        let mut loader = aws_config::from_env();
        if let Some(region) = opts.region.clone() {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = opts.endpoint.clone() {
            loader = loader.endpoint_url(endpoint);
        }
        if !opts.iam_role_enabled {
            if let (Some(access), Some(secret)) = (opts.access_key.clone(), opts.secret_key.clone())
            {
                loader = loader.credentials_provider(Credentials::new(
                    access,
                    secret,
                    opts.session_token.clone(),
                    None,
                    "apiary-config",
                ));
            }
        }
        let conf = loader.load().await;
        Ok(Self {
            bucket: opts.bucket,
            prefix: opts.prefix.trim_matches('/').to_string(),
            client: Client::new(&conf),
        })
    }

    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.prefix)
        }
    }

    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(key)
        }
    }
}

fn is_not_found(err: &dyn std::fmt::Display) -> bool {
    let msg = format!("{err}");
    msg.contains("NotFound") || msg.contains("NoSuchKey")
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let body = ByteStream::from(Bytes::copy_from_slice(bytes));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await;
        match resp {
            Ok(out) => Ok(Some(out.body.collect().await?.into_bytes().to_vec())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.object_key(prefix))
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let modified = object
                    .last_modified()
                    .and_then(|dt| OffsetDateTime::from_unix_timestamp(dt.secs()).ok());
                entries.push(ObjectEntry {
                    key: self.strip_prefix(key).to_string(),
                    modified,
                });
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

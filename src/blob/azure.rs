//! Azure Blob Storage adapter speaking the REST API directly.
//!
//! Supports the two credential forms found in storage connection strings: an account key (requests
//! are signed with the Shared Key scheme) and a shared access signature (appended to the URL).
//! `UseDevelopmentStorage=true` resolves to the local Azurite emulator.

use super::{BlobError, BlobStore};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use sha2::Sha256;
use time::{OffsetDateTime, macros::format_description};

const STORAGE_API_VERSION: &str = "2021-08-06";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
enum Credential {
    SharedKey { account: String, key: Vec<u8> },
    SharedAccessSignature(String),
}

/// Parsed storage connection string.
#[derive(Clone)]
pub struct StorageConnection {
    blob_endpoint: Url,
    credential: Credential,
}

impl std::fmt::Debug for StorageConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let credential = match &self.credential {
            Credential::SharedKey { account, .. } => format!("SharedKey({account})"),
            Credential::SharedAccessSignature(_) => "SharedAccessSignature".to_string(),
        };
        f.debug_struct("StorageConnection")
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .field("credential", &credential)
            .finish()
    }
}

impl StorageConnection {
    /// Parse an Azure Storage connection string.
    pub fn parse(connection_string: &str) -> Result<Self, BlobError> {
        let mut protocol = "https";
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = DEFAULT_ENDPOINT_SUFFIX;
        let mut blob_endpoint = None;
        let mut sas = None;
        let mut development = false;

        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                BlobError::InvalidConnectionString(format!("segment without '=': {part}"))
            })?;
            match key {
                "DefaultEndpointsProtocol" => protocol = value,
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "EndpointSuffix" => endpoint_suffix = value,
                "BlobEndpoint" => blob_endpoint = Some(value),
                "SharedAccessSignature" => sas = Some(value),
                "UseDevelopmentStorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            account_name = Some(DEV_ACCOUNT_NAME);
            account_key = Some(DEV_ACCOUNT_KEY);
            blob_endpoint = blob_endpoint.or(Some(DEV_BLOB_ENDPOINT));
        }

        let endpoint = match (blob_endpoint, account_name) {
            (Some(endpoint), _) => endpoint.to_string(),
            (None, Some(account)) => format!("{protocol}://{account}.blob.{endpoint_suffix}"),
            (None, None) => {
                return Err(BlobError::InvalidConnectionString(
                    "neither BlobEndpoint nor AccountName provided".into(),
                ));
            }
        };
        let blob_endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|error| BlobError::InvalidConnectionString(error.to_string()))?;

        let credential = match (account_name, account_key, sas) {
            (Some(account), Some(key), _) => Credential::SharedKey {
                account: account.to_string(),
                key: BASE64.decode(key).map_err(|error| {
                    BlobError::InvalidConnectionString(format!("AccountKey is not base64: {error}"))
                })?,
            },
            (_, _, Some(token)) => {
                Credential::SharedAccessSignature(token.trim_start_matches('?').to_string())
            }
            _ => {
                return Err(BlobError::InvalidConnectionString(
                    "no AccountKey or SharedAccessSignature provided".into(),
                ));
            }
        };

        Ok(Self {
            blob_endpoint,
            credential,
        })
    }

    fn blob_url(&self, container: &str, blob_name: &str) -> Result<Url, BlobError> {
        let mut url = self.blob_endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| BlobError::InvalidConnectionString("endpoint cannot be a base".into()))?
            .pop_if_empty()
            .push(container)
            .extend(blob_name.split('/'));
        if let Credential::SharedAccessSignature(token) = &self.credential {
            url.set_query(Some(token));
        }
        Ok(url)
    }
}

/// Blob store backed by an Azure Storage account.
pub struct AzureBlobStore {
    http: Client,
    connection: StorageConnection,
}

impl AzureBlobStore {
    /// Build a store from a storage connection string.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, BlobError> {
        let connection = StorageConnection::parse(connection_string)?;
        let http = Client::builder().user_agent("rusty-docs/blob").build()?;
        tracing::debug!(endpoint = %connection.blob_endpoint, "Initialized blob storage client");
        Ok(Self { http, connection })
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn upload(
        &self,
        container: &str,
        blob_name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BlobError> {
        if blob_name.trim().is_empty() {
            return Err(BlobError::InvalidBlobName(blob_name.to_string()));
        }
        let url = self.connection.blob_url(container, blob_name)?;
        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
        let date = http_date(OffsetDateTime::now_utc())?;
        let content_length = bytes.len();

        let mut request = self
            .http
            .put(url.clone())
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(reqwest::header::CONTENT_TYPE, content_type);

        if let Credential::SharedKey { account, key } = &self.connection.credential {
            let canonical_resource = format!("/{account}{}", url.path());
            let payload = string_to_sign(content_length, content_type, &date, &canonical_resource);
            let signature = sign(key, &payload)?;
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("SharedKey {account}:{signature}"),
            );
        }

        let response = request.body(bytes).send().await?;
        if response.status().is_success() {
            tracing::debug!(container, blob = blob_name, bytes = content_length, "Blob uploaded");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = BlobError::UnexpectedStatus { status, body };
            tracing::error!(container, blob = blob_name, error = %error, "Blob upload failed");
            Err(error)
        }
    }
}

fn http_date(now: OffsetDateTime) -> Result<String, BlobError> {
    now.format(format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    ))
    .map_err(|error| BlobError::Signing(error.to_string()))
}

/// Shared Key string-to-sign for a Put Blob request.
fn string_to_sign(
    content_length: usize,
    content_type: &str,
    date: &str,
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    format!(
        "PUT\n\n\n{length}\n\n{content_type}\n\n\n\n\n\n\n\
         x-ms-blob-type:BlockBlob\nx-ms-date:{date}\nx-ms-version:{STORAGE_API_VERSION}\n\
         {canonical_resource}"
    )
}

fn sign(key: &[u8], payload: &str) -> Result<String, BlobError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|error| BlobError::Signing(error.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

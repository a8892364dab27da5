//! Wire format of keystore and truststore uploads and exports.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crypto::keystore::KeyStoreType;
use crate::error::{ConsoleResult, FieldErrors};
use crate::scim::schema_urn;
use crate::service::key_material::{ExportedStore, StoreUpload};

/// A keystore file sent for import, or a truststore file to merge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeystoreUpload {
    /// Base64 of the `.jks` / `.p12` file.
    pub keystore_file: Option<String>,
    #[serde(rename = "type")]
    pub store_type: Option<String>,
    pub password: Option<String>,
    pub key_passwords: HashMap<String, String>,
    pub aliases: Option<Vec<String>>,
    pub alias_rename: HashMap<String, String>,
}

fn store_type(errors: &mut FieldErrors, raw: Option<&str>) -> Option<KeyStoreType> {
    match raw.filter(|t| !t.trim().is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<KeyStoreType>() {
            Ok(t) => Some(t),
            Err(e) => {
                errors.add("type", e.to_string());
                None
            }
        },
    }
}

impl KeystoreUpload {
    pub fn into_upload(self) -> ConsoleResult<StoreUpload> {
        let mut errors = FieldErrors::new();
        let bytes = match self.keystore_file.as_deref().map(str::trim) {
            None | Some("") => {
                errors.add("keystoreFile", "must not be empty");
                Vec::new()
            }
            Some(encoded) => match STANDARD.decode(encoded) {
                Ok(bytes) => bytes,
                Err(e) => {
                    errors.add("keystoreFile", format!("is not valid base64: {e}"));
                    Vec::new()
                }
            },
        };
        let store_type = store_type(&mut errors, self.store_type.as_deref());
        if self.aliases.as_ref().is_some_and(Vec::is_empty) {
            errors.add("aliases", "must not be empty when given");
        }
        errors.into_result()?;

        Ok(StoreUpload {
            bytes,
            store_type,
            password: self.password.unwrap_or_default(),
            key_passwords: self.key_passwords,
            aliases: self.aliases,
            rename: self.alias_rename,
        })
    }
}

/// Truststore POST body: either a whole store to merge or one certificate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TruststoreUpload {
    #[serde(flatten)]
    pub store: KeystoreUpload,
    pub alias: Option<String>,
    /// PEM or base64 DER certificate.
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportRequest {
    #[serde(rename = "type")]
    pub store_type: Option<String>,
    pub password: Option<String>,
}

impl ExportRequest {
    /// An empty body exports with the configured type and password.
    pub fn from_body(body: &[u8]) -> ConsoleResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(body)?)
    }

    pub fn resolve(self) -> ConsoleResult<(Option<KeyStoreType>, Option<String>)> {
        let mut errors = FieldErrors::new();
        let store_type = store_type(&mut errors, self.store_type.as_deref());
        errors.into_result()?;
        Ok((store_type, self.password.filter(|p| !p.is_empty())))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub schemas: Vec<String>,
    #[serde(rename = "type")]
    pub store_type: &'static str,
    pub keystore_file: String,
}

impl ExportResponse {
    pub fn new(resource_type: &str, exported: ExportedStore) -> Self {
        Self {
            schemas: vec![schema_urn(resource_type)],
            store_type: exported.store_type.as_str(),
            keystore_file: STANDARD.encode(exported.bytes),
        }
    }
}

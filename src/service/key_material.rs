//! The application keystore and truststore.
//!
//! Both stores live inside one actor which is their only writer. Every
//! mutation is applied to a copy, persisted, and only then swapped in, so a
//! failed import leaves memory and database untouched.

use crate::crypto::keystore::{
    Entry, EntryInfo, KeyMaterial, KeyStoreType, PrivateKeyEntry, PublicKeyMaterial,
    TrustedCertificateEntry, fingerprint, normalize_alias, parse_certificate,
};
use crate::db::{Storage, StoreKind};
use crate::error::{ConsoleError, ConsoleResult};

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Passwords and formats used when the stores are written back.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub keystore_type: KeyStoreType,
    pub keystore_password: String,
    pub truststore_type: KeyStoreType,
    pub truststore_password: String,
}

/// An uploaded keystore or truststore file.
#[derive(Debug, Clone, Default)]
pub struct StoreUpload {
    pub bytes: Vec<u8>,
    pub store_type: Option<KeyStoreType>,
    pub password: String,
    /// Per-alias key passwords, tried before the store password.
    pub key_passwords: HashMap<String, String>,
    /// Only import these aliases; all key entries when `None`.
    pub aliases: Option<Vec<String>>,
    /// Uploaded alias to the alias it should get in the application keystore.
    pub rename: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExportedStore {
    pub store_type: KeyStoreType,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum KeyMaterialMessage {
    ListKeys(RpcReplyPort<Vec<EntryInfo>>),
    GetKey(String, RpcReplyPort<Option<EntryInfo>>),
    ImportKeys(StoreUpload, RpcReplyPort<ConsoleResult<Vec<String>>>),
    DeleteKey(String, RpcReplyPort<ConsoleResult<()>>),
    ExportKeystore(
        Option<KeyStoreType>,
        Option<String>,
        RpcReplyPort<ConsoleResult<ExportedStore>>,
    ),
    SigningKey(String, RpcReplyPort<Option<PrivateKeyEntry>>),

    ListCertificates(RpcReplyPort<Vec<EntryInfo>>),
    GetCertificate(String, RpcReplyPort<Option<EntryInfo>>),
    MergeTruststore(StoreUpload, RpcReplyPort<ConsoleResult<Vec<String>>>),
    AddCertificate(String, String, RpcReplyPort<ConsoleResult<String>>),
    DeleteCertificate(String, RpcReplyPort<ConsoleResult<()>>),
    ExportTruststore(
        Option<KeyStoreType>,
        Option<String>,
        RpcReplyPort<ConsoleResult<ExportedStore>>,
    ),

    /// Certificate public key, keystore first then truststore.
    PublicKey(String, RpcReplyPort<Option<PublicKeyMaterial>>),
    /// DER certificates to add as TLS roots.
    TrustedCertificates(RpcReplyPort<Vec<Vec<u8>>>),
}

/// Handle for interacting with the key material actor.
#[derive(Clone)]
pub struct KeyMaterialHandle {
    actor: ActorRef<KeyMaterialMessage>,
}

fn rpc_failed(what: &str, e: impl std::fmt::Display) -> ConsoleError {
    ConsoleError::RactorError(format!("{what} RPC failed: {e}"))
}

impl KeyMaterialHandle {
    pub async fn list_keys(&self) -> ConsoleResult<Vec<EntryInfo>> {
        ractor::call!(self.actor, KeyMaterialMessage::ListKeys)
            .map_err(|e| rpc_failed("ListKeys", e))
    }

    pub async fn get_key(&self, alias: &str) -> ConsoleResult<Option<EntryInfo>> {
        ractor::call!(self.actor, KeyMaterialMessage::GetKey, alias.to_string())
            .map_err(|e| rpc_failed("GetKey", e))
    }

    /// Import key entries; returns the aliases they were stored under.
    pub async fn import_keys(&self, upload: StoreUpload) -> ConsoleResult<Vec<String>> {
        ractor::call!(self.actor, KeyMaterialMessage::ImportKeys, upload)
            .map_err(|e| rpc_failed("ImportKeys", e))?
    }

    pub async fn delete_key(&self, alias: &str) -> ConsoleResult<()> {
        ractor::call!(self.actor, KeyMaterialMessage::DeleteKey, alias.to_string())
            .map_err(|e| rpc_failed("DeleteKey", e))?
    }

    pub async fn export_keystore(
        &self,
        store_type: Option<KeyStoreType>,
        password: Option<String>,
    ) -> ConsoleResult<ExportedStore> {
        ractor::call!(
            self.actor,
            KeyMaterialMessage::ExportKeystore,
            store_type,
            password
        )
        .map_err(|e| rpc_failed("ExportKeystore", e))?
    }

    pub async fn signing_key(&self, alias: &str) -> ConsoleResult<Option<PrivateKeyEntry>> {
        ractor::call!(self.actor, KeyMaterialMessage::SigningKey, alias.to_string())
            .map_err(|e| rpc_failed("SigningKey", e))
    }

    pub async fn list_certificates(&self) -> ConsoleResult<Vec<EntryInfo>> {
        ractor::call!(self.actor, KeyMaterialMessage::ListCertificates)
            .map_err(|e| rpc_failed("ListCertificates", e))
    }

    pub async fn get_certificate(&self, alias: &str) -> ConsoleResult<Option<EntryInfo>> {
        ractor::call!(
            self.actor,
            KeyMaterialMessage::GetCertificate,
            alias.to_string()
        )
        .map_err(|e| rpc_failed("GetCertificate", e))
    }

    pub async fn merge_truststore(&self, upload: StoreUpload) -> ConsoleResult<Vec<String>> {
        ractor::call!(self.actor, KeyMaterialMessage::MergeTruststore, upload)
            .map_err(|e| rpc_failed("MergeTruststore", e))?
    }

    pub async fn add_certificate(&self, alias: &str, certificate: &str) -> ConsoleResult<String> {
        ractor::call!(
            self.actor,
            KeyMaterialMessage::AddCertificate,
            alias.to_string(),
            certificate.to_string()
        )
        .map_err(|e| rpc_failed("AddCertificate", e))?
    }

    pub async fn delete_certificate(&self, alias: &str) -> ConsoleResult<()> {
        ractor::call!(
            self.actor,
            KeyMaterialMessage::DeleteCertificate,
            alias.to_string()
        )
        .map_err(|e| rpc_failed("DeleteCertificate", e))?
    }

    pub async fn export_truststore(
        &self,
        store_type: Option<KeyStoreType>,
        password: Option<String>,
    ) -> ConsoleResult<ExportedStore> {
        ractor::call!(
            self.actor,
            KeyMaterialMessage::ExportTruststore,
            store_type,
            password
        )
        .map_err(|e| rpc_failed("ExportTruststore", e))?
    }

    pub async fn public_key(&self, alias: &str) -> ConsoleResult<Option<PublicKeyMaterial>> {
        ractor::call!(self.actor, KeyMaterialMessage::PublicKey, alias.to_string())
            .map_err(|e| rpc_failed("PublicKey", e))
    }

    pub async fn trusted_certificates(&self) -> ConsoleResult<Vec<Vec<u8>>> {
        ractor::call!(self.actor, KeyMaterialMessage::TrustedCertificates)
            .map_err(|e| rpc_failed("TrustedCertificates", e))
    }
}

struct KeyMaterialState {
    storage: Storage,
    settings: StoreSettings,
    keystore: KeyMaterial,
    truststore: KeyMaterial,
}

struct KeyMaterialActor;

#[ractor::async_trait]
impl Actor for KeyMaterialActor {
    type Msg = KeyMaterialMessage;
    type State = KeyMaterialState;
    type Arguments = (Storage, StoreSettings);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (storage, settings): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let keystore = load_or_create(&storage, StoreKind::Keystore, &settings)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("keystore load failed: {e}")))?;
        let truststore = load_or_create(&storage, StoreKind::Truststore, &settings)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("truststore load failed: {e}")))?;

        info!(
            keys = keystore.len(),
            certificates = truststore.len(),
            "key material loaded"
        );

        Ok(KeyMaterialState {
            storage,
            settings,
            keystore,
            truststore,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            KeyMaterialMessage::ListKeys(rp) => {
                let _ = rp.send(state.keystore.infos());
            }
            KeyMaterialMessage::GetKey(alias, rp) => {
                let _ = rp.send(state.keystore.info(&alias));
            }
            KeyMaterialMessage::ImportKeys(upload, rp) => {
                let _ = rp.send(self.handle_import_keys(state, upload).await);
            }
            KeyMaterialMessage::DeleteKey(alias, rp) => {
                let _ = rp.send(self.handle_delete(state, StoreKind::Keystore, alias).await);
            }
            KeyMaterialMessage::ExportKeystore(store_type, password, rp) => {
                let store_type = store_type.unwrap_or(state.settings.keystore_type);
                let password = password.unwrap_or_else(|| state.settings.keystore_password.clone());
                let _ = rp.send(export(&state.keystore, store_type, &password));
            }
            KeyMaterialMessage::SigningKey(alias, rp) => {
                let _ = rp.send(state.keystore.private_key(&alias).cloned());
            }
            KeyMaterialMessage::ListCertificates(rp) => {
                let _ = rp.send(state.truststore.infos());
            }
            KeyMaterialMessage::GetCertificate(alias, rp) => {
                let _ = rp.send(state.truststore.info(&alias));
            }
            KeyMaterialMessage::MergeTruststore(upload, rp) => {
                let _ = rp.send(self.handle_merge_truststore(state, upload).await);
            }
            KeyMaterialMessage::AddCertificate(alias, certificate, rp) => {
                let _ = rp.send(self.handle_add_certificate(state, alias, certificate).await);
            }
            KeyMaterialMessage::DeleteCertificate(alias, rp) => {
                let _ = rp.send(self.handle_delete(state, StoreKind::Truststore, alias).await);
            }
            KeyMaterialMessage::ExportTruststore(store_type, password, rp) => {
                let store_type = store_type.unwrap_or(state.settings.truststore_type);
                let password =
                    password.unwrap_or_else(|| state.settings.truststore_password.clone());
                let _ = rp.send(export(&state.truststore, store_type, &password));
            }
            KeyMaterialMessage::PublicKey(alias, rp) => {
                let _ = rp.send(resolve_public_key(state, &alias));
            }
            KeyMaterialMessage::TrustedCertificates(rp) => {
                let certs = state
                    .truststore
                    .entries()
                    .filter_map(|(_, entry)| entry.certificate().map(<[u8]>::to_vec))
                    .collect();
                let _ = rp.send(certs);
            }
        }
        Ok(())
    }
}

impl KeyMaterialActor {
    async fn handle_import_keys(
        &self,
        state: &mut KeyMaterialState,
        upload: StoreUpload,
    ) -> ConsoleResult<Vec<String>> {
        let uploaded = KeyMaterial::load(
            &upload.bytes,
            upload.store_type,
            &upload.password,
            &upload.key_passwords,
        )?;
        let planned = plan_key_import(
            &state.keystore,
            &uploaded,
            upload.aliases.as_deref(),
            &upload.rename,
        )?;

        let mut next = state.keystore.clone();
        let aliases: Vec<String> = planned.iter().map(|(alias, _)| alias.clone()).collect();
        for (alias, entry) in planned {
            next.insert(alias, Entry::PrivateKey(entry));
        }
        persist(state, StoreKind::Keystore, next).await?;
        info!(aliases = ?aliases, "keys imported");
        Ok(aliases)
    }

    async fn handle_merge_truststore(
        &self,
        state: &mut KeyMaterialState,
        upload: StoreUpload,
    ) -> ConsoleResult<Vec<String>> {
        let uploaded =
            KeyMaterial::load_certificates(&upload.bytes, upload.store_type, &upload.password)?;
        let planned = plan_trust_merge(&state.truststore, &uploaded)?;

        let mut next = state.truststore.clone();
        let aliases: Vec<String> = planned.iter().map(|(alias, _)| alias.clone()).collect();
        for (alias, entry) in planned {
            next.insert(alias, Entry::TrustedCertificate(entry));
        }
        persist(state, StoreKind::Truststore, next).await?;
        info!(aliases = ?aliases, "truststore merged");
        Ok(aliases)
    }

    async fn handle_add_certificate(
        &self,
        state: &mut KeyMaterialState,
        alias: String,
        certificate: String,
    ) -> ConsoleResult<String> {
        let der = parse_certificate(&certificate)?;
        let mut single = KeyMaterial::new();
        single.insert(
            alias,
            Entry::TrustedCertificate(TrustedCertificateEntry {
                certificate: der,
                created: Utc::now(),
            }),
        );
        let planned = plan_trust_merge(&state.truststore, &single)?;

        let mut next = state.truststore.clone();
        let mut stored = String::new();
        for (alias, entry) in planned {
            stored = alias.clone();
            next.insert(alias, Entry::TrustedCertificate(entry));
        }
        persist(state, StoreKind::Truststore, next).await?;
        info!(alias = %stored, "certificate added to truststore");
        Ok(stored)
    }

    async fn handle_delete(
        &self,
        state: &mut KeyMaterialState,
        kind: StoreKind,
        alias: String,
    ) -> ConsoleResult<()> {
        let (resource, current) = match kind {
            StoreKind::Keystore => ("Keystore", &state.keystore),
            StoreKind::Truststore => ("Truststore", &state.truststore),
        };
        if !current.contains(&alias) {
            return Err(ConsoleError::not_found(resource, &alias));
        }

        let references = state.storage.key_alias_references(&alias).await?;
        if !references.is_empty() {
            return Err(ConsoleError::Conflict(format!(
                "alias '{alias}' is still referenced by {}",
                references.join(", ")
            )));
        }

        let mut next = current.clone();
        next.remove(&alias);
        persist(state, kind, next).await?;
        info!(alias = %alias, store = resource, "entry deleted");
        Ok(())
    }
}

async fn load_or_create(
    storage: &Storage,
    kind: StoreKind,
    settings: &StoreSettings,
) -> ConsoleResult<KeyMaterial> {
    match storage.load_store(kind).await? {
        Some(row) => {
            let store_type = row.store_type.parse::<KeyStoreType>()?;
            KeyMaterial::load_stored(&row.bytes, store_type, &row.password, row.created)
        }
        None => {
            let material = KeyMaterial::new();
            let (store_type, password) = target(settings, kind);
            let bytes = material.to_bytes(store_type, password)?;
            storage
                .save_store(kind, store_type.as_str(), password, &bytes)
                .await?;
            debug!(store = ?kind, "created empty store");
            Ok(material)
        }
    }
}

fn target(settings: &StoreSettings, kind: StoreKind) -> (KeyStoreType, &str) {
    match kind {
        StoreKind::Keystore => (settings.keystore_type, &settings.keystore_password),
        StoreKind::Truststore => (settings.truststore_type, &settings.truststore_password),
    }
}

async fn persist(
    state: &mut KeyMaterialState,
    kind: StoreKind,
    next: KeyMaterial,
) -> ConsoleResult<()> {
    let (store_type, password) = target(&state.settings, kind);
    let bytes = next.to_bytes(store_type, password)?;
    if let Err(e) = state
        .storage
        .save_store(kind, store_type.as_str(), password, &bytes)
        .await
    {
        warn!(store = ?kind, error = %e, "persisting store failed, keeping previous content");
        return Err(e);
    }
    match kind {
        StoreKind::Keystore => state.keystore = next,
        StoreKind::Truststore => state.truststore = next,
    }
    Ok(())
}

fn export(
    material: &KeyMaterial,
    store_type: KeyStoreType,
    password: &str,
) -> ConsoleResult<ExportedStore> {
    Ok(ExportedStore {
        store_type,
        bytes: material.to_bytes(store_type, password)?,
    })
}

fn resolve_public_key(state: &KeyMaterialState, alias: &str) -> Option<PublicKeyMaterial> {
    [&state.keystore, &state.truststore]
        .into_iter()
        .filter_map(|store| store.get(alias)?.certificate())
        .find_map(|der| PublicKeyMaterial::from_certificate(der).ok())
}

/// Pick the key entries to import and the aliases they will get.
///
/// Fails without importing anything when a requested alias is missing or is
/// not a key, when any target alias is already taken, or when a key's leaf
/// certificate is already stored under another alias.
pub fn plan_key_import(
    current: &KeyMaterial,
    uploaded: &KeyMaterial,
    aliases: Option<&[String]>,
    rename: &HashMap<String, String>,
) -> ConsoleResult<Vec<(String, PrivateKeyEntry)>> {
    let requested: Vec<String> = match aliases {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ => uploaded
            .entries()
            .filter(|(_, entry)| matches!(entry, Entry::PrivateKey(_)))
            .map(|(alias, _)| alias.to_string())
            .collect(),
    };
    if requested.is_empty() {
        return Err(ConsoleError::BadRequest(
            "the uploaded keystore contains no private key entries".into(),
        ));
    }

    let mut planned = Vec::with_capacity(requested.len());
    let mut duplicates = Vec::new();
    let mut taken = BTreeSet::new();
    let mut seen_fingerprints = BTreeSet::new();
    for alias in &requested {
        let Some(entry) = uploaded.get(alias) else {
            return Err(ConsoleError::BadRequest(format!(
                "alias '{alias}' does not exist in the uploaded keystore"
            )));
        };
        let Entry::PrivateKey(key) = entry else {
            return Err(ConsoleError::BadRequest(format!(
                "alias '{alias}' is not a private key entry"
            )));
        };
        let target = normalize_alias(rename.get(alias).map(String::as_str).unwrap_or(alias));
        if target.is_empty() {
            return Err(ConsoleError::BadRequest(format!(
                "alias '{alias}' would be stored under an empty alias"
            )));
        }
        let mut conflict = false;
        if current.contains(&target) || !taken.insert(target.clone()) {
            duplicates.push(format!("alias '{target}'"));
            conflict = true;
        }
        if let Some(leaf) = key.leaf() {
            let fp = fingerprint(leaf);
            if let Some(existing) = current.find_by_fingerprint(&fp) {
                duplicates.push(format!("certificate {fp} (stored as '{existing}')"));
                conflict = true;
            } else if !seen_fingerprints.insert(fp.clone()) {
                duplicates.push(format!("certificate {fp} (uploaded twice)"));
                conflict = true;
            }
        }
        if !conflict {
            planned.push((target, key.clone()));
        }
    }

    if !duplicates.is_empty() {
        return Err(ConsoleError::Duplicates(duplicates));
    }
    Ok(planned)
}

/// Collect every certificate of `uploaded` for the truststore.
///
/// Aliases already present and certificates already trusted (by SHA-256
/// fingerprint, under any alias) are conflicts; all of them are reported
/// and nothing is merged.
pub fn plan_trust_merge(
    current: &KeyMaterial,
    uploaded: &KeyMaterial,
) -> ConsoleResult<Vec<(String, TrustedCertificateEntry)>> {
    let mut planned = Vec::new();
    let mut duplicates = Vec::new();
    let mut seen_aliases = BTreeSet::new();
    let mut seen_fingerprints = BTreeSet::new();

    for (alias, entry) in uploaded.entries() {
        let Some(der) = entry.certificate() else {
            continue;
        };
        let alias = normalize_alias(alias);
        let fp = fingerprint(der);

        let mut conflict = false;
        if current.contains(&alias) || !seen_aliases.insert(alias.clone()) {
            duplicates.push(format!("alias '{alias}'"));
            conflict = true;
        }
        if let Some(existing) = current.find_by_fingerprint(&fp) {
            duplicates.push(format!("certificate {fp} (stored as '{existing}')"));
            conflict = true;
        } else if !seen_fingerprints.insert(fp.clone()) {
            duplicates.push(format!("certificate {fp} (uploaded twice)"));
            conflict = true;
        }
        if !conflict {
            planned.push((
                alias,
                TrustedCertificateEntry {
                    certificate: der.to_vec(),
                    created: entry.created(),
                },
            ));
        }
    }

    if !duplicates.is_empty() {
        return Err(ConsoleError::Duplicates(duplicates));
    }
    if planned.is_empty() {
        return Err(ConsoleError::BadRequest(
            "the uploaded store contains no certificates".into(),
        ));
    }
    Ok(planned)
}

/// Spawn the key material actor, loading both stores from `storage`.
pub async fn spawn(storage: Storage, settings: StoreSettings) -> ConsoleResult<KeyMaterialHandle> {
    let (actor, _jh) = Actor::spawn(None, KeyMaterialActor, (storage, settings))
        .await
        .map_err(|e| ConsoleError::RactorError(format!("failed to spawn KeyMaterialActor: {e}")))?;
    Ok(KeyMaterialHandle { actor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keystore::EntryKind;
    use crate::db::sqlite::test_support::temp_storage;

    const TRUST_JKS: &[u8] = include_bytes!("../../tests/fixtures/trust.jks");
    const TRUST_RENAMED_JKS: &[u8] = include_bytes!("../../tests/fixtures/trust-renamed.jks");
    const CLIENT_JKS: &[u8] = include_bytes!("../../tests/fixtures/client.jks");
    const SIGNER_P12: &[u8] = include_bytes!("../../tests/fixtures/signer.p12");

    fn settings() -> StoreSettings {
        StoreSettings {
            keystore_type: KeyStoreType::Pkcs12,
            keystore_password: "appstore".into(),
            truststore_type: KeyStoreType::Jks,
            truststore_password: "apptrust".into(),
        }
    }

    fn upload(bytes: &[u8], password: &str) -> StoreUpload {
        StoreUpload {
            bytes: bytes.to_vec(),
            password: password.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn duplicate_certificate_merge_changes_nothing() {
        let storage = temp_storage().await;
        let handle = spawn(storage.clone(), settings()).await.unwrap();

        let merged = handle
            .merge_truststore(upload(TRUST_JKS, "trustpass"))
            .await
            .unwrap();
        assert_eq!(merged, vec!["ca-one".to_string(), "ca-two".to_string()]);
        let before = storage.load_store(StoreKind::Truststore).await.unwrap().unwrap();

        // same aliases again
        let err = handle
            .merge_truststore(upload(TRUST_JKS, "trustpass"))
            .await
            .unwrap_err();
        let ConsoleError::Duplicates(found) = err else {
            panic!("expected duplicates, got {err:?}");
        };
        assert_eq!(found.iter().filter(|d| d.starts_with("alias")).count(), 2);

        // same certificate under a new alias
        let err = handle
            .merge_truststore(upload(TRUST_RENAMED_JKS, "trustpass"))
            .await
            .unwrap_err();
        let ConsoleError::Duplicates(found) = err else {
            panic!("expected duplicates, got {err:?}");
        };
        assert!(found[0].contains("stored as 'ca-one'"));

        let after = storage.load_store(StoreKind::Truststore).await.unwrap().unwrap();
        assert_eq!(before.bytes, after.bytes);
        assert_eq!(handle.list_certificates().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn key_import_rejects_duplicate_alias_or_key() {
        let storage = temp_storage().await;
        let handle = spawn(storage.clone(), settings()).await.unwrap();

        let imported = handle.import_keys(upload(SIGNER_P12, "changeit")).await.unwrap();
        assert_eq!(imported, vec!["signer".to_string()]);

        let err = handle
            .import_keys(upload(SIGNER_P12, "changeit"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::Duplicates(_)));

        // same key under a new alias
        let mut renamed = upload(SIGNER_P12, "changeit");
        renamed
            .rename
            .insert("signer".into(), "Signer-Two".into());
        let err = handle.import_keys(renamed).await.unwrap_err();
        let ConsoleError::Duplicates(found) = err else {
            panic!("expected duplicates, got {err:?}");
        };
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("stored as 'signer'"));
        assert_eq!(handle.list_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn truststore_merge_skips_key_passwords() {
        let storage = temp_storage().await;
        let handle = spawn(storage, settings()).await.unwrap();

        // client-key is protected by its own password, which is not given
        let merged = handle
            .merge_truststore(upload(CLIENT_JKS, "storepass"))
            .await
            .unwrap();
        assert_eq!(merged, vec!["client-key".to_string(), "shared-key".to_string()]);
        let certificates = handle.list_certificates().await.unwrap();
        assert!(certificates.iter().all(|c| c.kind == EntryKind::TrustedCertificate));
        assert!(handle.signing_key("client-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_entries_keep_their_timestamps_across_restarts() {
        let storage = temp_storage().await;
        let handle = spawn(storage.clone(), settings()).await.unwrap();
        handle.import_keys(upload(SIGNER_P12, "changeit")).await.unwrap();
        let row = storage.load_store(StoreKind::Keystore).await.unwrap().unwrap();

        let first = spawn(storage.clone(), settings()).await.unwrap();
        let second = spawn(storage, settings()).await.unwrap();
        let a = first.get_key("signer").await.unwrap().unwrap();
        let b = second.get_key("signer").await.unwrap().unwrap();
        assert_eq!(a.created, row.created);
        assert_eq!(a.created, b.created);
    }

    #[tokio::test]
    async fn jks_import_uses_key_passwords_and_survives_restart() {
        let storage = temp_storage().await;
        let handle = spawn(storage.clone(), settings()).await.unwrap();

        let mut jks = upload(CLIENT_JKS, "storepass");
        jks.aliases = Some(vec!["client-key".into()]);
        let err = handle.import_keys(jks.clone()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::KeyPassword { .. }));

        jks.key_passwords.insert("client-key".into(), "keypass".into());
        assert_eq!(handle.import_keys(jks).await.unwrap(), vec!["client-key"]);

        let reloaded = spawn(storage, settings()).await.unwrap();
        assert!(reloaded.signing_key("client-key").await.unwrap().is_some());
        assert!(reloaded.public_key("CLIENT-KEY").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_or_unsuitable_aliases_are_rejected() {
        let storage = temp_storage().await;
        let handle = spawn(storage, settings()).await.unwrap();

        let mut missing = upload(SIGNER_P12, "changeit");
        missing.aliases = Some(vec!["nope".into()]);
        assert!(matches!(
            handle.import_keys(missing).await,
            Err(ConsoleError::BadRequest(_))
        ));
        assert!(matches!(
            handle.import_keys(upload(TRUST_JKS, "trustpass")).await,
            Err(ConsoleError::BadRequest(_))
        ));
        assert!(matches!(
            handle.import_keys(upload(SIGNER_P12, "wrong")).await,
            Err(ConsoleError::KeystorePassword)
        ));
    }

    #[tokio::test]
    async fn referenced_keys_cannot_be_deleted() {
        use crate::db::models::{ClientAttrs, ProviderAttrs};

        let storage = temp_storage().await;
        let handle = spawn(storage.clone(), settings()).await.unwrap();
        handle.import_keys(upload(SIGNER_P12, "changeit")).await.unwrap();

        let provider_id = storage
            .insert_provider(&ProviderAttrs {
                name: "idp".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let client_id = storage
            .insert_client(&ClientAttrs {
                provider_id,
                client_id: "svc".into(),
                authentication_type: "private_key_jwt".into(),
                signing_key_alias: Some("signer".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(matches!(
            handle.delete_key("signer").await,
            Err(ConsoleError::Conflict(_))
        ));
        storage.delete_client(client_id).await.unwrap();
        handle.delete_key("signer").await.unwrap();
        assert!(matches!(
            handle.delete_key("signer").await,
            Err(ConsoleError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn export_reencodes_with_requested_password() {
        let storage = temp_storage().await;
        let handle = spawn(storage, settings()).await.unwrap();
        handle.merge_truststore(upload(TRUST_JKS, "trustpass")).await.unwrap();

        let exported = handle
            .export_truststore(Some(KeyStoreType::Pkcs12), Some("out".into()))
            .await
            .unwrap();
        assert_eq!(exported.store_type, KeyStoreType::Pkcs12);
        let back = KeyMaterial::load(&exported.bytes, None, "out", &HashMap::new()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(handle.trusted_certificates().await.unwrap().len(), 2);
    }
}

//! Format-neutral in-memory key store.
//!
//! Both JKS and PKCS#12 files decode into a [`KeyMaterial`]: a map from alias
//! to either a plaintext PKCS#8 key with its certificate chain, or a trusted
//! certificate. Keys are re-protected only when the store is serialized.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, PrivateKeyInfo};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

use crate::crypto::{jks, pkcs12};
use crate::error::{ConsoleError, ConsoleResult};

const OID_RSA: &str = "1.2.840.113549.1.1.1";
const OID_EC: &str = "1.2.840.10045.2.1";
const OID_ED25519: &str = "1.3.101.112";
const OID_P256: &str = "1.2.840.10045.3.1.7";
const OID_P384: &str = "1.3.132.0.34";
const OID_P521: &str = "1.3.132.0.35";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStoreType {
    Pkcs12,
    Jks,
}

impl KeyStoreType {
    /// Guess the container format from its first bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if jks::is_jks(bytes) {
            Some(KeyStoreType::Jks)
        } else if bytes.first() == Some(&0x30) {
            Some(KeyStoreType::Pkcs12)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStoreType::Pkcs12 => "PKCS12",
            KeyStoreType::Jks => "JKS",
        }
    }
}

impl fmt::Display for KeyStoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStoreType {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pkcs12" | "p12" | "pfx" => Ok(KeyStoreType::Pkcs12),
            "jks" => Ok(KeyStoreType::Jks),
            other => Err(ConsoleError::BadRequest(format!(
                "unsupported keystore type '{other}'"
            ))),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKeyEntry {
    /// Plaintext PKCS#8 `PrivateKeyInfo`.
    pub key: Vec<u8>,
    /// Leaf first.
    pub chain: Vec<Vec<u8>>,
    pub created: DateTime<Utc>,
}

impl fmt::Debug for PrivateKeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyEntry")
            .field("key", &"<KEY>")
            .field("chain_len", &self.chain.len())
            .field("created", &self.created)
            .finish()
    }
}

impl PrivateKeyEntry {
    pub fn leaf(&self) -> Option<&[u8]> {
        self.chain.first().map(Vec::as_slice)
    }

    pub fn algorithm(&self) -> ConsoleResult<KeyAlgorithm> {
        KeyAlgorithm::from_pkcs8(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedCertificateEntry {
    pub certificate: Vec<u8>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    PrivateKey(PrivateKeyEntry),
    TrustedCertificate(TrustedCertificateEntry),
}

impl Entry {
    /// The certificate that identifies this entry (leaf of a key chain).
    pub fn certificate(&self) -> Option<&[u8]> {
        match self {
            Entry::PrivateKey(key) => key.leaf(),
            Entry::TrustedCertificate(cert) => Some(&cert.certificate),
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        match self {
            Entry::PrivateKey(key) => key.created,
            Entry::TrustedCertificate(cert) => cert.created,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EcCurve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    Ec { curve: EcCurve },
    Ed25519,
}

impl KeyAlgorithm {
    pub fn from_pkcs8(der: &[u8]) -> ConsoleResult<Self> {
        let info = PrivateKeyInfo::try_from(der)
            .map_err(|e| ConsoleError::KeystoreFormat(format!("invalid PKCS#8 key: {e}")))?;
        match info.algorithm.oid.to_string().as_str() {
            OID_RSA => {
                let key = RsaPrivateKey::from_pkcs8_der(der)
                    .map_err(|e| ConsoleError::KeystoreFormat(format!("invalid RSA key: {e}")))?;
                Ok(KeyAlgorithm::Rsa {
                    bits: key.size() * 8,
                })
            }
            OID_EC => {
                let curve = info
                    .algorithm
                    .parameters_oid()
                    .map_err(|e| ConsoleError::KeystoreFormat(format!("EC key without curve: {e}")))?;
                Ok(KeyAlgorithm::Ec {
                    curve: curve_from_oid(&curve.to_string())?,
                })
            }
            OID_ED25519 => Ok(KeyAlgorithm::Ed25519),
            other => Err(ConsoleError::UnsupportedAlgorithm(format!(
                "private key algorithm {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa { .. } => "RSA",
            KeyAlgorithm::Ec { .. } => "EC",
            KeyAlgorithm::Ed25519 => "Ed25519",
        }
    }

    pub fn size(&self) -> usize {
        match self {
            KeyAlgorithm::Rsa { bits } => *bits,
            KeyAlgorithm::Ec {
                curve: EcCurve::P256,
            } => 256,
            KeyAlgorithm::Ec {
                curve: EcCurve::P384,
            } => 384,
            KeyAlgorithm::Ec {
                curve: EcCurve::P521,
            } => 521,
            KeyAlgorithm::Ed25519 => 256,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "RSA-{bits}"),
            KeyAlgorithm::Ec { curve } => write!(f, "EC {curve:?}"),
            KeyAlgorithm::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

fn curve_from_oid(oid: &str) -> ConsoleResult<EcCurve> {
    match oid {
        OID_P256 => Ok(EcCurve::P256),
        OID_P384 => Ok(EcCurve::P384),
        OID_P521 => Ok(EcCurve::P521),
        other => Err(ConsoleError::UnsupportedAlgorithm(format!("EC curve {other}"))),
    }
}

/// Public half of a certificate, as needed for verification and encryption.
#[derive(Debug, Clone)]
pub struct PublicKeyMaterial {
    pub algorithm: KeyAlgorithm,
    /// Contents of the SPKI bit string: PKCS#1 `RSAPublicKey` for RSA, the
    /// encoded point for EC, the raw key for Ed25519.
    pub raw: Vec<u8>,
    pub certificate: Vec<u8>,
}

impl PublicKeyMaterial {
    pub fn from_certificate(der: &[u8]) -> ConsoleResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ConsoleError::KeystoreFormat(format!("invalid certificate: {e}")))?;
        let spki = cert.public_key();
        let oid = spki.algorithm.algorithm.to_id_string();
        let algorithm = if oid == OID_ED25519 {
            KeyAlgorithm::Ed25519
        } else {
            match spki
                .parsed()
                .map_err(|e| ConsoleError::KeystoreFormat(format!("invalid public key: {e}")))?
            {
                PublicKey::RSA(rsa) => KeyAlgorithm::Rsa {
                    bits: rsa.key_size(),
                },
                PublicKey::EC(point) => KeyAlgorithm::Ec {
                    curve: match point.key_size() {
                        256 => EcCurve::P256,
                        384 => EcCurve::P384,
                        521 | 528 => EcCurve::P521,
                        other => {
                            return Err(ConsoleError::UnsupportedAlgorithm(format!(
                                "EC key of {other} bits"
                            )));
                        }
                    },
                },
                _ => {
                    return Err(ConsoleError::UnsupportedAlgorithm(format!(
                        "public key algorithm {oid}"
                    )));
                }
            }
        };
        Ok(Self {
            algorithm,
            raw: spki.subject_public_key.data.to_vec(),
            certificate: der.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub sha256_fingerprint: String,
}

impl CertificateInfo {
    pub fn from_der(der: &[u8]) -> ConsoleResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ConsoleError::KeystoreFormat(format!("invalid certificate: {e}")))?;
        let validity = cert.validity();
        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial_number: cert.raw_serial_as_string(),
            not_before: DateTime::from_timestamp(validity.not_before.timestamp(), 0),
            not_after: DateTime::from_timestamp(validity.not_after.timestamp(), 0),
            sha256_fingerprint: fingerprint(der),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    PrivateKey,
    TrustedCertificate,
}

/// Displayable description of one store entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub alias: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_length: Option<usize>,
    pub chain_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInfo>,
    pub created: DateTime<Utc>,
}

/// Uppercase colon separated SHA-256 of a DER certificate.
pub fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn normalize_alias(alias: &str) -> String {
    alias.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct KeyMaterial {
    entries: BTreeMap<String, Entry>,
}

impl KeyMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an uploaded keystore file.
    ///
    /// For JKS key entries the per-alias password from `key_passwords` is
    /// tried first, then the store password. PKCS#12 keys always use the
    /// store password and are stamped with the current time.
    pub fn load(
        bytes: &[u8],
        store_type: Option<KeyStoreType>,
        password: &str,
        key_passwords: &HashMap<String, String>,
    ) -> ConsoleResult<Self> {
        Self::load_at(bytes, store_type, password, key_passwords, Utc::now())
    }

    /// Decode a persisted store; PKCS#12 entries get `created`, the time the
    /// store itself was first saved, so they keep it across restarts.
    pub fn load_stored(
        bytes: &[u8],
        store_type: KeyStoreType,
        password: &str,
        created: DateTime<Utc>,
    ) -> ConsoleResult<Self> {
        Self::load_at(bytes, Some(store_type), password, &HashMap::new(), created)
    }

    fn load_at(
        bytes: &[u8],
        store_type: Option<KeyStoreType>,
        password: &str,
        key_passwords: &HashMap<String, String>,
        created: DateTime<Utc>,
    ) -> ConsoleResult<Self> {
        let mut material = KeyMaterial::new();
        match resolve_type(bytes, store_type)? {
            KeyStoreType::Pkcs12 => {
                for (alias, entry) in pkcs12::decode(bytes, password, created)? {
                    material.entries.insert(alias, entry);
                }
            }
            KeyStoreType::Jks => {
                let file = jks::decode(bytes, password)?;
                for alias in file.aliases() {
                    let entry = if file.is_private_key(&alias) {
                        let key = recover_with_fallback(&file, &alias, key_passwords, password)?;
                        Entry::PrivateKey(PrivateKeyEntry {
                            key: key.key,
                            chain: key.chain,
                            created: key.created,
                        })
                    } else {
                        let (certificate, created) = file.trusted_certificate(&alias)?;
                        Entry::TrustedCertificate(TrustedCertificateEntry {
                            certificate,
                            created,
                        })
                    };
                    material.entries.insert(alias, entry);
                }
            }
        }
        Ok(material)
    }

    /// Decode only the certificates of a keystore file: trusted entries as
    /// they are and the leaf of every key entry. JKS key passwords are never
    /// needed.
    pub fn load_certificates(
        bytes: &[u8],
        store_type: Option<KeyStoreType>,
        password: &str,
    ) -> ConsoleResult<Self> {
        let now = Utc::now();
        let mut material = KeyMaterial::new();
        match resolve_type(bytes, store_type)? {
            KeyStoreType::Pkcs12 => {
                for (alias, entry) in pkcs12::decode(bytes, password, now)? {
                    if let Some(certificate) = entry.certificate() {
                        let trusted = TrustedCertificateEntry {
                            certificate: certificate.to_vec(),
                            created: now,
                        };
                        material
                            .entries
                            .insert(alias, Entry::TrustedCertificate(trusted));
                    }
                }
            }
            KeyStoreType::Jks => {
                let file = jks::decode(bytes, password)?;
                for alias in file.aliases() {
                    let (certificate, created) = if file.is_private_key(&alias) {
                        match file.certificate_chain(&alias)?.into_iter().next() {
                            Some(leaf) => (leaf, now),
                            None => continue,
                        }
                    } else {
                        file.trusted_certificate(&alias)?
                    };
                    material.entries.insert(
                        alias,
                        Entry::TrustedCertificate(TrustedCertificateEntry {
                            certificate,
                            created,
                        }),
                    );
                }
            }
        }
        Ok(material)
    }

    /// Serialize, protecting the store and every key with `password`.
    pub fn to_bytes(&self, store_type: KeyStoreType, password: &str) -> ConsoleResult<Vec<u8>> {
        match store_type {
            KeyStoreType::Pkcs12 => pkcs12::encode(
                self.entries.iter().map(|(alias, entry)| (alias.as_str(), entry)),
                password,
            ),
            KeyStoreType::Jks => jks::encode(
                self.entries.iter().map(|(alias, entry)| {
                    let entry = match entry {
                        Entry::PrivateKey(key) => jks::JksEntry::PrivateKey {
                            key: &key.key,
                            chain: &key.chain,
                            created: key.created,
                        },
                        Entry::TrustedCertificate(cert) => jks::JksEntry::TrustedCertificate {
                            certificate: &cert.certificate,
                            created: cert.created,
                        },
                    };
                    (alias.as_str(), entry)
                }),
                password,
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(alias, entry)| (alias.as_str(), entry))
    }

    /// Look up an alias, falling back to a case-insensitive match.
    pub fn get(&self, alias: &str) -> Option<&Entry> {
        self.entries.get(alias).or_else(|| {
            self.entries
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(alias))
                .map(|(_, entry)| entry)
        })
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        if let Some((key, _)) = self.entries.get_key_value(alias) {
            return Some(key);
        }
        self.entries
            .keys()
            .find(|candidate| candidate.eq_ignore_ascii_case(alias))
            .map(String::as_str)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_some()
    }

    pub fn insert(&mut self, alias: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(alias.into(), entry)
    }

    pub fn remove(&mut self, alias: &str) -> Option<Entry> {
        let key = self.resolve_alias(alias)?.to_string();
        self.entries.remove(&key)
    }

    pub fn private_key(&self, alias: &str) -> Option<&PrivateKeyEntry> {
        match self.get(alias)? {
            Entry::PrivateKey(key) => Some(key),
            Entry::TrustedCertificate(_) => None,
        }
    }

    /// Alias holding a certificate with this SHA-256 fingerprint.
    pub fn find_by_fingerprint(&self, fingerprint_hex: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| {
                entry
                    .certificate()
                    .is_some_and(|der| fingerprint(der) == fingerprint_hex)
            })
            .map(|(alias, _)| alias.as_str())
    }

    pub fn info(&self, alias: &str) -> Option<EntryInfo> {
        let key = self.resolve_alias(alias)?;
        let entry = self.entries.get(key)?;
        Some(describe(key, entry))
    }

    pub fn infos(&self) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .map(|(alias, entry)| describe(alias, entry))
            .collect()
    }
}

fn resolve_type(bytes: &[u8], store_type: Option<KeyStoreType>) -> ConsoleResult<KeyStoreType> {
    match store_type {
        Some(t) => Ok(t),
        None => KeyStoreType::detect(bytes)
            .ok_or_else(|| ConsoleError::KeystoreFormat("unrecognized keystore format".into())),
    }
}

fn recover_with_fallback(
    file: &jks::JksFile,
    alias: &str,
    key_passwords: &HashMap<String, String>,
    store_password: &str,
) -> ConsoleResult<jks::JksKey> {
    let explicit = key_passwords
        .get(alias)
        .or_else(|| {
            key_passwords
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(alias))
                .map(|(_, pw)| pw)
        })
        .map(String::as_str);

    explicit
        .into_iter()
        .chain(std::iter::once(store_password))
        .find_map(|password| file.private_key(alias, password))
        .ok_or_else(|| ConsoleError::KeyPassword {
            alias: alias.to_string(),
        })
}

fn describe(alias: &str, entry: &Entry) -> EntryInfo {
    let certificate = entry
        .certificate()
        .and_then(|der| CertificateInfo::from_der(der).ok());
    match entry {
        Entry::PrivateKey(key) => {
            let algorithm = key.algorithm().ok();
            EntryInfo {
                alias: alias.to_string(),
                kind: EntryKind::PrivateKey,
                key_algorithm: algorithm.map(|a| a.name().to_string()),
                key_length: algorithm.map(|a| a.size()),
                chain_length: key.chain.len(),
                certificate,
                created: key.created,
            }
        }
        Entry::TrustedCertificate(cert) => EntryInfo {
            alias: alias.to_string(),
            kind: EntryKind::TrustedCertificate,
            key_algorithm: None,
            key_length: None,
            chain_length: 1,
            certificate,
            created: cert.created,
        },
    }
}

/// Accept a certificate as PEM text or base64 DER.
pub fn parse_certificate(input: &str) -> ConsoleResult<Vec<u8>> {
    let trimmed = input.trim();
    let der = if trimmed.starts_with("-----BEGIN") {
        let body: String = trimmed
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .map(str::trim)
            .collect();
        STANDARD.decode(body)?
    } else {
        let compact: String = trimmed.split_whitespace().collect();
        STANDARD.decode(compact)?
    };
    // make sure it is a certificate before accepting it
    CertificateInfo::from_der(&der)?;
    Ok(der)
}

pub fn to_pem(label: &str, der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_JKS: &[u8] = include_bytes!("../../tests/fixtures/client.jks");
    const SIGNER_P12: &[u8] = include_bytes!("../../tests/fixtures/signer.p12");
    const EC_P12: &[u8] = include_bytes!("../../tests/fixtures/ec-signer.p12");
    const CA_THREE_PEM: &str = include_str!("../../tests/fixtures/ca-three.pem");

    fn passwords(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(a, p)| (a.to_string(), p.to_string()))
            .collect()
    }

    #[test]
    fn detects_container_format() {
        assert_eq!(KeyStoreType::detect(CLIENT_JKS), Some(KeyStoreType::Jks));
        assert_eq!(KeyStoreType::detect(SIGNER_P12), Some(KeyStoreType::Pkcs12));
        assert_eq!(KeyStoreType::detect(b"hello"), None);
        assert_eq!("P12".parse::<KeyStoreType>().unwrap(), KeyStoreType::Pkcs12);
        assert!("bks".parse::<KeyStoreType>().is_err());
    }

    #[test]
    fn key_password_resolution_falls_back_to_store_password() {
        let err = KeyMaterial::load(CLIENT_JKS, None, "storepass", &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConsoleError::KeyPassword { ref alias } if alias == "client-key"));

        let material = KeyMaterial::load(
            CLIENT_JKS,
            None,
            "storepass",
            &passwords(&[("client-key", "keypass")]),
        )
        .unwrap();
        assert_eq!(material.len(), 2);
        // shared-key uses the store password
        assert!(material.private_key("shared-key").is_some());
        assert!(material.private_key("CLIENT-KEY").is_some());
    }

    #[test]
    fn wrong_explicit_key_password_still_tries_store_password() {
        let material = KeyMaterial::load(
            CLIENT_JKS,
            Some(KeyStoreType::Jks),
            "storepass",
            &passwords(&[("client-key", "keypass"), ("shared-key", "bogus")]),
        )
        .unwrap();
        assert!(material.contains("shared-key"));
    }

    #[test]
    fn describes_rsa_and_ec_keys() {
        let rsa = KeyMaterial::load(SIGNER_P12, None, "changeit", &HashMap::new()).unwrap();
        let info = rsa.info("signer").unwrap();
        assert_eq!(info.kind, EntryKind::PrivateKey);
        assert_eq!(info.key_algorithm.as_deref(), Some("RSA"));
        assert_eq!(info.key_length, Some(2048));
        assert!(info.certificate.unwrap().subject.contains("signer"));

        let ec = KeyMaterial::load(EC_P12, None, "changeit", &HashMap::new()).unwrap();
        let key = ec.private_key("ec-signer").unwrap();
        assert_eq!(
            key.algorithm().unwrap(),
            KeyAlgorithm::Ec {
                curve: EcCurve::P256
            }
        );
    }

    #[test]
    fn converts_between_formats() {
        let material = KeyMaterial::load(
            CLIENT_JKS,
            None,
            "storepass",
            &passwords(&[("client-key", "keypass")]),
        )
        .unwrap();
        let p12 = material.to_bytes(KeyStoreType::Pkcs12, "exported").unwrap();
        let back = KeyMaterial::load(&p12, None, "exported", &HashMap::new()).unwrap();
        assert_eq!(
            material.private_key("client-key").unwrap().key,
            back.private_key("client-key").unwrap().key
        );

        let jks_bytes = back.to_bytes(KeyStoreType::Jks, "again-pw").unwrap();
        let again = KeyMaterial::load(&jks_bytes, None, "again-pw", &HashMap::new()).unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn certificates_load_without_key_passwords() {
        let material = KeyMaterial::load_certificates(CLIENT_JKS, None, "storepass").unwrap();
        assert_eq!(material.len(), 2);
        assert!(material.private_key("client-key").is_none());
        let keys = KeyMaterial::load(
            CLIENT_JKS,
            None,
            "storepass",
            &passwords(&[("client-key", "keypass")]),
        )
        .unwrap();
        assert_eq!(
            material.get("client-key").and_then(Entry::certificate),
            keys.get("client-key").and_then(Entry::certificate)
        );

        assert!(matches!(
            KeyMaterial::load_certificates(CLIENT_JKS, None, "wrong-pass"),
            Err(ConsoleError::KeystorePassword)
        ));
        let signer = KeyMaterial::load_certificates(SIGNER_P12, None, "changeit").unwrap();
        assert!(matches!(signer.get("signer"), Some(Entry::TrustedCertificate(_))));
    }

    #[test]
    fn stored_pkcs12_keeps_its_timestamp() {
        let created = Utc::now() - chrono::Duration::days(10);
        let first = KeyMaterial::load_stored(SIGNER_P12, KeyStoreType::Pkcs12, "changeit", created)
            .unwrap();
        let second =
            KeyMaterial::load_stored(SIGNER_P12, KeyStoreType::Pkcs12, "changeit", created)
                .unwrap();
        assert_eq!(first.info("signer").unwrap().created, created);
        assert_eq!(
            first.info("signer").unwrap().created,
            second.info("signer").unwrap().created
        );
    }

    #[test]
    fn public_key_from_certificate() {
        let der = parse_certificate(CA_THREE_PEM).unwrap();
        let public = PublicKeyMaterial::from_certificate(&der).unwrap();
        assert_eq!(public.algorithm, KeyAlgorithm::Rsa { bits: 2048 });
        assert_eq!(fingerprint(&der).len(), 32 * 3 - 1);
    }

    #[test]
    fn fingerprint_lookup() {
        let der = parse_certificate(CA_THREE_PEM).unwrap();
        let mut material = KeyMaterial::new();
        material.insert(
            "ca",
            Entry::TrustedCertificate(TrustedCertificateEntry {
                certificate: der.clone(),
                created: Utc::now(),
            }),
        );
        assert_eq!(material.find_by_fingerprint(&fingerprint(&der)), Some("ca"));
        assert!(material.remove("CA").is_some());
        assert!(material.is_empty());
    }

    #[test]
    fn pem_round_trip() {
        let der = parse_certificate(CA_THREE_PEM).unwrap();
        let pem = to_pem("CERTIFICATE", &der);
        assert_eq!(parse_certificate(&pem).unwrap(), der);
        assert!(parse_certificate("bm90IGEgY2VydA==").is_err());
    }
}

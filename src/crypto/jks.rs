//! Java KeyStore (JKS) files, read and written through the `jks` crate.

use chrono::{DateTime, Utc};
use std::io::Cursor;
use std::time::SystemTime;

use crate::error::{ConsoleError, ConsoleResult};

const MAGIC: [u8; 4] = [0xFE, 0xED, 0xFE, 0xED];
const CERT_TYPE_X509: &str = "X.509";

pub fn is_jks(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

/// A decoded JKS file. Key entries stay protected until [`JksFile::private_key`]
/// is asked for them with a password.
pub struct JksFile {
    store: ::jks::KeyStore,
}

/// Key entry recovered from a JKS file.
pub struct JksKey {
    /// Plaintext PKCS#8 `PrivateKeyInfo`.
    pub key: Vec<u8>,
    pub chain: Vec<Vec<u8>>,
    pub created: DateTime<Utc>,
}

/// Parse a JKS file, verifying its integrity digest with `password`.
pub fn decode(bytes: &[u8], password: &str) -> ConsoleResult<JksFile> {
    if !is_jks(bytes) {
        return Err(ConsoleError::KeystoreFormat("not a JKS file (bad magic)".into()));
    }
    let mut store = ::jks::KeyStore::new();
    store
        .load(&mut Cursor::new(bytes), password.as_bytes())
        .map_err(load_error)?;
    Ok(JksFile { store })
}

fn load_error(e: impl std::fmt::Display) -> ConsoleError {
    let message = e.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("digest") || lower.contains("password") {
        ConsoleError::KeystorePassword
    } else {
        ConsoleError::KeystoreFormat(message)
    }
}

impl JksFile {
    /// Aliases in a stable order.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = self.store.aliases();
        aliases.sort();
        aliases
    }

    pub fn is_private_key(&self, alias: &str) -> bool {
        self.store.is_private_key_entry(alias)
    }

    /// Decrypt a key entry; `None` when `password` does not open it.
    pub fn private_key(&self, alias: &str, password: &str) -> Option<JksKey> {
        let entry = self
            .store
            .get_private_key_entry(alias, password.as_bytes())
            .ok()?;
        Some(JksKey {
            key: entry.private_key,
            chain: entry
                .certificate_chain
                .into_iter()
                .map(|cert| cert.content)
                .collect(),
            created: DateTime::<Utc>::from(entry.creation_time),
        })
    }

    /// Certificate chain of a key entry, readable without its key password.
    pub fn certificate_chain(&self, alias: &str) -> ConsoleResult<Vec<Vec<u8>>> {
        let chain = self
            .store
            .get_private_key_entry_certificate_chain(alias)
            .map_err(|e| ConsoleError::KeystoreFormat(e.to_string()))?;
        Ok(chain.into_iter().map(|cert| cert.content).collect())
    }

    pub fn trusted_certificate(&self, alias: &str) -> ConsoleResult<(Vec<u8>, DateTime<Utc>)> {
        let entry = self
            .store
            .get_trusted_certificate_entry(alias)
            .map_err(|e| ConsoleError::KeystoreFormat(e.to_string()))?;
        Ok((
            entry.certificate.content,
            DateTime::<Utc>::from(entry.creation_time),
        ))
    }
}

/// Entry to write into a new JKS file.
pub enum JksEntry<'a> {
    PrivateKey {
        key: &'a [u8],
        chain: &'a [Vec<u8>],
        created: DateTime<Utc>,
    },
    TrustedCertificate {
        certificate: &'a [u8],
        created: DateTime<Utc>,
    },
}

fn certificate(der: &[u8]) -> ::jks::Certificate {
    ::jks::Certificate {
        cert_type: CERT_TYPE_X509.to_string(),
        content: der.to_vec(),
    }
}

/// Write a JKS file; every key is protected with the store password.
pub fn encode<'a>(
    entries: impl IntoIterator<Item = (&'a str, JksEntry<'a>)>,
    password: &str,
) -> ConsoleResult<Vec<u8>> {
    let mut store = ::jks::KeyStore::new();
    for (alias, entry) in entries {
        match entry {
            JksEntry::PrivateKey {
                key,
                chain,
                created,
            } => store.set_private_key_entry(
                alias,
                ::jks::PrivateKeyEntry {
                    creation_time: SystemTime::from(created),
                    private_key: key.to_vec(),
                    certificate_chain: chain.iter().map(|der| certificate(der)).collect(),
                },
                password.as_bytes(),
            ),
            JksEntry::TrustedCertificate {
                certificate: der,
                created,
            } => store.set_trusted_certificate_entry(
                alias,
                ::jks::TrustedCertificateEntry {
                    creation_time: SystemTime::from(created),
                    certificate: certificate(der),
                },
            ),
        }
        .map_err(|e| ConsoleError::KeystoreFormat(format!("cannot store alias '{alias}': {e}")))?;
    }

    let mut out = Vec::new();
    store
        .store(&mut out, password.as_bytes())
        .map_err(|e| ConsoleError::KeystoreFormat(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_JKS: &[u8] = include_bytes!("../../tests/fixtures/client.jks");

    #[test]
    fn wrong_store_password_is_a_password_error() {
        assert!(matches!(
            decode(CLIENT_JKS, "nope-nope"),
            Err(ConsoleError::KeystorePassword)
        ));
        assert!(matches!(
            decode(b"\x30\x82\x01", "storepass"),
            Err(ConsoleError::KeystoreFormat(_))
        ));
    }

    #[test]
    fn key_entries_need_their_own_password() {
        let file = decode(CLIENT_JKS, "storepass").unwrap();
        assert!(file.is_private_key("client-key"));
        assert!(file.private_key("client-key", "storepass").is_none());

        let key = file.private_key("client-key", "keypass").unwrap();
        assert!(!key.chain.is_empty());
        assert_eq!(file.certificate_chain("client-key").unwrap(), key.chain);
    }

    #[test]
    fn written_files_open_again() {
        let file = decode(CLIENT_JKS, "storepass").unwrap();
        let key = file.private_key("client-key", "keypass").unwrap();
        let bytes = encode(
            [(
                "client-key",
                JksEntry::PrivateKey {
                    key: &key.key,
                    chain: &key.chain,
                    created: key.created,
                },
            )],
            "rewritten",
        )
        .unwrap();
        assert!(is_jks(&bytes));

        let again = decode(&bytes, "rewritten").unwrap();
        assert_eq!(again.aliases(), vec!["client-key".to_string()]);
        let back = again.private_key("client-key", "rewritten").unwrap();
        assert_eq!(back.key, key.key);
        assert_eq!(back.created.timestamp(), key.created.timestamp());
    }
}

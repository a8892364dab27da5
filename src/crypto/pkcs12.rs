//! PKCS#12 import/export on top of `p12-keystore`.

use chrono::{DateTime, Utc};
use p12_keystore::error::Error as P12Error;
use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use sha1::{Digest, Sha1};

use crate::crypto::keystore::{Entry, PrivateKeyEntry, TrustedCertificateEntry};
use crate::error::{ConsoleError, ConsoleResult};

/// Decode a PKCS#12 file. The format has no per-entry timestamp, so every
/// entry is stamped with `created`.
pub fn decode(
    bytes: &[u8],
    password: &str,
    created: DateTime<Utc>,
) -> ConsoleResult<Vec<(String, Entry)>> {
    let store = KeyStore::from_pkcs12(bytes, password).map_err(map_error)?;

    Ok(store
        .entries()
        .map(|(alias, entry)| {
            let entry = match entry {
                KeyStoreEntry::PrivateKeyChain(chain) => Entry::PrivateKey(PrivateKeyEntry {
                    key: chain.key().to_vec(),
                    chain: chain.chain().iter().map(|c| c.as_der().to_vec()).collect(),
                    created,
                }),
                KeyStoreEntry::Certificate(cert) => {
                    Entry::TrustedCertificate(TrustedCertificateEntry {
                        certificate: cert.as_der().to_vec(),
                        created,
                    })
                }
            };
            (alias.to_string(), entry)
        })
        .collect())
}

pub fn encode<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a Entry)>,
    password: &str,
) -> ConsoleResult<Vec<u8>> {
    let mut store = KeyStore::new();
    for (alias, entry) in entries {
        let entry = match entry {
            Entry::PrivateKey(key) => {
                let chain = key
                    .chain
                    .iter()
                    .map(|der| Certificate::from_der(der))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_error)?;
                let local_key_id = key
                    .chain
                    .first()
                    .map(|leaf| Sha1::digest(leaf).to_vec())
                    .unwrap_or_else(|| Sha1::digest(alias.as_bytes()).to_vec());
                KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(&key.key, local_key_id, chain))
            }
            Entry::TrustedCertificate(cert) => KeyStoreEntry::Certificate(
                Certificate::from_der(&cert.certificate).map_err(map_error)?,
            ),
        };
        store.add_entry(alias, entry);
    }
    store.writer(password).write().map_err(map_error)
}

fn map_error(err: P12Error) -> ConsoleError {
    match err {
        P12Error::MacError(_) | P12Error::UnpadError | P12Error::Pkcs5Error(_) => {
            ConsoleError::KeystorePassword
        }
        other => ConsoleError::KeystoreFormat(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNER_P12: &[u8] = include_bytes!("../../tests/fixtures/signer.p12");
    const TRUST_P12: &[u8] = include_bytes!("../../tests/fixtures/trust.p12");

    #[test]
    fn reads_keytool_pkcs12() {
        let entries = decode(SIGNER_P12, "changeit", Utc::now()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "signer");
        assert!(matches!(entries[0].1, Entry::PrivateKey(_)));
    }

    #[test]
    fn reads_trusted_certificates() {
        let entries = decode(TRUST_P12, "trustpass", Utc::now()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "ca-three");
        assert!(matches!(entries[0].1, Entry::TrustedCertificate(_)));
    }

    #[test]
    fn wrong_password_is_reported() {
        assert!(matches!(
            decode(SIGNER_P12, "wrong", Utc::now()),
            Err(ConsoleError::KeystorePassword)
        ));
    }

    #[test]
    fn entries_carry_the_given_timestamp() {
        let created = Utc::now() - chrono::Duration::days(3);
        let first = decode(SIGNER_P12, "changeit", created).unwrap();
        let second = decode(SIGNER_P12, "changeit", created).unwrap();
        let (Entry::PrivateKey(a), Entry::PrivateKey(b)) = (&first[0].1, &second[0].1) else {
            panic!("expected private key entries");
        };
        assert_eq!(a.created, created);
        assert_eq!(a.created, b.created);
    }

    #[test]
    fn written_store_reads_back() {
        let entries = decode(SIGNER_P12, "changeit", Utc::now()).unwrap();
        let bytes = encode(entries.iter().map(|(a, e)| (a.as_str(), e)), "fresh").unwrap();
        let reread = decode(&bytes, "fresh", Utc::now()).unwrap();
        assert_eq!(reread.len(), 1);
        match (&entries[0].1, &reread[0].1) {
            (Entry::PrivateKey(a), Entry::PrivateKey(b)) => {
                assert_eq!(a.key, b.key);
                assert_eq!(a.chain, b.chain);
            }
            _ => panic!("expected private key entries"),
        }
    }
}

//! Compact JWE with RSA-OAEP key wrapping and AES-GCM content encryption,
//! on top of `josekit`.

use josekit::jwe::{self, JweHeader, RSA_OAEP, RSA_OAEP_256};
use josekit::jwe::alg::rsaes::RsaesJweAlgorithm;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{ConsoleError, ConsoleResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyManagement {
    RsaOaep,
    RsaOaep256,
}

impl KeyManagement {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyManagement::RsaOaep => "RSA-OAEP",
            KeyManagement::RsaOaep256 => "RSA-OAEP-256",
        }
    }

    fn algorithm(&self) -> &'static RsaesJweAlgorithm {
        match self {
            KeyManagement::RsaOaep => &RSA_OAEP,
            KeyManagement::RsaOaep256 => &RSA_OAEP_256,
        }
    }
}

impl FromStr for KeyManagement {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA-OAEP" => Ok(KeyManagement::RsaOaep),
            "RSA-OAEP-256" => Ok(KeyManagement::RsaOaep256),
            other => Err(ConsoleError::UnsupportedAlgorithm(format!(
                "JWE alg '{other}' is not supported, use RSA-OAEP or RSA-OAEP-256"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncryption {
    A128Gcm,
    A256Gcm,
}

impl ContentEncryption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncryption::A128Gcm => "A128GCM",
            ContentEncryption::A256Gcm => "A256GCM",
        }
    }
}

impl FromStr for ContentEncryption {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A128GCM" => Ok(ContentEncryption::A128Gcm),
            "A256GCM" => Ok(ContentEncryption::A256Gcm),
            other => Err(ConsoleError::UnsupportedAlgorithm(format!(
                "JWE enc '{other}' is not supported, use A128GCM or A256GCM"
            ))),
        }
    }
}

fn crypto(what: &str) -> impl FnOnce(josekit::JoseError) -> ConsoleError + '_ {
    move |e| ConsoleError::Crypto(format!("{what}: {e}"))
}

/// Encrypt `plaintext` for the holder of the RSA public key `public_der`
/// (PKCS#1 or SubjectPublicKeyInfo). Every member of `header` except `alg`
/// ends up in the protected header.
pub fn seal(
    alg: KeyManagement,
    enc: ContentEncryption,
    header: Map<String, Value>,
    public_der: &[u8],
    plaintext: &[u8],
) -> ConsoleResult<String> {
    let mut header = JweHeader::from_map(header).map_err(crypto("invalid JWE header"))?;
    header.set_content_encryption(enc.as_str());

    let encrypter = alg
        .algorithm()
        .encrypter_from_der(public_der)
        .map_err(crypto("invalid RSA public key"))?;
    jwe::serialize_compact(plaintext, &header, &encrypter)
        .map_err(crypto("JWE encryption failed"))
}

/// Decrypt a compact JWE with the PKCS#8 RSA private key `private_der`.
pub fn open(alg: KeyManagement, token: &str, private_der: &[u8]) -> ConsoleResult<Vec<u8>> {
    let decrypter = alg
        .algorithm()
        .decrypter_from_der(private_der)
        .map_err(crypto("invalid RSA private key"))?;
    let (payload, _header) =
        jwe::deserialize_compact(token, &decrypter).map_err(crypto("JWE decryption failed"))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_to_algorithms() {
        assert_eq!(
            "RSA-OAEP-256".parse::<KeyManagement>().unwrap(),
            KeyManagement::RsaOaep256
        );
        assert_eq!(
            "A128GCM".parse::<ContentEncryption>().unwrap(),
            ContentEncryption::A128Gcm
        );
        assert!("RSA1_5".parse::<KeyManagement>().is_err());
        assert!("A128CBC-HS256".parse::<ContentEncryption>().is_err());
    }
}

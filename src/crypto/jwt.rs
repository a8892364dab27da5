//! Builds and inspects compact JWS / JWE tokens with keys from the
//! application stores.
//!
//! The header decides the token kind: a header carrying `enc` produces a JWE,
//! anything else a JWS. Header members are passed through untouched apart
//! from the optional `kid` and `x5t#S256` additions.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::crypto::jwe::{self, ContentEncryption, KeyManagement};
use crate::crypto::keystore::{EcCurve, KeyAlgorithm, PrivateKeyEntry, PublicKeyMaterial};
use crate::error::{ConsoleError, ConsoleResult};

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub add_kid: bool,
    pub add_x5t_s256: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            add_kid: true,
            add_x5t_s256: false,
        }
    }
}

pub fn is_jwe_header(header: &Map<String, Value>) -> bool {
    header.contains_key("enc")
}

fn header_str<'a>(header: &'a Map<String, Value>, name: &str) -> ConsoleResult<&'a str> {
    header
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ConsoleError::BadRequest(format!("JWT header must contain '{name}'")))
}

/// Signature algorithm named by a JWS header. `none` and HMAC are refused.
pub fn jws_algorithm(header: &Map<String, Value>) -> ConsoleResult<Algorithm> {
    let name = header_str(header, "alg")?;
    let alg = Algorithm::from_str(name).map_err(|_| {
        ConsoleError::UnsupportedAlgorithm(format!("JWS alg '{name}' is not supported"))
    })?;
    if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(ConsoleError::UnsupportedAlgorithm(format!(
            "JWS alg '{name}' needs a shared secret, only asymmetric keys are supported"
        )));
    }
    Ok(alg)
}

/// Reject algorithm / key combinations that cannot produce a valid signature.
pub fn check_jws_family(alg: Algorithm, key: KeyAlgorithm) -> ConsoleResult<()> {
    let ok = match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => matches!(key, KeyAlgorithm::Rsa { .. }),
        Algorithm::ES256 => key
            == KeyAlgorithm::Ec {
                curve: EcCurve::P256,
            },
        Algorithm::ES384 => key
            == KeyAlgorithm::Ec {
                curve: EcCurve::P384,
            },
        Algorithm::EdDSA => key == KeyAlgorithm::Ed25519,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ConsoleError::UnsupportedAlgorithm(format!(
            "alg {alg:?} cannot be used with a {key} key"
        )))
    }
}

fn jwe_algorithms(header: &Map<String, Value>) -> ConsoleResult<(KeyManagement, ContentEncryption)> {
    let alg = header_str(header, "alg")?.parse::<KeyManagement>()?;
    let enc = header_str(header, "enc")?.parse::<ContentEncryption>()?;
    Ok((alg, enc))
}

/// Serialize a body the way it ends up in the payload: strings verbatim,
/// everything else as JSON.
pub fn payload_bytes(body: &Value) -> ConsoleResult<Vec<u8>> {
    match body {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Ok(serde_json::to_vec(other)?),
    }
}

fn x5t_s256(certificate: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(certificate))
}

fn decorate(
    header: &mut Map<String, Value>,
    alias: &str,
    certificate: Option<&[u8]>,
    options: BuildOptions,
) {
    if options.add_kid && !header.contains_key("kid") {
        header.insert("kid".into(), Value::String(alias.to_string()));
    }
    if options.add_x5t_s256 {
        if let Some(cert) = certificate {
            header.insert("x5t#S256".into(), Value::String(x5t_s256(cert)));
        }
    }
}

fn encode_header(header: &Map<String, Value>) -> ConsoleResult<String> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?))
}

fn encoding_key(key: &PrivateKeyEntry, algorithm: KeyAlgorithm) -> ConsoleResult<EncodingKey> {
    match algorithm {
        KeyAlgorithm::Rsa { .. } => {
            let rsa = RsaPrivateKey::from_pkcs8_der(&key.key)
                .map_err(|e| ConsoleError::Crypto(format!("invalid RSA key: {e}")))?;
            let pkcs1 = rsa
                .to_pkcs1_der()
                .map_err(|e| ConsoleError::Crypto(format!("cannot encode RSA key: {e}")))?;
            Ok(EncodingKey::from_rsa_der(pkcs1.as_bytes()))
        }
        KeyAlgorithm::Ec { .. } => Ok(EncodingKey::from_ec_der(&key.key)),
        KeyAlgorithm::Ed25519 => Ok(EncodingKey::from_ed_der(&key.key)),
    }
}

fn decoding_key(public: &PublicKeyMaterial) -> DecodingKey {
    match public.algorithm {
        KeyAlgorithm::Rsa { .. } => DecodingKey::from_rsa_der(&public.raw),
        KeyAlgorithm::Ec { .. } => DecodingKey::from_ec_der(&public.raw),
        KeyAlgorithm::Ed25519 => DecodingKey::from_ed_der(&public.raw),
    }
}

/// Sign `payload` with the private key stored under `alias`.
pub fn sign_jws(
    mut header: Map<String, Value>,
    payload: &[u8],
    alias: &str,
    key: &PrivateKeyEntry,
    options: BuildOptions,
) -> ConsoleResult<String> {
    let alg = jws_algorithm(&header)?;
    let key_algorithm = key.algorithm()?;
    check_jws_family(alg, key_algorithm)?;

    decorate(&mut header, alias, key.leaf(), options);
    let signing_input = format!(
        "{}.{}",
        encode_header(&header)?,
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = jsonwebtoken::crypto::sign(
        signing_input.as_bytes(),
        &encoding_key(key, key_algorithm)?,
        alg,
    )?;
    Ok(format!("{signing_input}.{signature}"))
}

/// Encrypt `payload` to the certificate stored under `alias`.
pub fn encrypt_jwe(
    mut header: Map<String, Value>,
    payload: &[u8],
    alias: &str,
    recipient: &PublicKeyMaterial,
    options: BuildOptions,
) -> ConsoleResult<String> {
    let (alg, enc) = jwe_algorithms(&header)?;
    if !matches!(recipient.algorithm, KeyAlgorithm::Rsa { .. }) {
        return Err(ConsoleError::UnsupportedAlgorithm(format!(
            "JWE alg {} needs an RSA key, '{alias}' holds a {} key",
            alg.as_str(),
            recipient.algorithm
        )));
    }

    decorate(&mut header, alias, Some(&recipient.certificate), options);
    jwe::seal(alg, enc, header, &recipient.raw, payload)
}

/// A compact token split into its parts.
pub enum CompactToken {
    Jws {
        header: Map<String, Value>,
        payload: Vec<u8>,
        signing_input: String,
        signature: String,
    },
    Jwe {
        header: Map<String, Value>,
        token: String,
    },
}

impl CompactToken {
    pub fn header(&self) -> &Map<String, Value> {
        match self {
            CompactToken::Jws { header, .. } | CompactToken::Jwe { header, .. } => header,
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.header().get("kid").and_then(Value::as_str)
    }
}

fn decode_part(part: &str, what: &str) -> ConsoleResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(part.trim_end_matches('='))
        .map_err(|e| ConsoleError::BadRequest(format!("JWT {what} is not base64url: {e}")))
}

fn decode_header(part: &str) -> ConsoleResult<Map<String, Value>> {
    let raw = decode_part(part, "header")?;
    match serde_json::from_slice::<Value>(&raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(ConsoleError::BadRequest(
            "JWT header must be a JSON object".into(),
        )),
    }
}

pub fn split(token: &str) -> ConsoleResult<CompactToken> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    match parts.as_slice() {
        [header, payload, signature] => Ok(CompactToken::Jws {
            header: decode_header(header)?,
            payload: decode_part(payload, "payload")?,
            signing_input: format!("{header}.{payload}"),
            signature: signature.to_string(),
        }),
        [header, encrypted_key, iv, ciphertext, tag] => {
            for (part, what) in [
                (encrypted_key, "encrypted key"),
                (iv, "iv"),
                (ciphertext, "ciphertext"),
                (tag, "tag"),
            ] {
                decode_part(part, what)?;
            }
            Ok(CompactToken::Jwe {
                header: decode_header(header)?,
                token: parts.join("."),
            })
        }
        other => Err(ConsoleError::BadRequest(format!(
            "a compact JWT has 3 (JWS) or 5 (JWE) parts, found {}",
            other.len()
        ))),
    }
}

/// `Ok(false)` for a well formed token whose signature does not match.
pub fn verify_jws(
    header: &Map<String, Value>,
    signing_input: &str,
    signature: &str,
    public: &PublicKeyMaterial,
) -> ConsoleResult<bool> {
    let alg = jws_algorithm(header)?;
    check_jws_family(alg, public.algorithm)?;
    Ok(matches!(
        jsonwebtoken::crypto::verify(
            signature,
            signing_input.as_bytes(),
            &decoding_key(public),
            alg
        ),
        Ok(true)
    ))
}

pub fn decrypt_jwe(
    header: &Map<String, Value>,
    token: &str,
    key: &PrivateKeyEntry,
) -> ConsoleResult<Vec<u8>> {
    let (alg, _enc) = jwe_algorithms(header)?;
    if !matches!(key.algorithm()?, KeyAlgorithm::Rsa { .. }) {
        return Err(ConsoleError::UnsupportedAlgorithm(format!(
            "JWE alg {} needs an RSA private key",
            alg.as_str()
        )));
    }
    jwe::open(alg, token, &key.key)
}

/// Interpret a decoded payload: JSON when it parses, text otherwise.
pub fn payload_value(payload: &[u8]) -> Value {
    serde_json::from_slice::<Value>(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

mod common;

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;

use common::*;

#[tokio::test]
async fn signed_token_builds_and_verifies() {
    let app = spawn_app().await;
    app.import_signer().await;

    let (status, built) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({
                "header": { "alg": "RS256", "typ": "JWT" },
                "body": { "sub": "alice", "aud": "api" },
                "keyAlias": "signer",
                "addX5tS256": true
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{built}");
    assert_eq!(built["kind"], "JWS");
    assert_eq!(built["header"]["kid"], "signer");
    assert!(built["header"]["x5t#S256"].is_string());
    let token = built["token"].as_str().unwrap().to_string();

    // kid is enough to find the verification key
    let (status, parsed) = app
        .request("POST", "/scim/v2/JwtBuilder/.parse", Some(json!({ "token": token })))
        .await;
    assert_eq!(status, StatusCode::OK, "{parsed}");
    assert_eq!(parsed["kind"], "JWS");
    assert_eq!(parsed["signatureValid"], true);
    assert_eq!(parsed["keyAlias"], "signer");
    assert_eq!(parsed["body"]["sub"], "alice");

    let parts: Vec<&str> = token.split('.').collect();
    let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"mallory","aud":"api"}"#);
    let tampered = format!("{}.{forged}.{}", parts[0], parts[2]);
    let (status, parsed) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder/.parse",
            Some(json!({ "token": tampered, "keyAlias": "signer" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{parsed}");
    assert_eq!(parsed["signatureValid"], false);
}

#[tokio::test]
async fn unknown_key_leaves_signature_unchecked() {
    let app = spawn_app().await;
    app.import_signer().await;
    let (_, built) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({
                "header": { "alg": "PS256" },
                "body": "plain text payload",
                "keyAlias": "signer",
                "addKid": false
            })),
        )
        .await;
    assert!(built["header"].get("kid").is_none());

    let (status, parsed) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder/.parse",
            Some(json!({ "token": built["token"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(parsed.get("signatureValid").is_none());
    assert_eq!(parsed["body"], "plain text payload");
}

#[tokio::test]
async fn algorithm_must_fit_the_key() {
    let app = spawn_app().await;
    app.import_signer().await;

    let (status, _) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({ "header": { "alg": "ES256" }, "body": {}, "keyAlias": "signer" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({ "header": {}, "body": {}, "keyAlias": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["inputFieldErrors"]["header"].is_array());
    assert!(body["inputFieldErrors"]["keyAlias"].is_array());

    let (status, _) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({ "header": { "alg": "RS256" }, "body": {}, "keyAlias": "missing" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ec_key_signs_es256() {
    let app = spawn_app().await;
    let (status, body) = app
        .request(
            "POST",
            "/scim/v2/Keystore",
            Some(json!({ "keystoreFile": b64(EC_SIGNER_P12), "password": "changeit" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, built) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({ "header": { "alg": "ES256" }, "body": { "n": 1 }, "keyAlias": "ec-signer" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{built}");

    let (_, parsed) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder/.parse",
            Some(json!({ "token": built["token"] })),
        )
        .await;
    assert_eq!(parsed["signatureValid"], true);
    assert_eq!(parsed["body"]["n"], 1);
}

#[tokio::test]
async fn encrypted_token_round_trips() {
    let app = spawn_app().await;
    app.import_signer().await;

    let (status, built) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({
                "header": { "alg": "RSA-OAEP-256", "enc": "A256GCM" },
                "body": { "secret": "value" },
                "keyAlias": "signer"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{built}");
    assert_eq!(built["kind"], "JWE");
    let token = built["token"].as_str().unwrap().to_string();
    assert_eq!(token.split('.').count(), 5);

    let (status, parsed) = app
        .request("POST", "/scim/v2/JwtBuilder/.parse", Some(json!({ "token": token })))
        .await;
    assert_eq!(status, StatusCode::OK, "{parsed}");
    assert_eq!(parsed["kind"], "JWE");
    assert_eq!(parsed["body"]["secret"], "value");

    let (status, _) = app
        .request(
            "POST",
            "/scim/v2/JwtBuilder",
            Some(json!({
                "header": { "alg": "ECDH-ES", "enc": "A256GCM" },
                "body": {},
                "keyAlias": "signer"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

pub mod jks;
pub mod jwe;
pub mod jwt;
pub mod keystore;
pub mod pkcs12;

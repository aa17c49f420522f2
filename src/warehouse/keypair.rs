use crate::errors::DataSourceError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

const TOKEN_LIFETIME_MINUTES: i64 = 59;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    iat: i64,
    exp: i64,
}

/// Signs short-lived RS256 JWTs for Snowflake key-pair authentication.
pub struct KeyPairSigner {
    issuer: String,
    subject: String,
    encoding_key: EncodingKey,
}

impl KeyPairSigner {
    pub fn from_pem(
        account: &str,
        user: &str,
        pem: &str,
        passphrase: Option<&str>,
    ) -> Result<Self, DataSourceError> {
        let key = decode_private_key(pem, passphrase)?;
        let fingerprint = public_key_fingerprint(&RsaPublicKey::from(&key))?;
        let der = key
            .to_pkcs1_der()
            .map_err(|err| DataSourceError::connection(format!("invalid private key: {err}")))?;
        let subject = format!("{}.{}", account_identifier(account), user.to_uppercase());
        Ok(Self {
            issuer: format!("{subject}.{fingerprint}"),
            subject,
            encoding_key: EncodingKey::from_rsa_der(der.as_bytes()),
        })
    }

    pub fn token(&self, now: DateTime<Utc>) -> Result<String, DataSourceError> {
        let claims = Claims {
            iss: &self.issuer,
            sub: &self.subject,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(TOKEN_LIFETIME_MINUTES)).timestamp(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|err| DataSourceError::connection(format!("failed to sign key-pair token: {err}")))
    }
}

fn decode_private_key(pem: &str, passphrase: Option<&str>) -> Result<RsaPrivateKey, DataSourceError> {
    let pem = pem.trim();
    let decoded = if pem.contains("BEGIN ENCRYPTED PRIVATE KEY") {
        let passphrase = passphrase.ok_or_else(|| {
            DataSourceError::connection("private key is encrypted but no passphrase is configured")
        })?;
        RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase.as_bytes())
            .map_err(|err| err.to_string())
    } else if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(pem).map_err(|err| err.to_string())
    } else {
        RsaPrivateKey::from_pkcs8_pem(pem).map_err(|err| err.to_string())
    };
    decoded.map_err(|err| DataSourceError::connection(format!("invalid private key: {err}")))
}

/// `SHA256:<base64 digest of the DER public key>`, as registered on the user.
fn public_key_fingerprint(key: &RsaPublicKey) -> Result<String, DataSourceError> {
    let der = key
        .to_public_key_der()
        .map_err(|err| DataSourceError::connection(format!("invalid public key: {err}")))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(format!("SHA256:{}", STANDARD.encode(digest)))
}

/// Account locator without region or cloud suffix, upper-cased.
fn account_identifier(account: &str) -> String {
    account
        .split('.')
        .next()
        .unwrap_or(account)
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use rsa::pkcs8::LineEnding;

    const KEY_PEM: &str = include_str!("testdata/rsa_key.p8");
    const ENCRYPTED_KEY_PEM: &str = include_str!("testdata/rsa_key_encrypted.p8");

    fn decoded_claims(token: &str) -> serde_json::Value {
        let key = RsaPrivateKey::from_pkcs8_pem(KEY_PEM).unwrap();
        let public_pem = RsaPublicKey::from(&key).to_public_key_pem(LineEnding::LF).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        decode::<serde_json::Value>(
            token,
            &DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn account_identifier_drops_region() {
        assert_eq!(account_identifier("xy12345.us-east-1"), "XY12345");
        assert_eq!(account_identifier("myorg-acct"), "MYORG-ACCT");
    }

    #[test]
    fn token_carries_claims_and_valid_signature() {
        let signer = KeyPairSigner::from_pem("xy12345.us-east-1", "dash_user", KEY_PEM, None).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();

        let claims = decoded_claims(&signer.token(now).unwrap());
        assert_eq!(claims["sub"], "XY12345.DASH_USER");
        assert!(claims["iss"].as_str().unwrap().starts_with("XY12345.DASH_USER.SHA256:"));
        assert_eq!(claims["iat"], now.timestamp());
        assert_eq!(claims["exp"], now.timestamp() + 59 * 60);
    }

    #[test]
    fn encrypted_key_opens_with_passphrase() {
        let plain = KeyPairSigner::from_pem("acct", "user", KEY_PEM, None).unwrap();
        let encrypted =
            KeyPairSigner::from_pem("acct", "user", ENCRYPTED_KEY_PEM, Some("s3cret")).unwrap();
        assert_eq!(plain.issuer, encrypted.issuer);

        let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(decoded_claims(&encrypted.token(now).unwrap())["sub"], "ACCT.USER");
    }

    #[test]
    fn garbage_key_is_a_connection_error() {
        let err = KeyPairSigner::from_pem("acct", "user", "not a key", None).err().unwrap();
        assert!(matches!(err, DataSourceError::Connection(_)));
    }

    #[test]
    fn encrypted_key_without_passphrase_is_rejected() {
        let err = KeyPairSigner::from_pem("acct", "user", ENCRYPTED_KEY_PEM, None).err().unwrap();
        assert!(err.to_string().contains("no passphrase"));
    }
}

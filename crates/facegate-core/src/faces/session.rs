use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::secret_service::{SecretKey, MIN_SIGNING_KEY_BYTES};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaims {
    pub fn identity(&self) -> &str {
        &self.sub
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Signed credential handed to the caller after a successful match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub claims: SessionClaims,
}

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

/// Mints and checks HS256 session tokens with a process-held key.
#[derive(Clone)]
pub struct SessionIssuer {
    mac: HmacSha256,
    ttl: Duration,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(key: &SecretKey, ttl: Duration) -> AppResult<Self> {
        if key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(AppError::SecretKeyInvalid(format!(
                "expected at least {MIN_SIGNING_KEY_BYTES} bytes but found {}",
                key.len()
            )));
        }
        let mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|err| AppError::SecretKeyInvalid(err.to_string()))?;
        Ok(Self {
            mac,
            ttl: ttl.max(Duration::from_secs(1)),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &str) -> AppResult<SessionToken> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &str, now: DateTime<Utc>) -> AppResult<SessionToken> {
        let iat = now.timestamp();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            sub: identity.to_string(),
            iat,
            exp: iat.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
        };

        let header = TokenHeader {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        let signing_input = format!(
            "{}.{}",
            encode_segment(&header)?,
            encode_segment(&claims)?
        );
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&signing_input));

        debug!(target: "session", identity, exp = claims.exp, jti = %claims.jti, "session token issued");
        Ok(SessionToken {
            token: format!("{signing_input}.{signature}"),
            claims,
        })
    }

    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AppResult<SessionClaims> {
        let mut parts = token.trim().split('.');
        let (Some(header_part), Some(claims_part), Some(signature_part), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::TokenInvalid(
                "expected three dot-separated segments".into(),
            ));
        };

        let header: TokenHeader = decode_segment(header_part, "header")?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(AppError::TokenInvalid(format!(
                "unsupported algorithm '{}'",
                header.alg
            )));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|err| AppError::TokenInvalid(format!("invalid signature encoding: {err}")))?;
        let mut mac = self.mac.clone();
        mac.update(header_part.as_bytes());
        mac.update(b".");
        mac.update(claims_part.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AppError::TokenInvalid("signature mismatch".into()))?;

        let claims: SessionClaims = decode_segment(claims_part, "claims")?;
        if now.timestamp() >= claims.exp {
            return Err(AppError::TokenExpired {
                identity: claims.sub,
                expired_at: claims.exp,
            });
        }
        Ok(claims)
    }

    fn sign(&self, signing_input: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn encode_segment<T: Serialize>(value: &T) -> AppResult<String> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str, label: &str) -> AppResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|err| AppError::TokenInvalid(format!("invalid {label} encoding: {err}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| AppError::TokenInvalid(format!("invalid {label}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(
            &SecretKey::from_bytes(b"an-adequately-long-signing-key-0123456789".to_vec()),
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    #[test]
    fn issued_token_verifies_and_carries_identity() {
        let issuer = issuer();
        let token = issuer.issue("alice").unwrap();
        let claims = issuer.verify(token.as_str()).unwrap();
        assert_eq!(claims.identity(), "alice");
        assert_eq!(claims, token.claims);
        assert_eq!(token.as_str().split('.').count(), 3);
    }

    #[test]
    fn token_expires_exactly_one_hour_after_issue() {
        let issuer = issuer();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let token = issuer.issue_at("alice", now).unwrap();
        assert_eq!(token.claims.exp - token.claims.iat, 3600);

        let just_before = now + ChronoDuration::seconds(3599);
        assert!(issuer.verify_at(token.as_str(), just_before).is_ok());

        let at_expiry = now + ChronoDuration::seconds(3600);
        let err = issuer.verify_at(token.as_str(), at_expiry).unwrap_err();
        assert!(matches!(err, AppError::TokenExpired { identity, .. } if identity == "alice"));
    }

    #[test]
    fn tampering_is_detected() {
        let issuer = issuer();
        let token = issuer.issue("alice").unwrap();
        let mut parts: Vec<String> = token.as_str().split('.').map(String::from).collect();

        let forged = SessionClaims {
            sub: "mallory".into(),
            ..token.claims.clone()
        };
        parts[1] = encode_segment(&forged).unwrap();
        let err = issuer.verify(&parts.join(".")).unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid(msg) if msg.contains("signature")));
    }

    #[test]
    fn tokens_from_another_key_are_rejected() {
        let other = SessionIssuer::new(
            &SecretKey::from_bytes(vec![7u8; 32]),
            Duration::from_secs(3600),
        )
        .unwrap();
        let token = other.issue("alice").unwrap();
        assert!(matches!(
            issuer().verify(token.as_str()),
            Err(AppError::TokenInvalid(_))
        ));
    }

    #[test]
    fn malformed_tokens_are_invalid() {
        let issuer = issuer();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(matches!(
                issuer.verify(token),
                Err(AppError::TokenInvalid(_))
            ));
        }
    }

    #[test]
    fn short_keys_are_rejected() {
        let err = SessionIssuer::new(&SecretKey::from_bytes(vec![1u8; 8]), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, AppError::SecretKeyInvalid(_)));
    }

    #[test]
    fn each_token_gets_a_fresh_id() {
        let issuer = issuer();
        assert_ne!(issuer.issue("alice").unwrap().claims.jti, issuer.issue("alice").unwrap().claims.jti);
    }
}

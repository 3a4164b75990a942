use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::{Embedding, RawVector};
use crate::faces::gallery::Gallery;
use crate::faces::matcher::{MatchResult, Matcher};
use crate::faces::session::{SessionIssuer, SessionToken};
use crate::faces::store::EmbeddingStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthOutcome {
    Matched {
        identity: String,
        distance: f64,
        token: SessionToken,
    },
    NoMatch {
        closest_identity: String,
        distance: f64,
    },
    EmptyGallery,
}

impl AuthOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthOutcome::Matched { .. })
    }
}

pub fn validate_probes(probes: Vec<RawVector>) -> AppResult<Vec<Embedding>> {
    if probes.is_empty() {
        return Err(AppError::NoProbe);
    }
    probes
        .into_iter()
        .map(RawVector::into_embedding)
        .collect()
}

/// Scores the submitted probes against a fresh gallery and issues a token
/// for the first accepted identity.
pub fn authenticate<S: EmbeddingStore + ?Sized>(
    store: &S,
    matcher: &Matcher,
    issuer: &SessionIssuer,
    probes: Vec<RawVector>,
) -> AppResult<AuthOutcome> {
    let probes = validate_probes(probes)?;

    let gallery = match Gallery::build(store) {
        Ok(gallery) => gallery,
        Err(AppError::EmptyGallery) => {
            warn!(target: "auth", "authentication attempted against an empty gallery");
            return Ok(AuthOutcome::EmptyGallery);
        }
        Err(err) => return Err(err),
    };

    let outcome = match matcher.match_probes(&probes, &gallery)? {
        MatchResult::Matched { identity, distance } => {
            let token = issuer.issue(&identity)?;
            info!(target: "auth", identity = %identity, distance, "authentication accepted");
            AuthOutcome::Matched {
                identity,
                distance,
                token,
            }
        }
        MatchResult::NoMatch {
            closest_identity,
            distance,
        } => {
            info!(
                target: "auth",
                closest = %closest_identity,
                distance,
                threshold = matcher.threshold(),
                "authentication rejected"
            );
            AuthOutcome::NoMatch {
                closest_identity,
                distance,
            }
        }
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::enrollment::register;
    use crate::faces::store::MemoryStore;
    use crate::secret_service::SecretKey;
    use std::time::Duration;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(&SecretKey::from_bytes(vec![9u8; 32]), Duration::from_secs(3600))
            .unwrap()
    }

    fn vectors(values: &[&[f64]]) -> Vec<RawVector> {
        values.iter().map(|v| RawVector::from(v.to_vec())).collect()
    }

    #[test]
    fn matched_probe_yields_verifiable_token() {
        let store = MemoryStore::new();
        register(&store, "alice", vectors(&[&[0.0, 0.0, 0.0]])).unwrap();
        let issuer = issuer();

        let outcome = authenticate(
            &store,
            &Matcher::default(),
            &issuer,
            vectors(&[&[0.0, 0.0, 0.01]]),
        )
        .unwrap();
        match outcome {
            AuthOutcome::Matched {
                identity,
                distance,
                token,
            } => {
                assert_eq!(identity, "alice");
                assert!((distance - 0.01).abs() < 1e-9);
                assert_eq!(issuer.verify(token.as_str()).unwrap().sub, "alice");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn empty_store_is_an_outcome() {
        let outcome = authenticate(
            &MemoryStore::new(),
            &Matcher::default(),
            &issuer(),
            vectors(&[&[0.0]]),
        )
        .unwrap();
        assert_eq!(outcome, AuthOutcome::EmptyGallery);
    }

    #[test]
    fn probes_are_validated_first() {
        let store = MemoryStore::new();
        assert!(matches!(
            authenticate(&store, &Matcher::default(), &issuer(), vec![]),
            Err(AppError::NoProbe)
        ));
        assert!(matches!(
            authenticate(&store, &Matcher::default(), &issuer(), vectors(&[&[]])),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn distant_probe_is_rejected_without_token() {
        let store = MemoryStore::new();
        register(&store, "bob", vectors(&[&[1.0, 1.0]])).unwrap();
        let outcome = authenticate(
            &store,
            &Matcher::default(),
            &issuer(),
            vectors(&[&[5.0, 5.0]]),
        )
        .unwrap();
        assert!(!outcome.is_accepted());
        assert!(matches!(outcome, AuthOutcome::NoMatch { ref closest_identity, .. } if closest_identity == "bob"));
    }
}

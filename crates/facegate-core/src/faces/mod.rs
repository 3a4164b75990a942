pub mod authentication;
pub mod embedding;
pub mod enrollment;
pub mod gallery;
pub mod listing;
pub mod matcher;
pub mod payload;
pub mod session;
pub mod store;

pub use authentication::{authenticate, validate_probes, AuthOutcome};

pub use embedding::{
    ensure_uniform_dimension, validate_embeddings, validate_identity_name, Embedding, RawVector,
    MAX_IDENTITY_NAME_LEN,
};

pub use enrollment::{register, EnrollmentRecord, RegistrationOutcome};

pub use gallery::{Gallery, GalleryEntry};

pub use listing::{list_identities, IdentitySummary};

pub use matcher::{euclidean_distance, MatchResult, Matcher};

pub use payload::{load_vectors, parse_vectors};

pub use session::{SessionClaims, SessionIssuer, SessionToken, TOKEN_ALGORITHM};

pub use store::{
    ensure_store_dimension, established_dimension, EmbeddingStore, EnrolledEmbedding,
    EnvStoreDirResolver, FilesystemStore, IdentityRecord, MemoryStore, StoreDirResolver,
    TimedStore, STORE_DIR_ENV,
};

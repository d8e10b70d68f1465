//! Share-link subsystem: token model, path normalization, resolution rules,
//! and persistence (§3, §4.10).

mod access;
mod model;
mod repository;
mod service;

pub use access::{generate_token, hash_token, normalize_path, redact_token, redact_tokens_in_text, resolve_access};
pub use model::{ShareAccess, ShareLink};
pub use repository::{InMemoryShareLinkRepository, ShareLinkRepository};
pub use service::{CreatedShareLink, ShareLinkService};

#[cfg(feature = "database")]
pub use repository::pg::PgShareLinkRepository;

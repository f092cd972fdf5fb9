//! # corral-id
//!
//! Identifier types shared by the corral load balancer reconciler.
//!
//! Two families of IDs exist:
//!
//! - **Platform IDs** (`JobId`, `TaskId`) are generated by the orchestration
//!   engine and use a prefixed ULID format: `{prefix}_{ulid}`, e.g.
//!   `job_01HV4Z2WQXKJNM8GPQY6VBKC3D`.
//! - **Cloud IDs** (`LoadBalancerId`) are assigned by the cloud provider and
//!   are treated as opaque strings. They are only validated for shape.
//!
//! Both families have strict parsing, `Display`/`FromStr` and serde support,
//! so a value that made it through parsing can be used as a map key without
//! further normalisation.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

/// Splits `{prefix}_{ulid}` and validates both halves.
///
/// Used by the `define_id!` expansion; not part of the stable API.
#[doc(hidden)]
pub fn parse_prefixed(s: &str, expected: &'static str) -> Result<Ulid, IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    let Some((prefix, ulid_str)) = s.split_once('_') else {
        return Err(IdError::MissingSeparator);
    };

    if prefix != expected {
        return Err(IdError::InvalidPrefix {
            expected,
            actual: prefix.to_string(),
        });
    }

    ulid_str
        .parse::<Ulid>()
        .map_err(|e| IdError::InvalidUlid(e.to_string()))
}

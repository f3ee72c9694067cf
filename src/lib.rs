//! NetBox Provider References
//!
//! This crate implements how the NetBox infrastructure provider handles
//! attributes that link one object to another (a device's site, a
//! prefix's VRF, an aggregate's RIR).
//!
//! # Overview
//!
//! Users may write a link as a numeric ID, a slug, or a name. The API only
//! accepts IDs, and Terraform compares state with configuration literally.
//! The crate bridges the two:
//!
//! - **Reference**: classifies an attribute value as ID, slug, name, or unset
//! - **Resolver**: looks a reference up through a [`LookupBackend`], scoped
//!   by sibling references where the object type needs it
//! - **ResolutionCache**: memoizes lookups for one plan or apply and
//!   coalesces concurrent identical lookups into one API call
//! - **StateNormalizer**: keeps the authored representation in state when it
//!   still denotes the resolved object
//! - **DiffSuppressor**: hides plan differences between two
//!   representations of the same object
//! - **Operation**: ties the above together for resource handlers
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use netbox_provider_refs::{Operation, Resolver, schema::{ReferenceAttribute, ResourceSchema}};
//!
//! let resolver = Arc::new(Resolver::new(NetboxApiBackend::new(client)));
//! let schema = ResourceSchema::new("netbox_device")
//!     .with_reference("site", ReferenceAttribute::required("site"))
//!     .with_reference("device_role", ReferenceAttribute::required("device_role"));
//!
//! // one Operation per plan/apply
//! let op = Operation::new(resolver.clone());
//! let payload = op.build_payload(&schema, &config).await?;
//! let created = client.create_device(payload).await?;
//! let state = op.normalize_state(&schema, &config, &created.links(), None)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod operation;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use cache::{CacheKey, Resolution, ResolutionCache};
pub use config::ResolverConfig;
pub use diff::DiffSuppressor;
pub use error::{LookupError, ProviderError, ResolveError};
pub use logging::{
    init_logging, init_logging_from_config, init_logging_with_default, try_init_logging,
};
pub use normalize::{normalize_imported, StateNormalizer};
pub use operation::Operation;
pub use reference::{LookupField, Reference, ReferenceKind};
pub use registry::{ObjectDescriptor, ObjectRegistry, ScopeFilter};
pub use resolver::{LookupBackend, Resolver, Scope};
pub use schema::{ProviderSchema, ReferenceAttribute, ResourceSchema};
pub use types::{AttributeChange, PlanResult, ResolvedObject};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for backend implementations
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;

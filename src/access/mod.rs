//! Tenant access gate.
//!
//! Every read or write of team-owned data goes through the same steps:
//! resolve the session, resolve the team and role, branch on global admin
//! versus team scope, then query with the resulting filter.
//!
//! ```ignore
//! let access = gate.resolve(session.as_ref()).await?;
//! let Some(filter) = QueryFilter::from_tenant(&access.tenant_filter()) else {
//!     return Ok(Vec::new());
//! };
//! ```

mod context;
mod filter;
mod gate;
mod role;
mod scope;

pub use context::{AccessContext, Membership, is_global_admin};
pub use filter::{FilterError, QueryFilter, is_valid_field};
pub use gate::TenantAccessGate;
pub use role::TeamRole;
pub use scope::{TEAM_FIELD, TenantFilter, TenantScope};

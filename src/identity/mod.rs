//! Identity provider seam: sessions, role resolution and the hosted backend client.
//! Keep the public surface thin and split implementation across sub-modules.

mod user;
mod session;
mod provider;
mod role;
mod supabase;
pub mod testing;

pub use user::AuthUser;
pub use session::{gen_token, AuthEvent, Session, SessionStore};
pub use provider::{Filter, IdentityClient, ProviderError, Row, RowQuery, Upload};
pub use role::{home_route, ClaimsRole, ProfileTableRole, Role, RoleResolver, RoleSource};
pub use supabase::SupabaseClient;

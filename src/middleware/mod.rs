mod authz;

pub use authz::{AuthorizedResource, AuthzResponse, PolicyGuard, enforce_policy, protect};

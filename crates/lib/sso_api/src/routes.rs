//! Route paths for the auth RPC surface.

pub const POST_AUTH_REGISTER: &str = "/v1/auth/register";
pub const POST_AUTH_LOGIN: &str = "/v1/auth/login";
pub const POST_AUTH_ACCESS_TOKEN: &str = "/v1/auth/access-token";
pub const POST_AUTH_VALIDATE: &str = "/v1/auth/validate";
pub const POST_AUTH_LOGOUT: &str = "/v1/auth/logout";

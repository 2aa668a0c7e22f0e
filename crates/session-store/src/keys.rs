/// Well-known storage keys used by the client.
pub struct StorageKeys;

impl StorageKeys {
    /// The authenticated user record.
    pub const USER: &'static str = "oidc.user";
}

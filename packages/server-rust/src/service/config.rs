/// Dispatcher configuration.
///
/// Supplies the identity used when a request carries no usable credential
/// scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Account id for requests without a 12-digit access key.
    pub default_account_id: String,
    /// Region for requests without a credential scope.
    pub default_region: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_account_id: "000000000000".to_string(),
            default_region: "us-east-1".to_string(),
        }
    }
}

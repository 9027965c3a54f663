//! Process-wide tracing setup.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING: OnceLock<()> = OnceLock::new();

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Reads `MOCKSTACK_LOG_FORMAT`; anything other than `json` is compact.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var("MOCKSTACK_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Installs the global subscriber on first call; later calls are no-ops.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);

        let result = match LogFormat::from_env() {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        };
        if let Err(err) = result {
            eprintln!("tracing already initialised: {err}");
        }
    });
}

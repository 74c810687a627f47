//! Optional log output for embedders that do not install their own
//! subscriber.

/// Install a formatting subscriber filtered by `RUST_LOG`, defaulting to
/// `xlbind_core=info`. Returns false if a global subscriber already exists.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xlbind_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(all(test, feature = "tracing-subscriber"))]
mod tests {
    #[test]
    fn second_install_is_refused() {
        let _ = super::init_tracing();
        assert!(!super::init_tracing());
    }
}

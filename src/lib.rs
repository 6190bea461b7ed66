pub mod client;
pub mod common;
pub mod server;

pub mod logging {
    use tracing_subscriber::EnvFilter;

    const DEFAULT_DIRECTIVES: &str = "typing_duel=info,warn";

    /// Installs the fmt subscriber. `RUST_LOG` overrides the default filter.
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

        // A subscriber may already be installed (tests, embedding); keep it.
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

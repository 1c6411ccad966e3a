use std::sync::Once;

use apache_rewrite::{Request, Server, Tester};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static START: Once = Once::new();

/// Setup function that is only run once, even if called multiple times.
pub fn setup() {
    START.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Parse a configuration for a server listening on `ip:port`.
pub fn tester(config: &str, ip: &str, port: u16) -> Tester {
    config
        .parse::<Tester>()
        .expect("failed to parse configuration")
        .server(Server::default().ip(ip).port(port))
}

pub fn request(uri: &str, host: &str) -> Request {
    Request::get(uri, host)
}

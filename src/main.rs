use maskrelay::{Config, ForwardServer, RelayClient, logging};
use std::sync::Arc;

use tracing::{error, info, warn};

fn main() {
    logging::init();

    let config = Config::from_env();
    for key in config.missing() {
        warn!("{key} not set");
    }

    info!("Starting maskrelay on {}", config.listen_addr);
    info!(
        "Forwarding @{} to {}+*@{} via {}:{}",
        config.rule.fake_domain,
        config.rule.true_local,
        config.rule.true_domain,
        config.upstream.server,
        config.upstream.port
    );

    let relay = RelayClient::new(config.upstream.clone());
    let server = ForwardServer::new(&config.hostname, config.rule.clone(), Arc::new(relay))
        .with_client_timeout(config.client_timeout);

    if let Err(e) = server.start(&config.listen_addr) {
        error!("Failed to start server: {e}");
        std::process::exit(1);
    }
}

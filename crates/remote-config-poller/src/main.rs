// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use remote_config_client::{Capability, ClientConfig, ProductHandler, RemoteConfigClient};

const DEFAULT_PRODUCTS: &str = "APM_TRACING";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = ClientConfig::from_os_env();
    if !config.enabled {
        info!("Remote configuration is disabled, nothing to poll");
        return;
    }

    let client = match RemoteConfigClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating remote config client: {e}");
            return;
        }
    };

    let products = parse_products(
        &env::var("DD_REMOTE_CONFIG_PRODUCTS").unwrap_or_else(|_| DEFAULT_PRODUCTS.to_string()),
    );
    if products.iter().any(|product| product == "APM_TRACING") {
        client.update_capability(Capability::ApmTracingSampleRate, true);
        client.update_capability(Capability::ApmTracingLogsInjection, true);
    }
    for product in &products {
        client.set_product_handler(product.clone(), logging_handler(product.clone()));
    }
    info!(
        agent_url = %config.agent_url,
        products = ?products,
        "Polling for remote configuration"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
    }

    client.shutdown();
    info!(
        status = %client.status().snapshot().to_json(),
        "Remote configuration poller stopped"
    );
}

fn parse_products(raw: &str) -> Vec<String> {
    let mut products: Vec<String> = Vec::new();
    for product in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let product = product.to_uppercase();
        if !products.contains(&product) {
            products.push(product);
        }
    }
    products
}

fn logging_handler(product: String) -> ProductHandler {
    ProductHandler::sync(move |action, file, id| {
        let size = file
            .map(|value| serde_json::to_vec(value).map(|bytes| bytes.len()))
            .transpose()?
            .unwrap_or_default();
        info!(%product, %action, config_id = id, size, "Received remote configuration");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn products_are_deduplicated_and_normalized() {
        assert_eq!(
            parse_products(" apm_tracing, ASM_DD ,,APM_TRACING"),
            vec!["APM_TRACING".to_string(), "ASM_DD".to_string()]
        );
        assert!(parse_products("").is_empty());
    }
}

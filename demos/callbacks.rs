//! Watching a pushed layer and reacting to changes with callbacks.
//!
//! Run with: cargo run --example callbacks

use stacked_config::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, PartialEq, Stackable)]
struct FeatureFlags {
    pub new_ui: bool,
    pub beta_features: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Stackable)]
#[stack(verify)]
struct AppConfig {
    pub port: u16,
    pub feature_flags: FeatureFlags,
}

impl Verify for AppConfig {
    fn verify(&self) -> std::result::Result<(), VerifyError> {
        if self.port < 1024 {
            return Err(VerifyError::invalid_field("port", "must be at least 1024"));
        }
        Ok(())
    }
}

fn port(port: u16) -> Shadow<AppConfig> {
    Some(AppConfigShadow {
        port: Some(port),
        ..Default::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stacked_config=debug".into()),
        )
        .init();

    let defaults = AppConfig {
        port: 8080,
        feature_flags: FeatureFlags::default(),
    };
    let (runtime_layer, publisher) = PushSource::new("runtime", None);
    let config = StackedConfig::builder(defaults)
        .with_source(StaticSource::<AppConfig>::new(
            "flags",
            Some(AppConfigShadow {
                feature_flags: Some(FeatureFlagsShadow {
                    new_ui: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        ))
        .with_source(runtime_layer)
        .on_error(|error, current, _attempted| {
            println!("[on_error] {error}; keeping port {}", current.port);
        })
        .build()
        .await?;

    let cancel = CancellationToken::new();
    let notifications = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&notifications);
    let counting = config
        .register_callback(&cancel, None, move |old, new| {
            let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
            println!("[callback 1] port {} -> {} (#{count})", old.port, new.port);
        })
        .await?;

    let seen = config.snapshot();
    let logging = config
        .register_callback(&cancel, Some(&seen), |_old, new| {
            println!("[callback 2] new_ui = {}", new.feature_flags.new_ui);
        })
        .await?;

    println!("--- Update 1: port 9090 ---");
    publisher.publish(&cancel, port(9090)).await?;

    println!("--- Update 2: port 80 is rejected ---");
    publisher.publish(&cancel, port(80)).await?;

    println!("--- Unregistering callback 2 ---");
    if logging.unregister(&cancel).await.is_err() {
        println!("[unregister] callback 2 may still run");
    }

    println!("--- Update 3: beta features on ---");
    publisher
        .publish(
            &cancel,
            Some(AppConfigShadow {
                port: Some(9090),
                feature_flags: Some(FeatureFlagsShadow {
                    beta_features: Some(true),
                    ..Default::default()
                }),
            }),
        )
        .await?;

    println!("--- No more updates ---");
    publisher.finish(&cancel).await?;
    config.stopped().await;
    if counting.unregister(&cancel).await.is_err() {
        println!("[unregister] callback 1 may still run");
    }

    let cfg = config.get();
    println!("Final configuration (serial {}):", config.snapshot().serial());
    println!("  Port: {}", cfg.port);
    println!("  New UI: {}", cfg.feature_flags.new_ui);
    println!("  Beta Features: {}", cfg.feature_flags.beta_features);
    println!("Callback 1 ran {} times", notifications.load(Ordering::SeqCst));

    Ok(())
}

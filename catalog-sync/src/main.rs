use catalog_sync::{Config, Origin, init_logger, init_logger_with_file};
use shared::models::ProductDraft;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志)
    dotenv::dotenv().ok();
    let config = Config::from_env();
    if config.is_development() {
        init_logger(&config.log_level, config.log_json)?;
    } else {
        let log_dir = config.log_dir();
        init_logger_with_file(&config.log_level, config.log_json, log_dir.to_str())?;
    }

    tracing::info!("🦀 Catalog sync demo starting...");

    // 2. 初始化 origin (store, hub, upstream)
    let origin = Origin::initialize(&config)?;

    // 3. 打开两个标签页
    let tab_a = origin.open_tab();
    let tab_b = origin.open_tab();

    let report = tab_a.catalog().load().await;
    if let Some(e) = &report.error {
        tracing::warn!(error = %e, "Upstream unavailable, serving cached data");
    }

    let draft = ProductDraft {
        name: "Lámpara artesanal".to_string(),
        description: "Lámpara de mesa tallada a mano".to_string(),
        price: "45.90".to_string(),
        category: "Hogar".to_string(),
        image_url: String::new(),
    };
    let product = tab_a.catalog().create_local(draft)?;
    tab_a.favorites().toggle(product.id);

    // let the other tab and the heartbeats catch up
    tokio::time::sleep(Duration::from_millis(config.presence_ping_ms.min(1_000) + 200)).await;

    for (name, tab) in [("A", &tab_a), ("B", &tab_b)] {
        let stats = tab.catalog().get_statistics();
        println!(
            "tab {name} [{}]: {}",
            tab.origin(),
            serde_json::to_string(&stats)?
        );
        println!(
            "tab {name} favorites: {:?}, presence: {}",
            tab.favorites().list(),
            serde_json::to_string(&tab.presence().status())?
        );
    }

    tab_b.close();
    tab_a.close();
    tracing::info!("Demo finished");
    Ok(())
}

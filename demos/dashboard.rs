//! Prints a small market dashboard
//!
//! Usage: `cargo run --example dashboard -- [FIAT] [TIMEFRAME]`
//! e.g. `cargo run --example dashboard -- eur 7d`. Set `RUST_LOG=debug` to
//! watch cache hits and provider fallbacks.

use market_data_sdk::{CacheConfig, Fiat, MarketDataService, RangeSpec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let fiat: Fiat = args.next().unwrap_or_else(|| "usd".to_string()).parse()?;
    let range: RangeSpec = args.next().unwrap_or_else(|| "7d".to_string()).parse()?;

    let service = MarketDataService::new(CacheConfig::from_env())?;

    let snapshot = service.snapshot(&fiat).await?;
    println!(
        "Top coins in {} from {} at {}",
        snapshot.fiat, snapshot.source, snapshot.fetched_at
    );
    if let market_data_sdk::Staleness::Stale { warning, .. } = &snapshot.staleness {
        println!("warning: {}", warning);
    }

    for coin in snapshot.coins.iter().take(10) {
        println!(
            "{:>8} {:>16.4} {:>+8.2}% {:>20.0}",
            coin.symbol, coin.price, coin.change_24h, coin.market_cap
        );
    }

    if let Some(first) = snapshot.coins.first() {
        let series = service.series(&first.id, &fiat, range).await;
        println!(
            "\n{} over {}: {} points, {:+.2}%",
            first.name,
            range,
            series.len(),
            series.calculate_change()
        );
    }

    let trending = service.trending_symbols().await;
    if !trending.is_empty() {
        println!("Trending: {}", trending.join(", "));
    }

    let health = service.health_check().await;
    println!("\nHealth: {:?}", health.status);
    for m in service.provider_metrics().await {
        println!(
            "  {:<10} p50={:.0}ms p99={:.0}ms success={:.0}% ({} requests)",
            m.provider_name,
            m.latency_p50_ms,
            m.latency_p99_ms,
            m.success_rate * 100.0,
            m.total_requests
        );
    }

    Ok(())
}

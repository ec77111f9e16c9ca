use futures_util::StreamExt;
use tracing::info;

use optio::OptioError;
use optio::config::fetch_config;
use optio::credentials::populate_env_from_keychain;
use optio::websocket::Client;

const SYMBOL: &str = "EURUSD_otc";

#[tokio::main]
async fn main() -> Result<(), OptioError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    populate_env_from_keychain();
    let app_config = fetch_config()?;

    let client = Client::connect(&app_config.pocket).await?;
    info!(demo = client.is_demo(), "Session started");

    let history = client.get_candles(SYMBOL, 60, 3600).await?;
    info!(count = history.len(), "Loaded one hour of minute candles");

    let mut candles = Box::pin(client.subscribe_symbol_timed(SYMBOL, 15)?.into_stream());
    while let Some(candle) = candles.next().await {
        println!(
            "{} {} o={} h={} l={} c={}",
            candle.symbol, candle.open_time, candle.open, candle.high, candle.low, candle.close
        );
    }

    Ok(())
}

use dotenv::dotenv;

use rust_quant_autotrade::app::bootstrap;
use rust_quant_autotrade::app_config::log::setup_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 设置日志
    setup_logging()?;

    bootstrap::run().await
}

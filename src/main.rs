use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

use greenbull_pipelines::config::Config;
use greenbull_pipelines::jobs::JobContext;
use greenbull_pipelines::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = Config::from_env()?;
    info!("Using PORT: {}", config.port);

    // Bind to 0.0.0.0 for Cloud Run
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();

    let ctx = Arc::new(JobContext::from_config(config)?);
    let api = routes::routes(ctx);

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
    Ok(())
}

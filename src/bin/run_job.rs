use anyhow::{anyhow, Context};
use dotenv::dotenv;
use log::{error, info};
use std::env;
use std::process::ExitCode;

use greenbull_pipelines::config::Config;
use greenbull_pipelines::jobs::{Job, JobContext};

async fn run() -> anyhow::Result<bool> {
    let name = env::args().nth(1).ok_or_else(|| {
        let names: Vec<&str> = Job::ALL.iter().map(|job| job.name()).collect();
        anyhow!("usage: run_job <{}>", names.join("|"))
    })?;
    let job: Job = name.parse().map_err(|e: String| anyhow!(e))?;

    let config = Config::from_env().context("failed to load configuration")?;
    let ctx = JobContext::from_config(config)?;

    let outcome = job.run(&ctx).await?;
    println!("{}", outcome.message);
    Ok(!outcome.partial_failure)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    match run().await {
        Ok(true) => {
            info!("Done.");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("ERROR: {:#}", e);
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

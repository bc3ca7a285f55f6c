// src/routes.rs
use log::info;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::error::ApiError;
use crate::handlers::jobs::trigger_job;
use crate::jobs::{Job, JobContext};

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found";
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = &api_error.message;
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed";
    } else {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error";
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes(ctx: Arc<JobContext>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let ctx_filter = warp::any().map(move || ctx.clone());

    let health_route = warp::path!("health").and(warp::get()).map(|| "ok");

    // One route per job, named after its entry point; any body is ignored
    let job_route = warp::path::param::<Job>()
        .and(warp::path::end())
        .and(warp::get().or(warp::post()).unify())
        .and(ctx_filter)
        .and_then(trigger_job);

    info!("Routes configured for {} jobs.", Job::ALL.len());

    health_route.or(job_route).recover(handle_rejection)
}

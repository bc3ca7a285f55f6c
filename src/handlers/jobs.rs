// src/handlers/jobs.rs
use log::info;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::WithStatus;
use warp::Rejection;

use super::error::ApiError;
use crate::jobs::{Job, JobContext};

/// Run the job to completion and answer with its message.
pub async fn trigger_job(job: Job, ctx: Arc<JobContext>) -> Result<WithStatus<String>, Rejection> {
    info!("Handling request to run {}.", job);

    match job.run(&ctx).await {
        Ok(outcome) => {
            let status = if outcome.partial_failure {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            Ok(warp::reply::with_status(outcome.message, status))
        }
        // Job::run has already logged the failure
        Err(e) => Err(warp::reject::custom(ApiError::job_failed(job, &e))),
    }
}

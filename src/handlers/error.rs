// src/handlers/error.rs
use std::fmt;
use warp::reject::Reject;

use crate::jobs::{Job, JobError};

#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
        }
    }

    pub fn job_failed(job: Job, err: &JobError) -> Self {
        ApiError::new(format!("{} failed: {}", job, err))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
impl Reject for ApiError {}

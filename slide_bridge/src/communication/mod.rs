use std::fmt;

use tokio::sync::oneshot;

use crate::{
    bridge::gateway::CommandStatus,
    model::{ModelError, Variant, server::BrowseEntry},
};

pub mod commands;
pub mod service;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Browse,
    Read {
        object: String,
        variable: String,
    },
    Call {
        object: String,
        method: String,
        args: Vec<String>,
    },
    Subscribe,
}

impl Request {
    /// Subscriptions stay in the access layer and never reach the server
    /// loop.
    pub fn is_subscribe(&self) -> bool {
        matches!(self, Request::Subscribe)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Members(Vec<BrowseEntry>),
    Value(Variant),
    Called(CommandStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub message: String,
}

impl RequestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ModelError> for RequestError {
    fn from(error: ModelError) -> Self {
        RequestError::new(error.to_string())
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.message)
    }
}

pub type RequestResult = Result<Response, RequestError>;

pub struct RequestEnvelope {
    pub request: Request,
    pub response: oneshot::Sender<RequestResult>,
}

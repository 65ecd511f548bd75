use tokio::sync::oneshot;

use crate::{
    communication::{Request, RequestEnvelope, RequestResult, Response},
    model::server::{ChangeNotification, MemberKind},
};

pub fn parse_command(cmd_str: &str) -> Option<Request> {
    let parts: Vec<&str> = cmd_str.trim().split(':').collect();

    let request = match parts[0] {
        "browse" => {
            if parts.len() != 1 {
                return None;
            }
            Request::Browse
        }
        "subscribe" => {
            if parts.len() != 1 {
                return None;
            }
            Request::Subscribe
        }
        "read" => {
            if parts.len() != 3 {
                return None;
            }
            Request::Read {
                object: parts[1].to_string(),
                variable: parts[2].to_string(),
            }
        }
        "call" => {
            if parts.len() < 3 {
                return None;
            }
            Request::Call {
                object: parts[1].to_string(),
                method: parts[2].to_string(),
                args: parts[3..].iter().map(|arg| arg.trim().to_string()).collect(),
            }
        }
        _ => return None,
    };

    Some(request)
}

pub fn envelope(request: Request) -> (RequestEnvelope, oneshot::Receiver<RequestResult>) {
    let (response, rx) = oneshot::channel();
    (RequestEnvelope { request, response }, rx)
}

/// Renders one answer, always ending in a newline.
pub fn format_response(result: &RequestResult) -> String {
    match result {
        Ok(Response::Members(entries)) => {
            let mut text = String::new();
            for entry in entries {
                let kind = match &entry.kind {
                    MemberKind::Variable(data_type) => data_type.to_string(),
                    MemberKind::Method => "Method".to_string(),
                };
                text.push_str(&format!("{}:{}:{}\n", entry.object, entry.member, kind));
            }
            text.push_str("END\n");
            text
        }
        Ok(Response::Value(value)) => format!("Value: {}\n", value),
        Ok(Response::Called(status)) if status.good => format!("Good: {}\n", status),
        Ok(Response::Called(status)) => format!("Bad: {}\n", status),
        Err(e) => format!("{}\n", e),
    }
}

pub fn format_change(change: &ChangeNotification) -> String {
    format!(
        "Changed: {}:{}:{}\n",
        change.object, change.variable, change.value
    )
}

//! Reply normalization
//!
//! Every response leaving the dispatcher goes through [`finalize`], whether it
//! came from an action, the standard controller or an error translation.

use crate::controller::Reply;
use crate::response::Response;
use crate::timestamp::{ServerTime, TIMESTAMP_HEADER};

/// Turn an action reply into a response.
///
/// A text reply fills the staged response when the action prepared one,
/// keeping its status and headers; otherwise it becomes a plain 200.
pub fn normalize(reply: Reply, staged: Option<Response>) -> Response {
    match reply {
        Reply::Response(response) => response,
        Reply::Text(body) => match staged {
            Some(mut response) => {
                if response.content_type().is_none() {
                    response.set_header("content-type", "text/plain; charset=utf-8");
                }
                response.body = body.into();
                response
            }
            None => Response::text(body),
        },
    }
}

/// Stamp the server time and apply the pre-hook headers.
///
/// Pre-hook headers are applied last and replace same-named headers.
pub fn finalize(response: &mut Response, server_time: ServerTime, extra_headers: &[(String, String)]) {
    response.set_header(TIMESTAMP_HEADER, server_time.to_string());
    for (name, value) in extra_headers {
        response.set_header(name.clone(), value.clone());
    }
}

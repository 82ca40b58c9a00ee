// SPDX-License-Identifier: Apache-2.0

//! The request loop.
//!
//! Reads request lines, answers framing and decoding problems inline, and runs
//! every well-formed request on its own task. Responses are written as they
//! complete; only the write of a single line is serialized.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::error::Category;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use warden_core::protocol::{Request, Response, RpcError};

use super::codec::{Frame, JsonLineCodec, MAX_FRAME_LENGTH};
use super::dispatcher::Dispatcher;

type ResponseSink<W> = Arc<Mutex<FramedWrite<W, JsonLineCodec>>>;

/// Serves requests from `reader` until end of input or a read error.
///
/// At end of input, requests still running get `grace` to finish and reply.
/// A read error is returned after the same grace period.
pub async fn serve<R, W>(
    dispatcher: Arc<Dispatcher>,
    reader: R,
    writer: W,
    grace: Duration,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut requests = FramedRead::new(reader, JsonLineCodec::new());
    let sink: ResponseSink<W> = Arc::new(Mutex::new(FramedWrite::new(writer, JsonLineCodec::new())));
    let tracker = TaskTracker::new();

    info!("Ready for requests");

    let outcome = loop {
        let frame = match requests.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                error!(error = %err, "Failed to read request stream");
                break Err(err);
            }
            None => {
                debug!("End of input");
                break Ok(());
            }
        };

        let line = match frame {
            Frame::Line(line) => line,
            Frame::Oversized => {
                warn!(max_bytes = MAX_FRAME_LENGTH, "Dropped oversized request line");
                let error = RpcError::invalid_request(format!(
                    "Invalid request: line exceeds {MAX_FRAME_LENGTH} bytes"
                ));
                write_response(&sink, Response::failure("", error)).await;
                continue;
            }
        };

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let request = match decode_request(&line) {
            Ok(request) => request,
            Err(response) => {
                write_response(&sink, response).await;
                continue;
            }
        };

        let dispatcher = Arc::clone(&dispatcher);
        let sink = Arc::clone(&sink);
        tracker.spawn(async move {
            let response = dispatcher.handle(request).await;
            write_response(&sink, response).await;
        });
    };

    tracker.close();
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        warn!(
            pending = tracker.len(),
            grace_ms = grace.as_millis() as u64,
            "Requests still running after grace period, abandoning them"
        );
    }

    outcome
}

/// Parses one line. Failures come back as the response to send.
fn decode_request(line: &[u8]) -> Result<Request, Response> {
    match serde_json::from_slice::<Request>(line) {
        Ok(request) if request.method.is_empty() => Err(Response::failure(
            "",
            RpcError::invalid_request("Invalid request: method is required"),
        )),
        Ok(request) => Ok(request),
        Err(err) if err.classify() == Category::Data => {
            debug!(error = %err, "Request has the wrong shape");
            Err(Response::failure(
                "",
                RpcError::invalid_request(format!("Invalid request: {err}")),
            ))
        }
        Err(err) => {
            debug!(error = %err, "Request is not valid JSON");
            Err(Response::failure(
                "",
                RpcError::parse_error("Failed to parse request"),
            ))
        }
    }
}

async fn write_response<W>(sink: &ResponseSink<W>, response: Response)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = sink.lock().await;
    if let Err(err) = sink.send(response).await {
        error!(error = %err, "Failed to write response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::protocol::{INVALID_REQUEST, PARSE_ERROR};

    fn error_code(result: Result<Request, Response>) -> (String, i32) {
        let response = result.err().unwrap();
        (response.id, response.error.unwrap().code)
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert_eq!(error_code(decode_request(b"{not json")), (String::new(), PARSE_ERROR));
        assert_eq!(error_code(decode_request(b"{\"id\":\"1\"")), (String::new(), PARSE_ERROR));
    }

    #[test]
    fn wrong_shape_is_an_invalid_request() {
        assert_eq!(error_code(decode_request(b"[1,2,3]")), (String::new(), INVALID_REQUEST));
        assert_eq!(
            error_code(decode_request(br#"{"id":"1","method":7}"#)),
            (String::new(), INVALID_REQUEST)
        );
        assert_eq!(
            error_code(decode_request(br#"{"jsonrpc":"2.0","id":"1"}"#)),
            (String::new(), INVALID_REQUEST)
        );
    }

    #[test]
    fn well_formed_request_decodes() {
        let request = decode_request(br#"{"jsonrpc":"2.0","id":"9","method":"ping"}"#).unwrap();
        assert_eq!(request.id, "9");
        assert_eq!(request.method, "ping");
    }
}

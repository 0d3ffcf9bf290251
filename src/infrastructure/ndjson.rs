// NDJSON streaming utilities
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;

/// Create a chunked NDJSON streaming response: one JSON object per line,
/// written as each message arrives so clients can render progress live.
pub fn ndjson_stream<S, T>(stream: S) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let byte_stream = stream.map(|message| serialize_line(&message));
    let body = Body::from_stream(byte_stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serialize a single message to one newline-terminated JSON line
fn serialize_line<T: Serialize>(message: &T) -> Result<Bytes, std::io::Error> {
    let mut line = serde_json::to_vec(message)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Helper to create a streaming response from a receiver
pub fn stream_from_receiver<T>(mut rx: tokio::sync::mpsc::Receiver<T>) -> axum::response::Response
where
    T: Serialize + Send + 'static,
{
    let stream = async_stream::stream! {
        while let Some(message) = rx.recv().await {
            yield message;
        }
    };

    match ndjson_stream(stream) {
        Ok(response) => response.into_response(),
        Err(status) => status.into_response(),
    }
}

//! Client-side WebSocket transport (tokio-tungstenite).
//!
//! Adapts a WebSocket connection to the shape the correlation engine
//! consumes: a `Sink<String>` for outbound frames and a `Stream` of inbound
//! text frames.

use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info};

use crate::error::{HuddleError, Result};

/// Open a WebSocket connection to `url`.
///
/// Inbound binary frames are passed on when they are valid UTF-8 and
/// dropped otherwise; control frames never reach the stream.
pub async fn connect_websocket(
    url: &str,
) -> Result<(
    impl Sink<String, Error = HuddleError> + Unpin + Send + 'static,
    impl Stream<Item = Result<String>> + Unpin + Send + 'static,
)> {
    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| HuddleError::Network(format!("Connection failed: {e}")))?;
    info!(url, "connected");

    let (sink, stream) = ws.split();

    let sink = sink
        .sink_map_err(|e| HuddleError::SendFailed(e.to_string()))
        .with(|frame: String| future::ready(Ok::<_, HuddleError>(WsMessage::Text(frame.into()))));

    let stream = stream.filter_map(|msg| {
        future::ready(match msg {
            Ok(WsMessage::Text(text)) => Some(Ok(text.to_string())),
            Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Some(Ok(text)),
                Err(_) => {
                    debug!(len = data.len(), "dropping non-UTF8 binary frame");
                    None
                },
            },
            Ok(WsMessage::Close(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => None,
            Err(e) => Some(Err(HuddleError::from(e))),
        })
    });

    Ok((sink, stream))
}

//! WebSocket connection handling
//!
//! Each connection gets a writer task draining its outbound channel (replies
//! and pushed updates share it) and a reader loop that handles client frames
//! one at a time, so replies come back in request order.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use playctl_common::{ActionInvocation, ServerFrame};
use tracing::debug;

use super::{dispatch, AppContext};
use crate::error::Error;
use crate::subscriptions::{ConnectionId, Outgoing};

/// Drive one upgraded connection until the client leaves or the listener
/// shuts down
pub async fn handle_socket(socket: WebSocket, ctx: AppContext) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut outgoing) = ctx.subscriptions.connect();

    tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            match msg {
                Outgoing::Text(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outgoing::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        let frame = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            frame = receiver.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => handle_message(&ctx, id, &text).await,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => handle_message(&ctx, id, &text).await,
                Err(_) => ctx.subscriptions.send(id, &Error::InvalidMessage.to_frame()),
            },
            Some(Ok(Message::Close(_))) | None => break,
            // Ping/pong are answered by axum
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("WebSocket client {} read error: {}", id, e);
                break;
            }
        }
    }

    // Dropping the entry closes the writer's channel once it has drained
    ctx.subscriptions.disconnect(id);
}

/// Handle one client text frame and queue the reply on the connection.
///
/// `subscribe` and `unsubscribe` act on the connection's own subscription;
/// every other action goes through [`dispatch::run`].
pub async fn handle_message(ctx: &AppContext, id: ConnectionId, text: &str) {
    let invocation = match ActionInvocation::parse(text) {
        Ok(invocation) => invocation,
        Err(e) => {
            debug!("Client {} sent unparseable frame: {}", id, e);
            ctx.subscriptions.send(id, &Error::InvalidMessage.to_frame());
            return;
        }
    };

    match invocation.action.as_str() {
        "subscribe" => {
            let reply = match ctx.subscriptions.subscribe(
                id,
                invocation.param("fields"),
                invocation.param("all"),
            ) {
                Ok((fields, all)) => ServerFrame::Subscribed { fields, all },
                Err(e) => e.to_frame(),
            };
            ctx.subscriptions.send(id, &reply);
        }
        "unsubscribe" => {
            ctx.subscriptions.unsubscribe(id);
            ctx.subscriptions.send(id, &ServerFrame::Unsubscribed);
        }
        _ => match dispatch::run(ctx, &invocation).await {
            Ok(reply) => ctx.subscriptions.send_text(id, reply.to_string()),
            Err(e) => ctx.subscriptions.send(id, &e.to_frame()),
        },
    }
}

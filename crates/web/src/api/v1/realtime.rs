use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, on},
    Router,
};
use axum_extra::TypedHeader;
use model::delivery::Delivery;
use realtime::{
    wire::{self, Frame},
    Publisher, RealtimeHub,
};
use serde::Serialize;
use utility::id::Id;

use crate::{
    common::{route_not_found, METHOD_FILTER_ALL},
    WebState,
};

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reply {
    event: &'static str,
    data: ReplyData,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyData {
    delivery_id: Option<Id<Delivery>>,
    message: Option<String>,
}

impl Reply {
    fn joined(delivery_id: Id<Delivery>) -> Self {
        Self {
            event: "joined",
            data: ReplyData {
                delivery_id: Some(delivery_id),
                message: None,
            },
        }
    }

    fn error(message: String) -> Self {
        Self {
            event: "error",
            data: ReplyData {
                delivery_id: None,
                message: Some(message),
            },
        }
    }
}

/// Socket of the upstream that publishes delivery events. The hub reports
/// `connected` while at least one such socket is open.
async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    State(hub): State<RealtimeHub>,
) -> impl IntoResponse {
    let agent = user_agent
        .map(|TypedHeader(agent)| agent.as_str().to_owned())
        .unwrap_or_else(|| "unknown agent".to_owned());
    log::info!("`{}` connected to the real-time socket", agent);

    ws.on_upgrade(move |socket| async move {
        publish_frames(socket, hub.attach()).await;
        log::info!("`{}` disconnected from the real-time socket", agent);
    })
}

async fn publish_frames(mut socket: WebSocket, publisher: Publisher) {
    let mut joined: Option<Id<Delivery>> = None;
    while let Some(received) = socket.recv().await {
        let text = match received {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(why) => {
                log::warn!("real-time socket failed: {}", why);
                break;
            }
        };
        let reply = match wire::decode(&text, joined) {
            Ok(Frame::Join(delivery_id)) => {
                joined = Some(delivery_id);
                Some(Reply::joined(delivery_id))
            }
            Ok(Frame::Event { delivery_id, event }) => {
                let terminal = event.is_terminal();
                let receivers = publisher.publish(delivery_id, event);
                log::debug!(
                    "delivery {} event reached {} subscriptions",
                    delivery_id,
                    receivers
                );
                if terminal {
                    log::info!("delivery {} finished", delivery_id);
                }
                None
            }
            Err(why) => {
                log::warn!("dropping real-time frame: {}", why);
                Some(Reply::error(why.to_string()))
            }
        };
        if let Some(reply) = reply {
            let sent = match serde_json::to_string(&reply) {
                Ok(text) => socket.send(Message::Text(text)).await,
                Err(why) => {
                    log::error!("could not encode reply: {}", why);
                    continue;
                }
            };
            if sent.is_err() {
                break;
            }
        }
    }
}

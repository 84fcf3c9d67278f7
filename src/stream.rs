use actix_ws::{Message, MessageStream, Session};
use log::{debug, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::refresher::Update;

/// Forwards feed updates to one WebSocket client until either side goes away.
///
/// Every disconnect initiated here is preceded by a text frame saying why.
pub async fn relay(
    mut session: Session,
    mut incoming: MessageStream,
    mut updates: broadcast::Receiver<Update>,
    initial: Option<Update>,
) {
    if let Some(update) = initial {
        if send(&mut session, &update).await.is_err() {
            return;
        }
    }

    let reason = loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    if send(&mut session, &update).await.is_err() {
                        debug!("client went away");
                        return;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("stream client lagged, {} updates dropped", missed);
                }
                Err(RecvError::Closed) => break "rate updates stopped",
            },
            msg = incoming.recv() => match msg {
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    debug!("client closed stream: {:?}", reason);
                    let _ = session.close(reason).await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("websocket protocol error: {}", err);
                    break "protocol error";
                }
                None => return,
            },
        }
    };

    let _ = session.text(reason).await;
    let _ = session.close(None).await;
}

async fn send(session: &mut Session, update: &Update) -> Result<(), actix_ws::Closed> {
    // Serializing plain strings and f64 fields cannot fail.
    let text = serde_json::to_string(update).unwrap_or_default();
    session.text(text).await
}

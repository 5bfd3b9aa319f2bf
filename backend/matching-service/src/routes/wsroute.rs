use crate::middleware::auth::extract_token;
use crate::state::AppState;
use crate::websocket::{ClientConnection, ConnectionId, WsInboundEvent};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One live socket. Outbound frames come from the hub channel; inbound
/// frames are typing indicators.
struct WsSession {
    user_id: Uuid,
    connection_id: ConnectionId,
    outbound: Option<mpsc::Receiver<String>>,
    state: AppState,
    hb: Instant,
}

impl WsSession {
    fn new(connection: ClientConnection, state: AppState) -> Self {
        Self {
            user_id: connection.user_id,
            connection_id: connection.id,
            outbound: Some(connection.receiver),
            state,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = %act.user_id, "websocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_inbound(&self, event: WsInboundEvent) {
        let (conversation_id, is_typing) = match event {
            WsInboundEvent::Typing { conversation_id } => (conversation_id, true),
            WsInboundEvent::StopTyping { conversation_id } => (conversation_id, false),
        };
        let gate = self.state.gate.clone();
        let user_id = self.user_id;

        actix::spawn(async move {
            if let Err(e) = gate.relay_typing(user_id, conversation_id, is_typing).await {
                tracing::debug!(
                    user_id = %user_id,
                    conversation_id = %conversation_id,
                    error = %e,
                    "typing indicator dropped"
                );
            }
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session started");
        self.hb(ctx);

        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(ReceiverStream::new(outbound));
        }

        let presence = self.state.presence.clone();
        let user_id = self.user_id;
        actix::spawn(async move {
            if let Err(e) = presence.set_online(user_id).await {
                tracing::warn!(user_id = %user_id, error = %e, "failed to mark user online");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session stopped");

        let hub = self.state.hub.clone();
        let presence = self.state.presence.clone();
        let user_id = self.user_id;
        let connection_id = self.connection_id;

        actix::spawn(async move {
            hub.unregister(user_id, connection_id).await;
            if let Err(e) = presence.set_offline_if_disconnected(user_id).await {
                tracing::warn!(user_id = %user_id, error = %e, "failed to mark user offline");
            }
        });
    }
}

// Frames queued by the hub
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(user_id = %self.user_id, "hub closed the connection");
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(event) => self.handle_inbound(event),
                    Err(e) => tracing::debug!(error = %e, "ignoring unrecognised websocket frame"),
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::debug!("binary websocket frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "websocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let Some(token) = extract_token(&req) else {
        return Ok(HttpResponse::Unauthorized().finish());
    };
    let user_id = match state.auth.verify(&token) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!("websocket connection rejected: invalid token");
            return Ok(HttpResponse::Unauthorized().finish());
        }
    };

    let connection = state.hub.register(user_id).await?;
    let connection_id = connection.id;
    let session = WsSession::new(connection, state.get_ref().clone());

    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            state.hub.unregister(user_id, connection_id).await;
            Err(e)
        }
    }
}

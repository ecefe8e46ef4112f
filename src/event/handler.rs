pub(super) mod api {
    use axum::Extension;
    use axum::extract::ws::Message::{Binary, Close, Text};
    use axum::extract::ws::{self, WebSocket};
    use axum::extract::{State, WebSocketUpgrade};
    use axum::response::Response;
    use futures::stream::{SplitSink, SplitStream};
    use futures::{SinkExt, StreamExt};
    use log::{debug, error, warn};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::try_join;

    use crate::event::context;
    use crate::event::{self, Command, Event};
    use crate::{auth, user};

    pub async fn ws(
        Extension(auth_user): Extension<auth::User>,
        ws: WebSocketUpgrade,
        State(event_service): State<event::Service>,
    ) -> Response {
        let user = *auth_user.id();
        ws.on_upgrade(move |socket| handle_socket(user, socket, event_service))
    }

    async fn handle_socket(user: user::Id, ws: WebSocket, event_service: event::Service) {
        let (ctx, inbox) = event_service.connect(&user).await;

        let (sender, receiver) = ws.split();

        let read_task = tokio::spawn(read(ctx.clone(), receiver, event_service.clone()));
        let write_task = tokio::spawn(write(ctx.clone(), sender, inbox));

        match try_join!(read_task, write_task) {
            Ok(_) => debug!("WS of {user} disconnected gracefully"),
            Err(e) => error!("WS of {user} disconnected with error: {e}"),
        }

        event_service.disconnect(&ctx).await;
    }

    async fn read(
        ctx: context::Ws,
        mut receiver: SplitStream<WebSocket>,
        event_service: event::Service,
    ) {
        loop {
            tokio::select! {
                // close is notified => stop 'read' task
                _ = ctx.close.notified() => break,

                // read next frame from WS connection
                frame = receiver.next() => {
                    match frame {
                        None => {
                            ctx.close.notify_one(); // notify 'write' task to stop
                            break;
                        }
                        Some(Err(e)) => {
                            error!("Failed to read WS frame: {e}");
                            ctx.close.notify_one();
                            break;
                        }
                        Some(Ok(Close(frame))) => {
                            debug!("WS connection closed by client: {frame:?}");
                            ctx.close.notify_one();
                            break;
                        }
                        Some(Ok(Text(content))) => {
                            if let Err(e) = handle_text_frame(&ctx, content.as_str(), &event_service).await {
                                error!("Failed to handle text frame: {e}");
                                ctx.close.notify_one();
                                break;
                            }
                        }
                        Some(Ok(Binary(content))) => {
                            warn!("Received binary WS frame of {} bytes", content.len());
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    async fn handle_text_frame(
        ctx: &context::Ws,
        content: &str,
        event_service: &event::Service,
    ) -> event::Result<()> {
        match serde_json::from_str::<Command>(content) {
            Ok(command) => event_service.handle_command(ctx, command).await,
            Err(e) => {
                warn!("Skipping text frame, content is malformed: {e}");
                Ok(())
            }
        }
    }

    async fn write(
        ctx: context::Ws,
        mut sender: SplitSink<WebSocket, ws::Message>,
        mut inbox: UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                // close is notified => stop 'write' task
                _ = ctx.close.notified() => break,

                // new event for this connection => send it to the client
                event = inbox.recv() => {
                    let Some(event) = event else {
                        ctx.close.notify_one();
                        break;
                    };

                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("Failed to serialize event: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Text(frame.into())).await {
                        error!("Failed to send event to client: {e}");
                        ctx.close.notify_one(); // notify 'read' task to stop
                        break;
                    }
                }
            }
        }
    }
}

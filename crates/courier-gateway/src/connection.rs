use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use courier_types::events::{ClientCommand, ServerEvent};
use courier_types::{CourierError, UserId};

use crate::delivery::DeliveryEngine;
use crate::transport::ConnectionHandle;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket whose token was already validated at upgrade.
pub async fn handle_connection(socket: WebSocket, engine: DeliveryEngine, user_id: UserId) {
    let (sender, receiver) = socket.split();
    run_connection_loop(sender, receiver, engine, user_id, HEARTBEAT_INTERVAL).await;
}

/// Connection loop over any frame sink and stream.
///
/// Commands are handled strictly one at a time. When the outbound side dies
/// the receive task is signalled rather than aborted: the command in progress
/// and any already buffered behind it run to completion, and only then is
/// presence cleared. Later pushes to this connection are lost.
pub(crate) async fn run_connection_loop<S, R, E>(
    mut sender: S,
    mut receiver: R,
    engine: DeliveryEngine,
    user_id: UserId,
    heartbeat_every: Duration,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    <S as Sink<Message>>::Error: Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    let (handle, mut outbound) = ConnectionHandle::channel();

    info!("user {} connected (connection {})", user_id, handle.id());

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward pushed events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_every);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let shutdown = Arc::new(Notify::new());
    let recv_shutdown = shutdown.clone();
    let recv_engine = engine.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                msg = receiver.next() => msg,
                _ = recv_shutdown.notified() => break,
            };
            let Some(Ok(msg)) = msg else { break };

            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => dispatch_command(&recv_engine, user_id, &recv_handle, cmd).await,
                    Err(e) => {
                        warn!(
                            "user {} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let _ = recv_handle.push(ServerEvent::Error {
                            message: format!("unrecognized command: {}", e),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // The receive side is never aborted mid-command; it is asked to stop and
    // awaited so its last store write lands.
    tokio::select! {
        _ = &mut send_task => {
            shutdown.notify_one();
            let _ = recv_task.await;
        }
        _ = &mut recv_task => send_task.abort(),
    }

    let was_current = engine.disconnect(user_id, &handle).await;
    info!(
        "user {} disconnected (connection {}, {})",
        user_id,
        handle.id(),
        if was_current { "now offline" } else { "superseded" }
    );
}

/// Check that the authenticated caller may issue `cmd`.
///
/// A connection speaks only for its own user: it may announce only itself,
/// send only as itself, and read or count only its own inbox.
pub fn authorize(user_id: UserId, cmd: &ClientCommand) -> Result<(), CourierError> {
    let acting_as = match cmd {
        ClientCommand::UserOnline(id) => *id,
        ClientCommand::SendMessage { from, .. } => *from,
        ClientCommand::MarkMessagesRead { to, .. } => *to,
        ClientCommand::GetUnreadCount { to, .. } => *to,
    };

    if acting_as != user_id {
        return Err(CourierError::Forbidden(format!(
            "{} for user {} on a connection authenticated as {}",
            cmd.name(),
            acting_as,
            user_id
        )));
    }

    if let ClientCommand::SendMessage { text, .. } = cmd {
        if text.trim().is_empty() {
            return Err(CourierError::Validation("message text is empty".into()));
        }
    }

    Ok(())
}

/// Run one client command against the engine. Rejections and failures are
/// reported back on the caller's own connection.
pub async fn dispatch_command(
    engine: &DeliveryEngine,
    user_id: UserId,
    handle: &ConnectionHandle,
    cmd: ClientCommand,
) {
    if let Err(e) = authorize(user_id, &cmd) {
        warn!("user {} rejected {}: {}", user_id, cmd.name(), e);
        let _ = handle.push(ServerEvent::Error { message: e.to_string() });
        return;
    }

    let result = match cmd {
        ClientCommand::UserOnline(_) => {
            info!("user {} online (connection {})", user_id, handle.id());
            engine.reconnect(user_id, handle.clone()).await.map(|_| ())
        }
        ClientCommand::SendMessage { from, to, text } => match engine.directory().user(to).await {
            Ok(Some(_)) => engine.send(from, to, &text).await.map(|_| ()),
            Ok(None) => Err(CourierError::Validation(format!("Unknown recipient {}", to))),
            Err(e) => Err(e),
        },
        ClientCommand::MarkMessagesRead { from, to } => engine.mark_read(from, to).await.map(|_| ()),
        ClientCommand::GetUnreadCount { from, to } => {
            engine.unread().single_count(from, to, handle).await.map(|_| ())
        }
    };

    if let Err(e) = result {
        match e {
            CourierError::Persistence(_) => error!("user {} command failed: {}", user_id, e),
            _ => warn!("user {} command refused: {}", user_id, e),
        }
        let _ = handle.push(ServerEvent::Error { message: e.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;

    use futures_util::{sink, stream};
    use tokio::sync::mpsc;

    use super::*;
    use crate::testutil::{Fixture, drain};

    #[test]
    fn authorize_binds_commands_to_caller() {
        assert!(authorize(1, &ClientCommand::UserOnline(1)).is_ok());
        assert!(authorize(1, &ClientCommand::UserOnline(2)).is_err());

        let send = |from| ClientCommand::SendMessage { from, to: 2, text: "hi".into() };
        assert!(authorize(1, &send(1)).is_ok());
        assert!(matches!(authorize(1, &send(2)), Err(CourierError::Forbidden(_))));

        // only the recipient may mark its inbox read or ask for counts
        assert!(authorize(2, &ClientCommand::MarkMessagesRead { from: 1, to: 2 }).is_ok());
        assert!(authorize(1, &ClientCommand::MarkMessagesRead { from: 1, to: 2 }).is_err());
        assert!(authorize(2, &ClientCommand::GetUnreadCount { from: 1, to: 2 }).is_ok());
        assert!(authorize(1, &ClientCommand::GetUnreadCount { from: 1, to: 2 }).is_err());
    }

    #[test]
    fn authorize_rejects_blank_text() {
        let cmd = ClientCommand::SendMessage { from: 1, to: 2, text: "  ".into() };
        assert!(matches!(authorize(1, &cmd), Err(CourierError::Validation(_))));
    }

    #[tokio::test]
    async fn forged_mark_read_changes_nothing() {
        let fx = Fixture::new();
        fx.engine.send(fx.ann, fx.bob, "hi").await.unwrap();

        // Ann tries to clear Bob's badge for her own messages
        let (ann_conn, mut ann_rx) = ConnectionHandle::channel();
        dispatch_command(
            &fx.engine,
            fx.ann,
            &ann_conn,
            ClientCommand::MarkMessagesRead { from: fx.ann, to: fx.bob },
        )
        .await;

        assert!(matches!(drain(&mut ann_rx)[..], [ServerEvent::Error { .. }]));
        assert_eq!(fx.store.unread_count(fx.ann, fx.bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn commands_drive_full_conversation() {
        let fx = Fixture::new();
        let (ann_conn, mut ann_rx) = ConnectionHandle::channel();
        let (bob_conn, mut bob_rx) = ConnectionHandle::channel();

        dispatch_command(&fx.engine, fx.ann, &ann_conn, ClientCommand::UserOnline(fx.ann)).await;
        dispatch_command(
            &fx.engine,
            fx.ann,
            &ann_conn,
            ClientCommand::SendMessage { from: fx.ann, to: fx.bob, text: "hi".into() },
        )
        .await;
        drain(&mut ann_rx);

        dispatch_command(&fx.engine, fx.bob, &bob_conn, ClientCommand::UserOnline(fx.bob)).await;
        let events = drain(&mut bob_rx);
        assert_eq!(
            events[0],
            ServerEvent::NewMessage { text: Some("hi".into()), from: fx.ann, sender_name: "Ann Lee".into() }
        );

        dispatch_command(
            &fx.engine,
            fx.bob,
            &bob_conn,
            ClientCommand::GetUnreadCount { from: fx.ann, to: fx.bob },
        )
        .await;
        assert_eq!(drain(&mut bob_rx), vec![ServerEvent::UnreadCount { peer_id: fx.ann, count: 1 }]);

        dispatch_command(
            &fx.engine,
            fx.bob,
            &bob_conn,
            ClientCommand::MarkMessagesRead { from: fx.ann, to: fx.bob },
        )
        .await;
        assert_eq!(drain(&mut bob_rx), vec![ServerEvent::UnreadCount { peer_id: fx.ann, count: 0 }]);
        assert!(drain(&mut ann_rx).is_empty());
    }

    #[tokio::test]
    async fn send_to_unknown_recipient_is_refused() {
        let fx = Fixture::new();
        let (ann_conn, mut ann_rx) = ConnectionHandle::channel();

        dispatch_command(
            &fx.engine,
            fx.ann,
            &ann_conn,
            ClientCommand::SendMessage { from: fx.ann, to: 4242, text: "hello?".into() },
        )
        .await;

        let events = drain(&mut ann_rx);
        assert!(
            matches!(&events[..], [ServerEvent::Error { message }] if message.contains("Unknown recipient 4242"))
        );
        assert!(fx.store.pending_for_recipient(4242).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_send_reports_error_to_sender() {
        let fx = Fixture::new();
        let (ann_conn, mut ann_rx) = ConnectionHandle::channel();
        fx.db
            .with_conn(|c| {
                c.execute_batch("DROP TABLE messages;")?;
                Ok(())
            })
            .unwrap();

        dispatch_command(
            &fx.engine,
            fx.ann,
            &ann_conn,
            ClientCommand::SendMessage { from: fx.ann, to: fx.bob, text: "hello?".into() },
        )
        .await;

        let events = drain(&mut ann_rx);
        assert!(matches!(&events[..], [ServerEvent::Error { message }] if message.contains("persistence")));
    }

    type Frame = Result<Message, axum::Error>;
    type FrameSink = Pin<Box<dyn Sink<Message, Error = ()> + Send>>;

    fn frame(cmd: &ClientCommand) -> Frame {
        Ok(Message::Text(serde_json::to_string(cmd).unwrap().into()))
    }

    /// Sink whose every write fails, as if the peer vanished.
    fn dead_sink() -> FrameSink {
        Box::pin(sink::unfold((), |(), _frame: Message| async { Err::<(), ()>(()) }))
    }

    /// Sink that hands every written frame to `tx`.
    fn recording_sink(tx: mpsc::UnboundedSender<Message>) -> FrameSink {
        Box::pin(sink::unfold(tx, |tx, frame: Message| async move {
            tx.send(frame).map_err(|_| ())?;
            Ok::<_, ()>(tx)
        }))
    }

    #[tokio::test]
    async fn buffered_command_completes_before_presence_clears() {
        let fx = Fixture::new();
        let inbound = stream::iter(vec![
            frame(&ClientCommand::UserOnline(fx.bob)),
            frame(&ClientCommand::SendMessage { from: fx.bob, to: fx.ann, text: "late".into() }),
        ])
        .chain(stream::pending::<Frame>());

        // the first outbound write fails and ends the send side
        tokio::time::timeout(
            Duration::from_secs(5),
            run_connection_loop(dead_sink(), inbound, fx.engine.clone(), fx.bob, HEARTBEAT_INTERVAL),
        )
        .await
        .unwrap();

        let history = fx.store.history(fx.ann, fx.bob).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text.as_deref(), Some("late"));
        assert!(fx.presence.connection_for(fx.bob).await.is_none());
    }

    #[tokio::test]
    async fn closed_stream_clears_presence() {
        let fx = Fixture::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let inbound = stream::iter(vec![
            frame(&ClientCommand::UserOnline(fx.bob)),
            frame(&ClientCommand::MarkMessagesRead { from: fx.ann, to: fx.bob }),
        ]);
        fx.store.create(fx.ann, fx.bob, "seen").await.unwrap();

        run_connection_loop(recording_sink(tx), inbound, fx.engine.clone(), fx.bob, HEARTBEAT_INTERVAL).await;

        assert_eq!(fx.store.unread_count(fx.ann, fx.bob).await.unwrap(), 0);
        assert!(fx.presence.connection_for(fx.bob).await.is_none());
    }

    #[tokio::test]
    async fn missed_heartbeats_drop_connection() {
        let fx = Fixture::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inbound = stream::iter(vec![frame(&ClientCommand::UserOnline(fx.bob))]).chain(stream::pending::<Frame>());

        // the peer never answers a ping
        tokio::time::timeout(
            Duration::from_secs(5),
            run_connection_loop(recording_sink(tx), inbound, fx.engine.clone(), fx.bob, Duration::from_millis(20)),
        )
        .await
        .unwrap();

        let mut pings = 0;
        while let Ok(sent) = rx.try_recv() {
            if matches!(sent, Message::Ping(_)) {
                pings += 1;
            }
        }
        assert_eq!(pings, 2);
        assert!(fx.presence.connection_for(fx.bob).await.is_none());
    }
}

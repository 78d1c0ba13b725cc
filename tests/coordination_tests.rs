//! Coordination Scenarios
//!
//! End-to-end tests over the process-local coordination layer: gateway,
//! dispatcher, typing, presence, and the status/reaction engines wired to
//! in-memory stores. No database or network required.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use chat_relay::application::services::{MessageService, ReactionService, StatusService};
use chat_relay::domain::{Message, MessageStatus};
use chat_relay::presentation::websocket::{
    Gateway, MessageDispatcher, PresenceTracker, ReactionAction, ServerEvent, TypingTracker,
};
use chat_relay::shared::error::AppError;
use chat_relay::shared::{MessageLocks, SnowflakeGenerator};

use common::{connect, InMemoryChats, InMemoryMessages, InMemoryUsers};

#[tokio::test]
async fn presence_flips_only_on_first_and_last_session() {
    let gateway = Arc::new(Gateway::new());
    let users = InMemoryUsers::new(HashMap::from([(1, vec![2])]));
    let presence = PresenceTracker::new(gateway.clone(), users.clone());

    // Contact of user 1, watching for presence events.
    let mut contact_rx = connect(&gateway, "c1", 2);

    let (phone_tx, _phone_rx) = mpsc::unbounded_channel();
    let first = gateway.register("phone".into(), 1, phone_tx);
    presence.session_opened(1, first).await.unwrap();
    let (laptop_tx, _laptop_rx) = mpsc::unbounded_channel();
    let first = gateway.register("laptop".into(), 1, laptop_tx);
    presence.session_opened(1, first).await.unwrap();

    // Exactly one online event despite two connects.
    assert!(matches!(
        contact_rx.try_recv().unwrap(),
        ServerEvent::PresenceChanged { is_online: true, .. }
    ));
    assert!(contact_rx.try_recv().is_err());

    let td = gateway.unregister("phone").unwrap();
    presence.session_closed(1, td.last_session).await.unwrap();
    assert!(contact_rx.try_recv().is_err());

    let td = gateway.unregister("laptop").unwrap();
    presence.session_closed(1, td.last_session).await.unwrap();
    assert!(matches!(
        contact_rx.try_recv().unwrap(),
        ServerEvent::PresenceChanged {
            is_online: false,
            last_seen: Some(_),
            ..
        }
    ));

    let log = users.presence_log.lock().unwrap().clone();
    assert_eq!(log, vec![(1, true), (1, false)]);
}

#[tokio::test]
async fn dispatch_reaches_room_and_falls_back_to_direct_sessions() {
    let gateway = Arc::new(Gateway::new());
    let mut in_room = connect(&gateway, "s1", 1);
    let mut direct_a = connect(&gateway, "s2a", 2);
    let mut direct_b = connect(&gateway, "s2b", 2);
    gateway.join("s1", 10);
    // User 3 is a participant but offline.

    let dispatcher = MessageDispatcher::new(gateway);
    let summary = dispatcher.dispatch(
        10,
        &[1, 2, 3],
        ServerEvent::MessageDeleted {
            chat_id: "10".into(),
            message_id: "99".into(),
        },
    );

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.delivered, 3);
    assert!(summary.reached_other_than(1));
    assert!(in_room.try_recv().is_ok());
    assert!(direct_a.try_recv().is_ok());
    assert!(direct_b.try_recv().is_ok());

    // Single fan-out: nobody got the event twice.
    assert!(in_room.try_recv().is_err());
    assert!(direct_a.try_recv().is_err());
    assert!(direct_b.try_recv().is_err());
}

#[tokio::test]
async fn typing_indicator_ages_out_without_stop() {
    let typing = TypingTracker::new(Duration::from_millis(20));
    assert!(typing.set_typing(10, 1));
    assert_eq!(typing.typing_users(10), vec![1]);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(typing.typing_users(10).is_empty());
}

#[tokio::test]
async fn read_receipt_notifies_only_the_sender_sessions() {
    let gateway = Arc::new(Gateway::new());
    let mut sender_rx = connect(&gateway, "sender", 1);
    let mut reader_rx = connect(&gateway, "reader", 2);
    let mut bystander_rx = connect(&gateway, "bystander", 3);
    for s in ["sender", "reader", "bystander"] {
        gateway.join(s, 10);
    }

    let store = InMemoryMessages::with_messages(vec![Message {
        id: 99,
        chat_id: 10,
        sender_id: 1,
        status: MessageStatus::Delivered,
        read_by: vec![1],
        ..Default::default()
    }]);
    let chats = InMemoryChats::new(HashMap::from([(10, vec![1, 2, 3])]));
    let statuses = StatusService::new(store.clone(), chats);

    let change = statuses.mark_read(99, 2).await.unwrap().unwrap();
    gateway.send_to_user(
        change.sender_id,
        ServerEvent::MessageStatus {
            chat_id: change.chat_id.to_string(),
            message_id: change.message_id.to_string(),
            status: change.status,
            user_id: change.reader_id.map(|id| id.to_string()),
        },
    );

    assert!(matches!(
        sender_rx.try_recv().unwrap(),
        ServerEvent::MessageStatus {
            status: MessageStatus::Read,
            ..
        }
    ));
    assert!(reader_rx.try_recv().is_err());
    assert!(bystander_rx.try_recv().is_err());

    // A second receipt from the same reader changes nothing.
    assert!(statuses.mark_read(99, 2).await.unwrap().is_none());
    // The sender reading their own message changes nothing either.
    assert!(statuses.mark_read(99, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn reaction_replace_announces_removal_before_addition() {
    let gateway = Arc::new(Gateway::new());
    let mut observer_rx = connect(&gateway, "observer", 2);
    gateway.join("observer", 10);

    let store = InMemoryMessages::with_messages(vec![Message {
        id: 99,
        chat_id: 10,
        sender_id: 1,
        ..Default::default()
    }]);
    let chats = InMemoryChats::new(HashMap::from([(10, vec![1, 2])]));
    let reactions = ReactionService::new(store, chats, Arc::new(MessageLocks::new()));
    let dispatcher = MessageDispatcher::new(gateway);

    let first = reactions.react(99, 2, "👍".into()).await.unwrap();
    assert_eq!(first.removed, None);
    assert_eq!(first.added.as_deref(), Some("👍"));

    let replace = reactions.react(99, 2, "❤️".into()).await.unwrap();
    assert_eq!(replace.removed.as_deref(), Some("👍"));
    assert_eq!(replace.added.as_deref(), Some("❤️"));

    for (emoji, action) in [
        (replace.removed.clone().unwrap(), ReactionAction::Removed),
        (replace.added.clone().unwrap(), ReactionAction::Added),
    ] {
        dispatcher.dispatch(
            10,
            &[1, 2],
            ServerEvent::ReactionChanged {
                chat_id: "10".into(),
                message_id: "99".into(),
                user_id: "2".into(),
                emoji,
                action,
            },
        );
    }

    let first_event = observer_rx.try_recv().unwrap();
    let second_event = observer_rx.try_recv().unwrap();
    assert!(matches!(
        first_event,
        ServerEvent::ReactionChanged {
            action: ReactionAction::Removed,
            ..
        }
    ));
    assert!(matches!(
        second_event,
        ServerEvent::ReactionChanged {
            action: ReactionAction::Added,
            ..
        }
    ));

    // Toggling the same emoji off produces a removal only.
    let toggle_off = reactions.react(99, 2, "❤️".into()).await.unwrap();
    assert_eq!(toggle_off.removed.as_deref(), Some("❤️"));
    assert_eq!(toggle_off.added, None);
}

#[tokio::test]
async fn outsiders_cannot_react_or_record_receipts() {
    let store = InMemoryMessages::with_messages(vec![Message {
        id: 99,
        chat_id: 10,
        sender_id: 1,
        status: MessageStatus::Delivered,
        read_by: vec![1],
        ..Default::default()
    }]);
    let chats = InMemoryChats::new(HashMap::from([(10, vec![1, 2])]));

    let reactions = ReactionService::new(
        store.clone(),
        chats.clone(),
        Arc::new(MessageLocks::new()),
    );
    let statuses = StatusService::new(store.clone(), chats);

    // User 999 knows the message id but is not in chat 10.
    let err = reactions.react(99, 999, "👍".into()).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
    assert!(store.reactions.lock().unwrap().is_empty());

    let err = statuses.mark_read(99, 999).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
    assert!(!store.reads.lock().unwrap().contains(&(99, 999)));

    // A real participant still gets through.
    let outcome = reactions.react(99, 2, "👍".into()).await.unwrap();
    assert_eq!(outcome.added.as_deref(), Some("👍"));
    assert!(statuses.mark_read(99, 2).await.unwrap().is_some());
}

#[tokio::test]
async fn unread_count_excludes_own_read_and_deleted_messages() {
    let message = |id: i64, sender_id: i64| Message {
        id,
        chat_id: 10,
        sender_id,
        read_by: vec![sender_id],
        ..Default::default()
    };
    let store = InMemoryMessages::with_messages(vec![
        message(1, 1), // viewer's own
        message(2, 2), // unread
        message(3, 2), // will carry the viewer's receipt
        message(4, 2), // deleted for everyone
        message(5, 2), // hidden for the viewer
        message(6, 2), // unread
    ]);
    store.reads.lock().unwrap().insert((3, 1));
    store.messages.lock().unwrap().get_mut(&4).unwrap().deleted = true;
    store.hides.lock().unwrap().insert((5, 1));

    let chats = InMemoryChats::new(HashMap::from([(10, vec![1, 2])]));
    let messages = MessageService::new(store, chats, Arc::new(SnowflakeGenerator::new(1)));

    assert_eq!(messages.unread_count(10, 1).await.unwrap(), 2);
    // The other participant has read nothing but their own.
    assert_eq!(messages.unread_count(10, 2).await.unwrap(), 1);

    // Outsiders get no count at all.
    let err = messages.unread_count(10, 999).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
}

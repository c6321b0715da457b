//! End-to-end chat between two devices sharing one document store.
//!
//! Covers profile setup, chat creation, encrypted delivery, read receipts
//! and the chat list, using on-disk databases.

use std::time::Duration;

use futures::StreamExt;

use safezone_client::{
    AppState, ChatSubscription, KeyAgent, MessageBody, MessageView, SearchMode,
};
use safezone_shared::{ReadStatus, Username};
use safezone_store::{Database, LiveStore};

fn u(name: &str) -> Username {
    Username::parse(name).expect("valid username")
}

fn camera_still(seed: u8) -> Vec<u8> {
    (0..4096u32)
        .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8 ^ seed)
        .collect()
}

async fn next(sub: &mut ChatSubscription) -> Vec<MessageView> {
    tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("feed timed out")
        .expect("feed ended")
}

fn device(dir: &std::path::Path, name: &str, store: &LiveStore) -> AppState {
    let keys = KeyAgent::open(&dir.join(format!("{name}-vault.db"))).expect("open vault");
    AppState::with_parts(keys, store.clone()).expect("open state")
}

#[tokio::test]
async fn test_two_users_chat_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LiveStore::new(Database::open_at(&dir.path().join("store.db")).expect("open store"));

    let mut alice = device(dir.path(), "alice", &store);
    let mut bob = device(dir.path(), "bob", &store);

    alice.setup_profile("alice", &mut camera_still(1)).expect("alice profile");
    bob.setup_profile("bob", &mut camera_still(2)).expect("bob profile");
    assert_ne!(
        alice.identity().unwrap().public_key(),
        bob.identity().unwrap().public_key()
    );

    // Alice finds Bob in the directory and opens the chat.
    let found = alice
        .directory()
        .search(&u("alice"), "BO", SearchMode::Username)
        .expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, u("bob"));

    let chat_id = alice.focus_chat(&u("bob")).expect("focus").chat_id().clone();
    assert!(next(alice.focused().unwrap()).await.is_empty());

    // Bob opens the same chat from his side: same id.
    let bob_feed = bob.focus_chat(&u("alice")).expect("focus");
    assert_eq!(bob_feed.chat_id(), &chat_id);
    assert!(next(bob.focused().unwrap()).await.is_empty());

    // Alice sends; both feeds show the decrypted text.
    let sent = alice
        .controller()
        .unwrap()
        .send_text(&chat_id, "meet at noon")
        .expect("send");
    assert!(sent.encrypted_payloads.contains_key(&u("alice")));
    assert!(sent.encrypted_payloads.contains_key(&u("bob")));

    let bob_view = next(bob.focused().unwrap()).await;
    assert_eq!(bob_view.len(), 1);
    assert_eq!(bob_view[0].body, MessageBody::Text("meet at noon".into()));

    let alice_view = next(alice.focused().unwrap()).await;
    assert_eq!(alice_view[0].body, MessageBody::Text("meet at noon".into()));
    assert_eq!(alice_view[0].receipt, Some(ReadStatus::Sent));

    // Bob reads it; Alice sees the receipt.
    let marked = bob.controller().unwrap().mark_all_read(&chat_id).expect("mark");
    assert_eq!(marked, 1);
    let alice_view = next(alice.focused().unwrap()).await;
    assert_eq!(alice_view[0].receipt, Some(ReadStatus::FullyRead));

    // Idempotent: a second mark changes nothing.
    assert!(!bob
        .controller()
        .unwrap()
        .mark_read(&chat_id, &sent.id, &u("bob"))
        .expect("mark again"));

    // Bob replies; order follows send time.
    bob.controller()
        .unwrap()
        .send_text(&chat_id, "see you there")
        .expect("reply");
    let alice_view = next(alice.focused().unwrap()).await;
    let texts: Vec<_> = alice_view.iter().map(|v| v.body.clone()).collect();
    assert_eq!(
        texts,
        vec![
            MessageBody::Text("meet at noon".into()),
            MessageBody::Text("see you there".into()),
        ]
    );
    assert!(alice_view[0].sent_at < alice_view[1].sent_at);

    // Bob's chat list shows his own reply as the newest message.
    let mut list = bob.controller().unwrap().chat_list();
    let rows = tokio::time::timeout(Duration::from_secs(2), list.next())
        .await
        .expect("list timed out")
        .expect("list ended");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].peer, u("alice"));
    assert_eq!(rows[0].preview, Some(MessageBody::Text("see you there".into())));
    assert_eq!(rows[0].receipt, Some(ReadStatus::Sent));
    assert!(!rows[0].unread);
}

#[tokio::test]
async fn test_reset_then_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LiveStore::new(Database::open_at(&dir.path().join("store.db")).expect("open store"));

    let mut alice = device(dir.path(), "alice", &store);
    alice.setup_profile("alice", &mut camera_still(7)).expect("profile");
    alice.focus_chat(&u("bob")).expect("focus");

    alice.reset_profile().expect("reset");
    assert!(alice.focused().is_none());
    assert!(alice.identity().is_none());

    // The name stays claimed in the directory.
    let again = device(dir.path(), "alice", &store);
    assert!(again.identity().is_none());
    assert!(!again.directory().is_available(&u("alice")).expect("lookup"));
}

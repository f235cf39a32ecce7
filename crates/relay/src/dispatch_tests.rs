// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::{Duration, Instant};

use serde_json::json;

use super::ConnState;
use crate::reaper::reap_once;
use crate::test_support::{test_state, TestClient};

fn file_start(file_id: &str, total: i64) -> serde_json::Value {
    json!({
        "type": "file_start",
        "fileId": file_id,
        "fileData": { "name": "a.txt", "type": "text/plain", "size": 12, "totalChunks": total },
    })
}

fn file_chunk(file_id: &str, index: i64, data: &str) -> serde_json::Value {
    json!({ "type": "file_chunk", "fileId": file_id, "chunkIndex": index, "data": data })
}

fn file_complete(file_id: &str) -> serde_json::Value {
    json!({ "type": "file_complete", "fileId": file_id })
}

#[tokio::test]
async fn alice_and_bob_typing_chat_and_disconnect() {
    let state = test_state();
    let mut alice = TestClient::new(&state);
    let mut bob = TestClient::new(&state);

    alice.join(&state, "R1", "Alice", "a1").await;
    bob.join(&state, "R1", "Bob", "b1").await;

    let joined = alice.drain();
    assert_eq!(joined[0]["message"], "You joined R1");
    assert_eq!(joined[1]["message"], "Bob has joined the room.");
    assert_eq!(bob.drain_types(), vec!["info"]);

    alice
        .send(&state, json!({ "type": "typing_start", "roomId": "R1", "personName": "Alice", "personId": "a1" }))
        .await;
    let frame = bob.recv();
    assert_eq!(frame.as_ref().map(|f| f["type"].clone()), Some(json!("typing_start")));
    assert_eq!(frame.map(|f| f["personId"].clone()), Some(json!("a1")));
    assert!(alice.drain().is_empty(), "typing_start is not echoed");

    alice
        .send(&state, json!({ "type": "chat", "message": "hi", "roomId": "R1", "personName": "Alice", "personId": "a1" }))
        .await;
    let frames = bob.drain();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["type"], "typing_stop");
    assert_eq!(frames[0]["personId"], "a1");
    assert_eq!(frames[1]["type"], "chat");
    assert_eq!(frames[1]["message"], "hi");
    assert_eq!(frames[1]["personId"], "a1");
    assert!(frames[1]["timestamp"].as_u64().is_some());
    assert_eq!(alice.drain_types(), vec!["chat"]);

    alice.disconnect(&state).await;
    assert_eq!(alice.ctx.state(), ConnState::Closed);
    {
        let hub = state.hub.lock().await;
        assert_eq!(hub.registry.member_count("R1"), 1);
        assert!(hub.registry.contains("R1", bob.ctx.id()));
    }
    assert!(bob.drain().is_empty(), "no typing notice for a person not typing");
}

#[tokio::test]
async fn join_binds_identity_and_replies() {
    let state = test_state();
    let mut c = TestClient::new(&state);
    assert_eq!(c.ctx.state(), ConnState::Unbound);

    c.join(&state, "lobby", "Cleo", "c1").await;

    assert_eq!(c.ctx.state(), ConnState::Joined);
    let identity = c.ctx.identity().cloned();
    assert_eq!(identity.map(|i| i.person_id), Some("c1".to_owned()));
    assert_eq!(c.ctx.rooms().collect::<Vec<_>>(), vec!["lobby"]);
    let reply = c.recv();
    assert_eq!(reply.map(|f| f["message"].clone()), Some(json!("You joined lobby")));
}

#[tokio::test]
async fn repeated_identical_join_is_rejected() {
    let state = test_state();
    let mut c = TestClient::new(&state);
    c.join(&state, "R1", "Alice", "a1").await;
    c.drain();

    c.join(&state, "R1", "Alice", "a1").await;

    let reply = c.recv();
    assert_eq!(reply.as_ref().map(|f| f["code"].clone()), Some(json!("ALREADY_JOINED")));
    assert_eq!(reply.map(|f| f["message"].clone()), Some(json!("Already joined this room")));
    assert_eq!(state.hub.lock().await.registry.member_count("R1"), 1);
}

#[tokio::test]
async fn second_room_join_keeps_first_membership() {
    let state = test_state();
    let mut c = TestClient::new(&state);
    c.join(&state, "R1", "Alice", "a1").await;
    c.join(&state, "R2", "Alice", "a1").await;

    let hub = state.hub.lock().await;
    assert!(hub.registry.contains("R1", c.ctx.id()));
    assert!(hub.registry.contains("R2", c.ctx.id()));
    drop(hub);
    assert_eq!(c.ctx.rooms().collect::<Vec<_>>(), vec!["R1", "R2"]);
    assert_eq!(c.ctx.identity().map(|i| i.room_id.clone()), Some("R2".to_owned()));

    c.disconnect(&state).await;
    assert_eq!(state.stats().await.rooms, 0);
}

#[tokio::test]
async fn rebinding_identity_clears_previous_typing_mark() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    let mut b = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    b.join(&state, "R1", "Bob", "b1").await;
    a.send(&state, json!({ "type": "typing_start", "roomId": "R1", "personName": "Alice", "personId": "a1" }))
        .await;
    b.drain();

    a.join(&state, "R2", "Alice", "a1").await;

    assert!(!state.hub.lock().await.typing.is_typing("R1", "a1"));
    assert_eq!(b.drain_types(), vec!["typing_stop"]);
}

#[yare::parameterized(
    not_json       = { "hello" },
    json_array     = { "[1, 2]" },
    missing_type   = { r#"{"roomId":"R1"}"# },
    unknown_type   = { r#"{"type":"dance"}"# },
    join_no_fields = { r#"{"type":"join"}"# },
    chunk_bad_idx  = { r#"{"type":"file_chunk","fileId":"f","chunkIndex":"x","data":""}"# },
)]
#[test_macro(tokio::test)]
async fn bad_frames_get_error_and_change_nothing(text: &str) {
    let state = test_state();
    let mut c = TestClient::new(&state);
    c.join(&state, "R1", "Alice", "a1").await;
    c.drain();
    let before = state.stats().await;

    c.send_text(&state, text).await;

    assert_eq!(c.drain_types(), vec!["error"]);
    assert_eq!(state.stats().await, before);
    assert_eq!(c.ctx.state(), ConnState::Joined);
    assert!(c.ctx.handle().is_open());
}

#[tokio::test]
async fn error_codes_for_malformed_and_unsupported() {
    let state = test_state();
    let mut c = TestClient::new(&state);

    c.send_text(&state, "{nope").await;
    c.send_text(&state, r#"{"type":"dance"}"#).await;

    let frames = c.drain();
    assert_eq!(frames[0]["code"], "BAD_REQUEST");
    assert_eq!(frames[0]["message"], "Invalid JSON format");
    assert_eq!(frames[1]["code"], "UNSUPPORTED_TYPE");
    assert_eq!(frames[1]["message"], "Unsupported message type");
}

#[tokio::test]
async fn ping_gets_pong() {
    let state = test_state();
    let mut c = TestClient::new(&state);
    c.send(&state, json!({ "type": "ping" })).await;
    assert_eq!(c.drain_types(), vec!["pong"]);
}

#[tokio::test]
async fn empty_chat_is_dropped() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.drain();

    a.send(&state, json!({ "type": "chat", "message": "", "roomId": "R1", "personId": "a1" })).await;

    assert!(a.drain().is_empty());
}

#[tokio::test]
async fn chat_to_unknown_room_is_dropped() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.drain();

    a.send(&state, json!({ "type": "chat", "message": "hi", "roomId": "nowhere", "personId": "a1" }))
        .await;

    assert!(a.drain().is_empty());
    assert!(!state.hub.lock().await.registry.has_room("nowhere"));
}

#[tokio::test]
async fn typing_stop_without_start_is_suppressed() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    let mut b = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    b.join(&state, "R1", "Bob", "b1").await;
    b.drain();

    let stop = json!({ "type": "typing_stop", "roomId": "R1", "personName": "Alice", "personId": "a1" });
    a.send(&state, stop.clone()).await;
    assert!(b.drain().is_empty());

    a.send(&state, json!({ "type": "typing_start", "roomId": "R1", "personName": "Alice", "personId": "a1" }))
        .await;
    a.send(&state, stop.clone()).await;
    a.send(&state, stop).await;
    assert_eq!(b.drain_types(), vec!["typing_start", "typing_stop"]);
}

#[tokio::test]
async fn chat_without_typing_sends_no_stop() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    let mut b = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    b.join(&state, "R1", "Bob", "b1").await;
    b.drain();

    a.send(&state, json!({ "type": "chat", "message": "yo", "roomId": "R1", "personName": "Alice", "personId": "a1" }))
        .await;

    assert_eq!(b.drain_types(), vec!["chat"]);
}

#[tokio::test]
async fn last_leave_deletes_room_and_typing_marks() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.send(&state, json!({ "type": "typing_start", "roomId": "R1", "personName": "Alice", "personId": "a1" }))
        .await;

    a.disconnect(&state).await;

    let hub = state.hub.lock().await;
    assert!(!hub.registry.has_room("R1"));
    assert_eq!(hub.typing.typing_in("R1"), 0);
}

#[tokio::test]
async fn frames_after_disconnect_are_ignored() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.disconnect(&state).await;

    a.join(&state, "R1", "Alice", "a1").await;

    assert!(a.drain().is_empty());
    assert_eq!(state.stats().await.rooms, 0);
}

#[tokio::test]
async fn file_message_requires_join() {
    let state = test_state();
    let mut a = TestClient::new(&state);

    a.send(&state, json!({ "type": "file_message", "fileData": { "name": "x.png", "type": "image/png", "size": 3, "data": "AAAA" } }))
        .await;

    let reply = a.recv();
    assert_eq!(reply.as_ref().map(|f| f["code"].clone()), Some(json!("NOT_JOINED")));
    assert_eq!(reply.map(|f| f["message"].clone()), Some(json!("Not joined to any room")));
}

#[tokio::test]
async fn file_message_reaches_whole_room() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    let mut b = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    b.join(&state, "R1", "Bob", "b1").await;
    a.drain();
    b.drain();

    a.send(&state, json!({ "type": "file_message", "fileData": { "name": "x.png", "type": "image/png", "size": 3, "data": "AAAA" } }))
        .await;

    for frames in [a.drain(), b.drain()] {
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "file_message");
        assert_eq!(frames[0]["personName"], "Alice");
        assert_eq!(frames[0]["fileData"]["data"], "AAAA");
        assert_eq!(frames[0]["fileData"]["type"], "image/png");
    }
}

#[tokio::test]
async fn file_message_forwards_file_data_untouched() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    let mut b = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    b.join(&state, "R1", "Bob", "b1").await;
    b.drain();

    let file_data = json!({
        "name": "x.png",
        "type": "image/png",
        "data": "AAAA",
        "lastModified": 1_700_000_000_000_u64,
        "id": "abc",
    });
    a.send(&state, json!({ "type": "file_message", "fileData": file_data.clone() })).await;

    let received = b.drain();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["fileData"], file_data);
}

/// Run a four-chunk upload with chunks sent in `order` and return the
/// payload the room receives.
async fn upload_in_order(order: [usize; 4]) -> Option<serde_json::Value> {
    let chunks = ["aGVs", "bG8g", "d29y", "bGQ="];
    let state = test_state();
    let mut a = TestClient::new(&state);
    let mut b = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    b.join(&state, "R1", "Bob", "b1").await;
    a.drain();
    b.drain();

    a.send(&state, file_start("f1", 4)).await;
    for i in order {
        a.send(&state, file_chunk("f1", i as i64, chunks[i])).await;
    }
    a.send(&state, file_complete("f1")).await;

    let replies = a.drain();
    let types: Vec<_> = replies.iter().map(|f| f["type"].clone()).collect();
    assert_eq!(
        types,
        vec![
            json!("file_progress"),
            json!("file_progress"),
            json!("file_progress"),
            json!("file_progress"),
            json!("file_progress"),
            json!("file_message"),
            json!("file_complete"),
        ]
    );
    let progress: Vec<_> = replies[..5].iter().map(|f| f["progress"].clone()).collect();
    assert_eq!(progress, vec![json!(0), json!(25), json!(50), json!(75), json!(100)]);
    assert!(state.hub.lock().await.uploads.is_empty());

    let mut received = b.drain();
    assert_eq!(received.len(), 1);
    received.pop().map(|f| f["fileData"]["data"].clone())
}

#[tokio::test]
async fn chunked_upload_is_order_independent() {
    let shuffled = upload_in_order([2, 0, 3, 1]).await;
    let ordered = upload_in_order([0, 1, 2, 3]).await;
    assert_eq!(shuffled, Some(json!("aGVsbG8gd29ybGQ=")));
    assert_eq!(shuffled, ordered);
}

#[tokio::test]
async fn complete_with_missing_chunk_names_index_and_deletes_session() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.send(&state, file_start("f1", 3)).await;
    a.send(&state, file_chunk("f1", 0, "aGVs")).await;
    a.send(&state, file_chunk("f1", 2, "bG8=")).await;
    a.drain();

    a.send(&state, file_complete("f1")).await;
    let err = a.recv();
    assert_eq!(err.as_ref().map(|f| f["type"].clone()), Some(json!("file_error")));
    assert_eq!(err.as_ref().map(|f| f["chunkIndex"].clone()), Some(json!(1)));
    assert_eq!(err.map(|f| f["message"].clone()), Some(json!("Missing chunk at index 1")));
    assert!(!state.hub.lock().await.uploads.contains("f1"));

    a.send(&state, file_chunk("f1", 1, "bG8g")).await;
    let err = a.recv();
    assert_eq!(err.as_ref().map(|f| f["code"].clone()), Some(json!("UPLOAD_NOT_FOUND")));
    assert_eq!(err.map(|f| f["message"].clone()), Some(json!("Upload session not found")));
}

#[tokio::test]
async fn disconnect_deletes_open_upload() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.send(&state, file_start("f1", 2)).await;
    a.send(&state, file_chunk("f1", 0, "aGVs")).await;
    assert_eq!(state.stats().await.uploads, 1);

    a.disconnect(&state).await;
    assert_eq!(state.stats().await.uploads, 0);

    let mut other = TestClient::new(&state);
    other.send(&state, file_complete("f1")).await;
    let err = other.recv();
    assert_eq!(err.map(|f| f["code"].clone()), Some(json!("UPLOAD_NOT_FOUND")));
}

#[tokio::test]
async fn out_of_range_chunk_keeps_session() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.send(&state, file_start("f1", 2)).await;
    a.drain();

    a.send(&state, file_chunk("f1", 2, "aGVs")).await;
    a.send(&state, file_chunk("f1", -1, "aGVs")).await;

    let frames = a.drain();
    assert_eq!(frames.len(), 2);
    for f in &frames {
        assert_eq!(f["type"], "file_error");
        assert_eq!(f["code"], "CHUNK_OUT_OF_RANGE");
    }
    assert_eq!(frames[0]["chunkIndex"], 2);
    assert_eq!(frames[1]["chunkIndex"], -1);
    assert!(state.hub.lock().await.uploads.contains("f1"));
}

#[tokio::test]
async fn duplicate_file_start_is_rejected() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.send(&state, file_start("f1", 2)).await;
    a.send(&state, file_chunk("f1", 0, "aGVs")).await;
    a.drain();

    a.send(&state, file_start("f1", 5)).await;

    let err = a.recv();
    assert_eq!(err.map(|f| f["code"].clone()), Some(json!("UPLOAD_EXISTS")));
    let mut hub = state.hub.lock().await;
    let session = hub.uploads.get_mut("f1");
    assert_eq!(session.map(|s| (s.total_chunks(), s.filled())), Some((2, 1)));
}

#[yare::parameterized(
    missing = { json!({ "name": "a", "type": "text/plain", "size": 1 }) },
    zero    = { json!({ "name": "a", "type": "text/plain", "size": 1, "totalChunks": 0 }) },
    huge    = { json!({ "name": "a", "type": "text/plain", "size": 1, "totalChunks": 1_000_000 }) },
)]
#[test_macro(tokio::test)]
async fn file_start_rejects_bad_total(file_data: serde_json::Value) {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.drain();

    a.send(&state, json!({ "type": "file_start", "fileId": "f1", "fileData": file_data })).await;

    let err = a.recv();
    assert_eq!(err.map(|f| f["code"].clone()), Some(json!("INVALID_UPLOAD")));
    assert!(state.hub.lock().await.uploads.is_empty());
}

#[tokio::test]
async fn file_start_requires_join() {
    let state = test_state();
    let mut a = TestClient::new(&state);

    a.send(&state, file_start("f1", 2)).await;

    let err = a.recv();
    assert_eq!(err.map(|f| f["code"].clone()), Some(json!("NOT_JOINED")));
    assert!(state.hub.lock().await.uploads.is_empty());
}

#[tokio::test]
async fn file_start_into_foreign_room_is_rejected() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.drain();

    let mut frame = file_start("f1", 2);
    frame["roomId"] = json!("R9");
    a.send(&state, frame).await;

    let err = a.recv();
    assert_eq!(err.as_ref().map(|f| f["type"].clone()), Some(json!("file_error")));
    assert_eq!(err.map(|f| f["code"].clone()), Some(json!("NOT_JOINED")));
}

#[yare::parameterized(
    padded_per_chunk = { &["aGVsbG8=", "IHdvcmxk"], "aGVsbG8=IHdvcmxk" },
    unpadded         = { &["aGVsbG8"], "aGVsbG8" },
)]
#[test_macro(tokio::test)]
async fn complete_relays_chunk_text_as_sent(chunks: &[&str], expected: &str) {
    let state = test_state();
    let mut a = TestClient::new(&state);
    let mut b = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    b.join(&state, "R1", "Bob", "b1").await;
    a.send(&state, file_start("f1", chunks.len() as i64)).await;
    for (i, c) in chunks.iter().enumerate() {
        a.send(&state, file_chunk("f1", i as i64, c)).await;
    }
    a.drain();
    b.drain();

    a.send(&state, file_complete("f1")).await;

    let received = b.drain();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["type"], "file_message");
    assert_eq!(received[0]["fileData"]["data"], expected);
    assert_eq!(received[0]["fileData"]["isBase64"], true);
    assert_eq!(a.drain_types(), vec!["file_message", "file_complete"]);
    assert!(state.hub.lock().await.uploads.is_empty());
}

#[tokio::test]
async fn reaper_evicts_idle_upload_and_notifies_owner() {
    let state = test_state();
    let mut a = TestClient::new(&state);
    a.join(&state, "R1", "Alice", "a1").await;
    a.send(&state, file_start("f1", 2)).await;
    a.drain();

    let idle = Duration::from_secs(5);
    assert_eq!(reap_once(&state, Instant::now(), idle).await, 0);
    assert!(a.drain().is_empty());

    let later = Instant::now() + Duration::from_secs(6);
    assert_eq!(reap_once(&state, later, idle).await, 1);

    let err = a.recv();
    assert_eq!(err.as_ref().map(|f| f["code"].clone()), Some(json!("UPLOAD_EXPIRED")));
    assert_eq!(err.map(|f| f["fileId"].clone()), Some(json!("f1")));
    assert!(state.hub.lock().await.uploads.is_empty());
}

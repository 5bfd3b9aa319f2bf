mod common;

use chrono::{Duration, Utc};
use common::{drain, harness};
use matching_service::error::AppError;
use matching_service::models::{
    CreateConversationRequest, Gender, SendMessageRequest, WealthStatus, LOCKED_PREVIEW_LIMIT,
};
use matching_service::store::ConversationStore;
use uuid::Uuid;

fn opener(recipient_id: Uuid, content: &str) -> CreateConversationRequest {
    CreateConversationRequest {
        recipient_id,
        content: Some(content.to_string()),
        image_url: None,
    }
}

fn text(content: &str) -> SendMessageRequest {
    SendMessageRequest {
        content: Some(content.to_string()),
        image_url: None,
    }
}

#[tokio::test]
async fn test_male_cannot_initiate_when_restricted() {
    let h = harness(true).await;
    let man = h.add(Gender::Male, true, WealthStatus::High).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;

    let err = h
        .gate
        .create_conversation(man, opener(woman, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MaleCannotInitiate));
    assert_eq!(err.code(), "male_cannot_initiate");
    assert!(h
        .store
        .find_conversation_between(man, woman)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unrestricted_anyone_may_initiate_and_push() {
    let h = harness(false).await;
    let man = h.add(Gender::Male, false, WealthStatus::None).await;
    let woman = h.add(Gender::Female, false, WealthStatus::None).await;
    let mut woman_conn = h.hub.register(woman).await.unwrap();

    let created = h
        .gate
        .create_conversation(man, opener(woman, "hello"))
        .await
        .unwrap();
    assert_eq!(created.conversation.initiated_by, man);
    assert_eq!(created.message.content, "hello");

    let frames = drain(&mut woman_conn);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "message");
    assert_eq!(frames[0]["payload"]["content"], "hello");
}

#[tokio::test]
async fn test_unverified_woman_cannot_initiate() {
    let h = harness(true).await;
    let woman = h.add(Gender::Female, false, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::High).await;

    let err = h
        .gate
        .create_conversation(woman, opener(man, "hey"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationRequired));
}

#[tokio::test]
async fn test_duplicate_pair_conflicts_in_either_direction() {
    let h = harness(false).await;
    let a = h.add(Gender::Female, true, WealthStatus::None).await;
    let b = h.add(Gender::Male, true, WealthStatus::None).await;

    h.gate.create_conversation(a, opener(b, "first")).await.unwrap();

    let again = h.gate.create_conversation(a, opener(b, "again")).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    let reverse = h.gate.create_conversation(b, opener(a, "reverse")).await;
    assert!(matches!(reverse, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_request_validation() {
    let h = harness(false).await;
    let a = h.add(Gender::Female, true, WealthStatus::None).await;
    let b = h.add(Gender::Male, true, WealthStatus::None).await;

    let to_self = h.gate.create_conversation(a, opener(a, "me")).await;
    assert!(matches!(to_self, Err(AppError::Validation(_))));

    let empty = h
        .gate
        .create_conversation(
            a,
            CreateConversationRequest {
                recipient_id: b,
                content: Some("   ".into()),
                image_url: None,
            },
        )
        .await;
    assert!(matches!(empty, Err(AppError::Validation(_))));

    let missing = h
        .gate
        .create_conversation(a, opener(Uuid::new_v4(), "anyone?"))
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_locked_recipient_gets_no_push_but_message_persists() {
    let h = harness(true).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let locked_man = h.add(Gender::Male, true, WealthStatus::None).await;
    let mut man_conn = h.hub.register(locked_man).await.unwrap();

    let created = h
        .gate
        .create_conversation(woman, opener(locked_man, "hello there"))
        .await
        .unwrap();

    assert!(drain(&mut man_conn).is_empty());
    assert!(h.store.message(created.message.id).await.is_some());
    assert_eq!(h.gate.unread_count(locked_man).await.unwrap(), 1);
}

#[tokio::test]
async fn test_subscribed_recipient_gets_push() {
    let h = harness(true).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::Low).await;
    let mut man_conn = h.hub.register(man).await.unwrap();

    h.gate
        .create_conversation(woman, opener(man, "hello"))
        .await
        .unwrap();

    let frames = drain(&mut man_conn);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "message");
}

#[tokio::test]
async fn test_male_reply_requires_verification_then_subscription() {
    let h = harness(true).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, false, WealthStatus::None).await;
    let conv = h
        .gate
        .create_conversation(woman, opener(man, "hi"))
        .await
        .unwrap()
        .conversation;

    // Unverified and unsubscribed: verification is reported first.
    let err = h.gate.send_message(man, conv.id, text("hey")).await.unwrap_err();
    assert!(matches!(err, AppError::VerificationRequired));

    h.store
        .update_profile(man, |p| p.person_verified = true)
        .await;
    let err = h.gate.send_message(man, conv.id, text("hey")).await.unwrap_err();
    assert!(matches!(err, AppError::WealthStatusRequired));
    assert_eq!(err.code(), "subscription_required");

    h.store
        .update_user(man, |u| u.wealth_status = WealthStatus::Medium)
        .await;
    let reply = h.gate.send_message(man, conv.id, text("hey")).await.unwrap();
    assert_eq!(reply.sender_id, man);
}

#[tokio::test]
async fn test_expired_subscription_counts_as_none() {
    let h = harness(true).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::High).await;
    h.store
        .update_user(man, |u| {
            u.wealth_status_expires_at = Some(Utc::now() - Duration::days(1))
        })
        .await;

    let conv = h
        .gate
        .create_conversation(woman, opener(man, "hi"))
        .await
        .unwrap()
        .conversation;
    let err = h.gate.send_message(man, conv.id, text("yo")).await.unwrap_err();
    assert!(matches!(err, AppError::WealthStatusRequired));
}

#[tokio::test]
async fn test_restrictions_flag_toggles_behavior() {
    let h = harness(false).await;
    let man = h.add(Gender::Male, true, WealthStatus::None).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let other = h.add(Gender::Female, true, WealthStatus::None).await;

    h.gate.create_conversation(man, opener(woman, "hi")).await.unwrap();

    h.store
        .set_flag(
            matching_service::services::feature_flags::RESTRICTIONS_ENABLED,
            true,
        )
        .await;
    h.flags.refresh().await.unwrap();

    let err = h
        .gate
        .create_conversation(man, opener(other, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MaleCannotInitiate));
}

#[tokio::test]
async fn test_outsider_is_not_a_participant() {
    let h = harness(false).await;
    let a = h.add(Gender::Female, true, WealthStatus::None).await;
    let b = h.add(Gender::Male, true, WealthStatus::High).await;
    let outsider = h.add(Gender::Female, true, WealthStatus::None).await;
    let conv = h
        .gate
        .create_conversation(a, opener(b, "hi"))
        .await
        .unwrap()
        .conversation;

    assert!(matches!(
        h.gate.send_message(outsider, conv.id, text("psst")).await,
        Err(AppError::NotParticipant)
    ));
    assert!(matches!(
        h.gate.get_messages(outsider, conv.id, None, None).await,
        Err(AppError::NotParticipant)
    ));
    assert!(matches!(
        h.gate.mark_read(outsider, conv.id).await,
        Err(AppError::NotParticipant)
    ));
    assert!(matches!(
        h.gate.send_message(a, Uuid::new_v4(), text("void")).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_locked_inbox_shows_count_and_capped_previews() {
    let h = harness(true).await;
    let man = h.add(Gender::Male, true, WealthStatus::None).await;

    let mut senders = Vec::new();
    for i in 0..7 {
        let woman = h.add(Gender::Female, true, WealthStatus::None).await;
        h.store
            .add_image(woman, format!("https://img.example/{i}.jpg"))
            .await;
        h.gate
            .create_conversation(woman, opener(man, &format!("message number {i}")))
            .await
            .unwrap();
        senders.push(woman);
    }

    let inbox = h.gate.get_inbox(man).await.unwrap();
    assert!(!inbox.can_view_all_messages);
    assert_eq!(inbox.locked_count, 7);
    assert!(inbox.conversations.is_empty());

    let previews = inbox.locked_previews.expect("locked previews");
    assert_eq!(previews.len(), LOCKED_PREVIEW_LIMIT);
    // Most recent first, content truncated.
    assert_eq!(previews[0].teaser, "message nu…");
    assert_eq!(previews[0].first_image.as_deref(), Some("https://img.example/6.jpg"));
    assert_eq!(previews[0].age, Some(30));
}

#[tokio::test]
async fn test_full_inbox_for_viewer_who_can_read() {
    let h = harness(true).await;
    let man = h.add(Gender::Male, true, WealthStatus::High).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    h.gate
        .create_conversation(woman, opener(man, "hello"))
        .await
        .unwrap();

    let inbox = h.gate.get_inbox(man).await.unwrap();
    assert!(inbox.can_view_all_messages);
    assert_eq!(inbox.locked_count, 0);
    assert!(inbox.locked_previews.is_none());
    assert_eq!(inbox.conversations.len(), 1);

    let entry = &inbox.conversations[0];
    assert_eq!(entry.unread_count, 1);
    assert_eq!(entry.other_user.as_ref().map(|u| u.user_id), Some(woman));
    assert_eq!(
        entry.last_message.as_ref().map(|m| m.content.as_str()),
        Some("hello")
    );
}

#[tokio::test]
async fn test_locked_viewer_cannot_open_history() {
    let h = harness(true).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::None).await;
    let conv = h
        .gate
        .create_conversation(woman, opener(man, "hi"))
        .await
        .unwrap()
        .conversation;

    let err = h.gate.get_messages(man, conv.id, None, None).await.unwrap_err();
    assert!(matches!(err, AppError::WealthStatusRequired));
    // Nothing was marked read.
    assert_eq!(h.gate.unread_count(man).await.unwrap(), 1);
}

#[tokio::test]
async fn test_history_is_newest_first_and_marks_read() {
    let h = harness(false).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::None).await;
    let conv = h
        .gate
        .create_conversation(woman, opener(man, "one"))
        .await
        .unwrap()
        .conversation;
    h.gate.send_message(woman, conv.id, text("two")).await.unwrap();
    h.gate.send_message(woman, conv.id, text("three")).await.unwrap();

    let mut woman_conn = h.hub.register(woman).await.unwrap();
    let history = h.gate.get_messages(man, conv.id, None, None).await.unwrap();
    let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["three", "two", "one"]);

    let receipts = drain(&mut woman_conn);
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0]["type"], "read_receipt");
    assert_eq!(receipts[0]["payload"]["count"], 3);
    assert_eq!(h.gate.unread_count(man).await.unwrap(), 0);

    let page = h
        .gate
        .get_messages(man, conv.id, Some(2), Some(1))
        .await
        .unwrap();
    let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["two", "one"]);
}

#[tokio::test]
async fn test_mark_read_is_idempotent_and_skips_own_messages() {
    let h = harness(false).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::None).await;
    let conv = h
        .gate
        .create_conversation(woman, opener(man, "hi"))
        .await
        .unwrap()
        .conversation;
    h.gate.send_message(man, conv.id, text("hello back")).await.unwrap();

    let mut man_conn = h.hub.register(man).await.unwrap();

    assert_eq!(h.gate.mark_read(woman, conv.id).await.unwrap(), 1);
    assert_eq!(h.gate.mark_read(woman, conv.id).await.unwrap(), 0);

    // Exactly one receipt: the second call changed nothing.
    let frames = drain(&mut man_conn);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["payload"]["reader_id"], woman.to_string());

    // The woman's own opener is still unread from the man's side.
    assert_eq!(h.gate.unread_count(man).await.unwrap(), 1);
}

#[tokio::test]
async fn test_typing_goes_only_to_the_other_participant() {
    let h = harness(false).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::None).await;
    let conv = h
        .gate
        .create_conversation(woman, opener(man, "hi"))
        .await
        .unwrap()
        .conversation;

    let mut woman_conn = h.hub.register(woman).await.unwrap();
    let mut man_conn = h.hub.register(man).await.unwrap();

    h.gate.relay_typing(woman, conv.id, true).await.unwrap();
    h.gate.relay_typing(woman, conv.id, false).await.unwrap();

    assert!(drain(&mut woman_conn).is_empty());
    let frames = drain(&mut man_conn);
    let kinds: Vec<_> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["typing", "stop_typing"]);
}

#[tokio::test]
async fn test_gender_rule_precedes_duplicate_check() {
    let h = harness(true).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let man = h.add(Gender::Male, true, WealthStatus::High).await;

    h.gate.create_conversation(woman, opener(man, "hi")).await.unwrap();

    let reply = h.gate.create_conversation(man, opener(woman, "hello")).await;
    assert!(matches!(reply, Err(AppError::MaleCannotInitiate)));
}

#[tokio::test]
async fn test_inbox_reports_other_user_online() {
    let h = harness(false).await;
    let woman = h.add(Gender::Female, true, WealthStatus::None).await;
    let online = h.add(Gender::Male, true, WealthStatus::None).await;
    let away = h.add(Gender::Male, true, WealthStatus::None).await;

    h.gate.create_conversation(woman, opener(away, "one")).await.unwrap();
    h.gate.create_conversation(woman, opener(online, "two")).await.unwrap();
    h.presence.set_online(online).await.unwrap();

    let inbox = h.gate.get_inbox(woman).await.unwrap();
    let flags: Vec<(Uuid, bool)> = inbox
        .conversations
        .iter()
        .map(|c| (c.other_user.as_ref().unwrap().user_id, c.other_user_online))
        .collect();
    assert_eq!(flags, vec![(online, true), (away, false)]);
}

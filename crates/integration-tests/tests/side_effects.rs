use std::sync::Arc;

use domains::{
    AppError, Collection, DocumentStore, Filter, MediaUpload, MockBroadcaster, MockEmailTransport,
    MockMediaStorage, NotificationKind,
};
use integration_tests::{arm, drain, events_named, Fault, World};
use services::events::{ANSWER_UPDATED, COMMENT_DELETED, COMMENT_UPDATED, NEW_COMMENT, QUESTIONS_ROOM};
use services::metrics::{Outcome, Step};
use services::{NewAnswer, NewQuestion, PageRequest, QuestionChanges, QuestionQuery};

fn png() -> MediaUpload {
    MediaUpload {
        bytes: bytes::Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        content_type: mime::IMAGE_PNG,
    }
}

#[tokio::test]
async fn a_dead_hub_and_mail_relay_do_not_fail_the_write() {
    let world = World::with_ports(|ports| {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_publish()
            .returning(|_, _, _| Err(AppError::Internal("hub down".into())));
        broadcaster
            .expect_publish_to_user()
            .returning(|_, _, _| Err(AppError::Internal("hub down".into())));
        let mut mailer = MockEmailTransport::new();
        mailer
            .expect_send()
            .returning(|_, _, _| Err(AppError::Internal("relay down".into())));
        ports.broadcaster = Arc::new(broadcaster);
        ports.mailer = Arc::new(mailer);
    });
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;

    let q = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Offline?".into(),
                description: "Is anyone there?".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let a = world
        .services
        .answers
        .post(
            &bob,
            q.id,
            NewAnswer {
                content: "Yes, @alice".into(),
                images: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(a.question_id, q.id);

    // the notification records stand even though nobody could be pushed or mailed
    assert_eq!(
        world
            .notifications_of_kind(alice.user_id, NotificationKind::Answer)
            .await
            .len(),
        1
    );
    assert_eq!(
        world
            .notifications_of_kind(alice.user_id, NotificationKind::Mention)
            .await
            .len(),
        1
    );
    assert!(world.metrics.count(Step::Broadcast, Outcome::Failed) >= 2);
    assert!(world.metrics.count(Step::Email, Outcome::Failed) >= 2);
    assert_eq!(world.metrics.count(Step::Email, Outcome::Ok), 0);
}

#[tokio::test]
async fn failed_image_uploads_are_dropped_not_fatal() {
    let world = World::with_ports(|ports| {
        let mut media = MockMediaStorage::new();
        media
            .expect_store()
            .times(2)
            .returning(|_| Err(AppError::Internal("disk full".into())));
        ports.media = Arc::new(media);
    });
    let alice = world.user("alice").await;

    let q = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Screenshots".into(),
                description: "See attached.".into(),
                tags: vec![],
                images: vec![png(), png()],
            },
        )
        .await
        .unwrap();

    assert!(q.images.is_empty());
    assert_eq!(q.description, "See attached.");
}

#[tokio::test]
async fn stored_images_are_embedded_in_the_content() {
    let world = World::new();
    let alice = world.user("alice").await;

    let q = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Diagram".into(),
                description: "Here:".into(),
                tags: vec![],
                images: vec![png()],
            },
        )
        .await
        .unwrap();

    assert_eq!(q.images, vec!["/media/1".to_string()]);
    assert!(q.description.contains("<img src=\"/media/1\""));
}

#[tokio::test]
async fn writes_invalidate_cached_reads() {
    let world = World::new();
    let alice = world.user("alice").await;
    let first = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "First".into(),
                description: "one".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listed = world
        .services
        .questions
        .list(QuestionQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    let cached = world.services.questions.get(first.id).await.unwrap();
    assert_eq!(cached.title, "First");

    world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Second".into(),
                description: "two".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    world
        .services
        .questions
        .update(
            &alice,
            first.id,
            QuestionChanges {
                title: Some("First, edited".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listed = world
        .services
        .questions
        .list(QuestionQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 2);
    assert_eq!(listed.items[0].title, "Second", "newest first");
    let fresh = world.services.questions.get(first.id).await.unwrap();
    assert_eq!(fresh.title, "First, edited");
}

#[tokio::test]
async fn pages_far_past_the_end_are_empty() {
    let world = World::new();
    let alice = world.user("alice").await;
    let q = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Paging".into(),
                description: "How far can I go?".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listed = world
        .services
        .questions
        .list(QuestionQuery {
            page: PageRequest {
                page: Some(usize::MAX),
                limit: None,
            },
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(listed.items.is_empty());
    assert_eq!(listed.total, 1);
    assert_eq!(listed.page, usize::MAX);

    let answers = world
        .services
        .answers
        .list(
            q.id,
            PageRequest {
                page: Some(usize::MAX),
                limit: Some(usize::MAX),
            },
        )
        .await
        .unwrap();
    assert!(answers.items.is_empty());
}

#[tokio::test]
async fn failure_notices_carry_the_user_facing_message() {
    let world = World::new();
    let alice = world.user("alice").await;

    let result = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "   ".into(),
                description: "no title".into(),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let notices = world
        .notifications_of_kind(alice.user_id, NotificationKind::Question)
        .await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].content, "Title is required");
    assert_eq!(world.metrics.count(Step::FailureNotice, Outcome::Ok), 1);
}

async fn answered(world: &World) -> (domains::Identity, domains::Identity, domains::Answer) {
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let q = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Flaky reads".into(),
                description: "What happens?".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let a = world
        .services
        .answers
        .post(
            &bob,
            q.id,
            NewAnswer {
                content: "It depends.".into(),
                images: vec![],
            },
        )
        .await
        .unwrap();
    (alice, bob, a)
}

#[tokio::test]
async fn a_posted_comment_succeeds_even_if_later_reads_fail() {
    let (world, switch) = World::with_fault(Fault::ReadsAfterWrite {
        written: Collection::Comments,
        read: Collection::Questions,
    });
    let (alice, bob, a) = answered(&world).await;
    let mut room = world.listen(QUESTIONS_ROOM);
    arm(&switch);

    let c = world
        .services
        .comments
        .post(&alice, a.id, "Depends on what?".into())
        .await
        .unwrap();

    let stored = world
        .store
        .count(Collection::Comments, &Filter::new())
        .await
        .unwrap();
    assert_eq!(stored, 1);
    let posted = events_named(&drain(&mut room), NEW_COMMENT);
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].data["comment"]["id"], c.id.to_string());
    assert_eq!(
        world
            .notifications_of_kind(bob.user_id, NotificationKind::Comment)
            .await
            .len(),
        1
    );
    assert_eq!(world.metrics.count(Step::FailureNotice, Outcome::Ok), 0);
}

#[tokio::test]
async fn a_comment_edit_succeeds_even_if_later_reads_fail() {
    let (world, switch) = World::with_fault(Fault::ReadsAfterWrite {
        written: Collection::Comments,
        read: Collection::Answers,
    });
    let (alice, _bob, a) = answered(&world).await;
    let c = world
        .services
        .comments
        .post(&alice, a.id, "first".into())
        .await
        .unwrap();
    let mut room = world.listen(QUESTIONS_ROOM);
    arm(&switch);

    let edited = world
        .services
        .comments
        .update(&alice, c.id, "second".into())
        .await
        .unwrap();
    assert_eq!(edited.content, "second");
    let withdrawn = world.services.comments.delete(&alice, c.id).await;
    // the edit tripped the fault, so the withdrawal cannot resolve its answer up front
    assert!(matches!(withdrawn, Err(AppError::Internal(_))));
    let still_there = world.store.get_by_id(Collection::Comments, c.id).await.unwrap();
    assert_eq!(still_there["isDeleted"], false);

    let messages = drain(&mut room);
    assert_eq!(events_named(&messages, COMMENT_UPDATED).len(), 1);
    assert!(events_named(&messages, COMMENT_DELETED).is_empty());
}

#[tokio::test]
async fn a_withdrawn_comment_succeeds_even_if_later_reads_fail() {
    let (world, switch) = World::with_fault(Fault::ReadsAfterWrite {
        written: Collection::Comments,
        read: Collection::Answers,
    });
    let (alice, _bob, a) = answered(&world).await;
    let c = world
        .services
        .comments
        .post(&alice, a.id, "never mind".into())
        .await
        .unwrap();
    let mut room = world.listen(QUESTIONS_ROOM);
    arm(&switch);

    let withdrawn = world.services.comments.delete(&alice, c.id).await.unwrap();
    assert!(withdrawn.is_deleted);
    assert_eq!(events_named(&drain(&mut room), COMMENT_DELETED).len(), 1);
}

#[tokio::test]
async fn an_answer_edit_succeeds_even_if_later_reads_fail() {
    let (world, switch) = World::with_fault(Fault::ReadsAfterWrite {
        written: Collection::Answers,
        read: Collection::Questions,
    });
    let (alice, bob, a) = answered(&world).await;
    let mut room = world.listen(QUESTIONS_ROOM);
    arm(&switch);

    let edited = world
        .services
        .answers
        .update(&bob, a.id, "It depends, @alice.".into())
        .await
        .unwrap();
    assert_eq!(edited.mentions, vec![alice.user_id]);
    assert_eq!(events_named(&drain(&mut room), ANSWER_UPDATED).len(), 1);
    assert_eq!(
        world
            .notifications_of_kind(alice.user_id, NotificationKind::Mention)
            .await
            .len(),
        1
    );
}

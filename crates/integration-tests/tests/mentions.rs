use domains::NotificationKind;
use integration_tests::{email_of, World};
use services::{NewAnswer, NewQuestion};

#[tokio::test]
async fn repeated_and_unknown_mentions_resolve_once_in_order() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let carol = world.user("carol").await;

    let q = world
        .services
        .questions
        .ask(
            &carol,
            NewQuestion {
                title: "Who knows pinning?".into(),
                description: "hello @alice and @bob, also @alice again and @ghost".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(q.mentions, vec![alice.user_id, bob.user_id]);
    for user in [&alice, &bob] {
        let notices = world
            .notifications_of_kind(user.user_id, NotificationKind::Mention)
            .await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].related_id, Some(q.id));
    }
}

#[tokio::test]
async fn mentions_match_usernames_case_insensitively() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;

    let q = world
        .services
        .questions
        .ask(
            &bob,
            NewQuestion {
                title: "Shouting".into(),
                description: "ping @ALICE".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(q.mentions, vec![alice.user_id]);
}

#[tokio::test]
async fn comment_mentions_notify_by_username() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let carol = world.user("carol").await;
    let q = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Traits".into(),
                description: "dyn or impl?".into(),
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
                content: "impl, mostly".into(),
                images: vec![],
            },
        )
        .await
        .unwrap();

    let c = world
        .services
        .comments
        .post(&alice, a.id, "@carol what do you think?".into())
        .await
        .unwrap();
    assert_eq!(c.mentions, vec![carol.user_id]);

    let notices = world
        .notifications_of_kind(carol.user_id, NotificationKind::Mention)
        .await;
    assert_eq!(notices.len(), 1);
    assert!(world
        .mailer
        .sent_to(&email_of("carol"))
        .iter()
        .any(|s| s == "You were mentioned on askboard"));

    // bob hears about the comment on his answer, not as a mention
    assert_eq!(
        world
            .notifications_of_kind(bob.user_id, NotificationKind::Comment)
            .await
            .len(),
        1
    );
    assert!(world
        .notifications_of_kind(bob.user_id, NotificationKind::Mention)
        .await
        .is_empty());
}

#[tokio::test]
async fn mentioning_yourself_notifies_nobody() {
    let world = World::new();
    let alice = world.user("alice").await;

    world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Note to self".into(),
                description: "@alice remember this".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(world
        .notifications_of_kind(alice.user_id, NotificationKind::Mention)
        .await
        .is_empty());
    assert!(!world
        .mailer
        .sent_to(&email_of("alice"))
        .iter()
        .any(|s| s == "You were mentioned on askboard"));
}

#[tokio::test]
async fn edits_only_notify_newly_mentioned_users() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let carol = world.user("carol").await;
    let q = world
        .services
        .questions
        .ask(
            &alice,
            NewQuestion {
                title: "Edits".into(),
                description: "first draft".into(),
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
                content: "cc @carol".into(),
                images: vec![],
            },
        )
        .await
        .unwrap();

    world
        .services
        .answers
        .update(&bob, a.id, "cc @carol and @alice".into())
        .await
        .unwrap();

    assert_eq!(
        world
            .notifications_of_kind(carol.user_id, NotificationKind::Mention)
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
}

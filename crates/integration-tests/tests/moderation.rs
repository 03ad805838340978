use domains::{
    AppError, Collection, DocumentStore, NotificationKind, QuestionStatus, Role, VoteChoice,
};
use integration_tests::{drain, email_of, events_named, World};
use services::events::{COMMENT_DELETED, NOTIFICATION, QUESTIONS_ROOM, QUESTION_MODERATED};
use services::{NewAnswer, NewQuestion, PageRequest, QuestionQuery};

fn question(title: &str) -> NewQuestion {
    NewQuestion {
        title: title.into(),
        description: "Some details.".into(),
        ..Default::default()
    }
}

fn answer(content: &str) -> NewAnswer {
    NewAnswer {
        content: content.into(),
        images: vec![],
    }
}

#[tokio::test]
async fn moderated_deletion_hides_a_question_from_the_listing_only() {
    let world = World::new();
    let root = world.admin("root").await;
    let alice = world.user("alice").await;
    let mut room = world.listen(QUESTIONS_ROOM);

    let q = world
        .services
        .questions
        .ask(&alice, question("Spam?"))
        .await
        .unwrap();
    let listed = world
        .services
        .questions
        .list(QuestionQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 1);

    let moderated = world
        .services
        .moderation
        .set_question_status(&root, q.id, QuestionStatus::Deleted)
        .await
        .unwrap();
    assert_eq!(moderated.status, QuestionStatus::Deleted);

    let listed = world
        .services
        .questions
        .list(QuestionQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 0, "the listing cache was invalidated");
    let fetched = world.services.questions.get(q.id).await.unwrap();
    assert_eq!(fetched.status, QuestionStatus::Deleted);

    let events = events_named(&drain(&mut room), QUESTION_MODERATED);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["questionId"], q.id.to_string());

    let notices = world
        .notifications_of_kind(alice.user_id, NotificationKind::Admin)
        .await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].related_id, Some(q.id));
    assert!(world
        .mailer
        .sent_to(&email_of("alice"))
        .iter()
        .any(|s| s == "Your question was moderated"));

    let again = world
        .services
        .moderation
        .set_question_status(&root, q.id, QuestionStatus::Deleted)
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn admin_comment_removal_is_a_hard_delete() {
    let world = World::new();
    let root = world.admin("root").await;
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let q = world
        .services
        .questions
        .ask(&alice, question("Lifetimes"))
        .await
        .unwrap();
    let a = world
        .services
        .answers
        .post(&bob, q.id, answer("'static"))
        .await
        .unwrap();
    let c = world
        .services
        .comments
        .post(&alice, a.id, "rude remark".into())
        .await
        .unwrap();
    let mut room = world.listen(QUESTIONS_ROOM);

    world
        .services
        .moderation
        .delete_comment(&root, c.id)
        .await
        .unwrap();

    let gone = world.store.get_by_id(Collection::Comments, c.id).await;
    assert!(matches!(gone, Err(AppError::NotFound { .. })));

    let deleted = events_named(&drain(&mut room), COMMENT_DELETED);
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].data["questionId"], q.id.to_string());
    assert_eq!(deleted[0].data["commentId"], c.id.to_string());

    let notices = world
        .notifications_of_kind(alice.user_id, NotificationKind::Admin)
        .await;
    assert_eq!(notices.len(), 1);

    let listed = world
        .services
        .comments
        .list(a.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 0);
}

#[tokio::test]
async fn admin_answer_removal_cascades() {
    let world = World::new();
    let root = world.admin("root").await;
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let q = world
        .services
        .questions
        .ask(&alice, question("Cascade"))
        .await
        .unwrap();
    let a = world
        .services
        .answers
        .post(&bob, q.id, answer("drop it"))
        .await
        .unwrap();
    let c = world
        .services
        .comments
        .post(&alice, a.id, "really?".into())
        .await
        .unwrap();
    world
        .services
        .votes
        .vote(&alice, a.id, VoteChoice::Downvote)
        .await
        .unwrap();

    world
        .services
        .moderation
        .delete_answer(&root, a.id)
        .await
        .unwrap();

    for (collection, id) in [(Collection::Answers, a.id), (Collection::Comments, c.id)] {
        let gone = world.store.get_by_id(collection, id).await;
        assert!(matches!(gone, Err(AppError::NotFound { .. })), "{collection:?} survived");
    }
    let votes_left = world
        .store
        .count(
            Collection::Votes,
            &domains::Filter::new().eq("answerId", a.id.to_string()),
        )
        .await
        .unwrap();
    assert_eq!(votes_left, 0);

    let bob_admin_notices = world
        .notifications_of_kind(bob.user_id, NotificationKind::Admin)
        .await;
    assert_eq!(bob_admin_notices.len(), 1);
}

#[tokio::test]
async fn owner_comment_withdrawal_is_soft() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let q = world
        .services
        .questions
        .ask(&alice, question("Soft comment"))
        .await
        .unwrap();
    let a = world
        .services
        .answers
        .post(&bob, q.id, answer("yes"))
        .await
        .unwrap();
    let c = world
        .services
        .comments
        .post(&alice, a.id, "thanks".into())
        .await
        .unwrap();

    let forbidden = world.services.comments.delete(&bob, c.id).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let withdrawn = world.services.comments.delete(&alice, c.id).await.unwrap();
    assert!(withdrawn.is_deleted);
    assert!(world.store.get_by_id(Collection::Comments, c.id).await.is_ok());
}

#[tokio::test]
async fn announcements_reach_every_listener() {
    let world = World::new();
    let root = world.admin("root").await;
    let alice = world.user("alice").await;
    let mut room = world.listen(QUESTIONS_ROOM);

    let denied = world
        .services
        .moderation
        .announce(&alice, "I am in charge now".into())
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let notice = world
        .services
        .moderation
        .announce(&root, "Maintenance at noon".into())
        .await
        .unwrap();
    assert_eq!(notice.user_id, None);

    let pushed = events_named(&drain(&mut room), NOTIFICATION);
    assert_eq!(pushed.len(), 1);
    assert!(pushed[0].data["userId"].is_null());
    assert_eq!(pushed[0].data["content"], "Maintenance at noon");

    let blank = world
        .services
        .moderation
        .announce(&root, "   ".into())
        .await;
    assert!(matches!(blank, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn roles_change_only_through_admins() {
    let world = World::new();
    let root = world.admin("root").await;
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;

    let denied = world
        .services
        .moderation
        .set_role(&alice, bob.user_id, Role::Admin)
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let unchanged = world
        .services
        .moderation
        .set_role(&root, bob.user_id, Role::User)
        .await;
    assert!(matches!(unchanged, Err(AppError::Conflict(_))));

    let promoted = world
        .services
        .moderation
        .set_role(&root, bob.user_id, Role::Admin)
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Admin);
    assert!(world
        .mailer
        .sent_to(&email_of("bob"))
        .iter()
        .any(|s| s == "Your askboard role changed"));

    let own = world
        .services
        .moderation
        .set_role(&root, root.user_id, Role::User)
        .await;
    assert!(matches!(own, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn user_listing_is_admin_only_and_oldest_first() {
    let world = World::new();
    let root = world.admin("root").await;
    let alice = world.user("alice").await;
    world.user("bob").await;

    let denied = world
        .services
        .moderation
        .list_users(&alice, PageRequest::default())
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let users = world
        .services
        .moderation
        .list_users(&root, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(users.total, 3);
    let names: Vec<_> = users.items.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["root", "alice", "bob"]);
}

use std::collections::HashSet;

use domains::{
    AppError, Answer, Collection, DocumentStore, Filter, FindOptions, Identity, NotificationKind,
    Vote, VoteChoice, VoteType,
};
use integration_tests::{arm, drain, events_named, Fault, World};
use services::events::{QUESTIONS_ROOM, VOTE_UPDATE};
use services::{NewAnswer, NewQuestion};
use uuid::Uuid;

async fn answered(world: &World, asker: &Identity, helper: &Identity) -> Answer {
    let q = world
        .services
        .questions
        .ask(
            asker,
            NewQuestion {
                title: "Is Pin scary?".into(),
                description: "It looks scary.".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    world
        .services
        .answers
        .post(
            helper,
            q.id,
            NewAnswer {
                content: "Only a little.".into(),
                images: vec![],
            },
        )
        .await
        .unwrap()
}

async fn stored_answer(world: &World, id: Uuid) -> Answer {
    let doc = world.store.get_by_id(Collection::Answers, id).await.unwrap();
    serde_json::from_value(doc).unwrap()
}

async fn votes_on(world: &World, answer_id: Uuid) -> Vec<Vote> {
    world
        .store
        .find(
            Collection::Votes,
            &Filter::new().eq("answerId", answer_id.to_string()),
            &FindOptions::default(),
        )
        .await
        .unwrap()
        .into_iter()
        .map(|doc| serde_json::from_value(doc).unwrap())
        .collect()
}

/// Voter sets are disjoint and mirror the vote records exactly.
async fn assert_consistent(world: &World, answer_id: Uuid) {
    let answer = stored_answer(world, answer_id).await;
    let up: HashSet<Uuid> = answer.upvotes.iter().copied().collect();
    let down: HashSet<Uuid> = answer.downvotes.iter().copied().collect();
    assert!(up.is_disjoint(&down), "voter sets overlap");
    assert_eq!(up.len(), answer.upvotes.len(), "duplicate upvoter");
    assert_eq!(down.len(), answer.downvotes.len(), "duplicate downvoter");

    let votes = votes_on(world, answer_id).await;
    let recorded_up: HashSet<Uuid> = votes
        .iter()
        .filter(|v| v.vote_type == VoteType::Upvote)
        .map(|v| v.user_id)
        .collect();
    let recorded_down: HashSet<Uuid> = votes
        .iter()
        .filter(|v| v.vote_type == VoteType::Downvote)
        .map(|v| v.user_id)
        .collect();
    assert_eq!(votes.len(), recorded_up.len() + recorded_down.len(), "one record per voter");
    assert_eq!(up, recorded_up);
    assert_eq!(down, recorded_down);
}

#[tokio::test]
async fn switching_votes_keeps_sets_and_records_in_step() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let a = answered(&world, &alice, &bob).await;
    let votes = &world.services.votes;

    let tally = votes.vote(&alice, a.id, VoteChoice::Upvote).await.unwrap();
    assert_eq!((tally.upvotes, tally.downvotes), (1, 0));
    assert_eq!(tally.my_vote, Some(VoteType::Upvote));
    assert_consistent(&world, a.id).await;

    let tally = votes.vote(&alice, a.id, VoteChoice::Downvote).await.unwrap();
    assert_eq!((tally.upvotes, tally.downvotes), (0, 1));
    assert_consistent(&world, a.id).await;

    let tally = votes.vote(&alice, a.id, VoteChoice::NoVote).await.unwrap();
    assert_eq!((tally.upvotes, tally.downvotes), (0, 0));
    assert_eq!(tally.my_vote, None);
    assert_consistent(&world, a.id).await;
    assert!(votes_on(&world, a.id).await.is_empty());
}

#[tokio::test]
async fn repeating_a_vote_is_a_conflict_and_changes_nothing() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let a = answered(&world, &alice, &bob).await;

    world
        .services
        .votes
        .vote(&alice, a.id, VoteChoice::Upvote)
        .await
        .unwrap();
    let before = stored_answer(&world, a.id).await;
    let vote_notices_before = world
        .notifications_of_kind(bob.user_id, NotificationKind::Vote)
        .await
        .len();

    let again = world.services.votes.vote(&alice, a.id, VoteChoice::Upvote).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    assert_eq!(stored_answer(&world, a.id).await, before);
    assert_eq!(votes_on(&world, a.id).await.len(), 1);
    assert_eq!(
        world
            .notifications_of_kind(bob.user_id, NotificationKind::Vote)
            .await
            .len(),
        vote_notices_before
    );
}

#[tokio::test]
async fn no_vote_without_a_vote_is_a_quiet_no_op() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let a = answered(&world, &alice, &bob).await;
    let mut room = world.listen(QUESTIONS_ROOM);

    let tally = world
        .services
        .votes
        .vote(&alice, a.id, VoteChoice::NoVote)
        .await
        .unwrap();
    assert_eq!((tally.upvotes, tally.downvotes, tally.my_vote), (0, 0, None));
    assert!(votes_on(&world, a.id).await.is_empty());
    assert!(events_named(&drain(&mut room), VOTE_UPDATE).is_empty());
}

#[tokio::test]
async fn vote_updates_broadcast_counts_and_notify_the_author() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let a = answered(&world, &alice, &bob).await;
    let mut room = world.listen(QUESTIONS_ROOM);

    world
        .services
        .votes
        .vote(&alice, a.id, VoteChoice::Upvote)
        .await
        .unwrap();

    let updates = events_named(&drain(&mut room), VOTE_UPDATE);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].data["answerId"], a.id.to_string());
    assert_eq!(updates[0].data["upvotes"], 1);
    assert_eq!(updates[0].data["downvotes"], 0);

    let notices = world
        .notifications_of_kind(bob.user_id, NotificationKind::Vote)
        .await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].related_id, Some(a.id));
}

#[tokio::test]
async fn authors_cannot_vote_on_their_own_answers() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let a = answered(&world, &alice, &bob).await;

    let result = world.services.votes.vote(&bob, a.id, VoteChoice::Upvote).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert!(votes_on(&world, a.id).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_opposite_votes_from_two_users_both_land() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let carol = world.user("carol").await;
    let a = answered(&world, &alice, &bob).await;

    let up = {
        let votes = world.services.votes.clone();
        let voter = alice.clone();
        tokio::spawn(async move { votes.vote(&voter, a.id, VoteChoice::Upvote).await })
    };
    let down = {
        let votes = world.services.votes.clone();
        let voter = carol.clone();
        tokio::spawn(async move { votes.vote(&voter, a.id, VoteChoice::Downvote).await })
    };
    up.await.unwrap().unwrap();
    down.await.unwrap().unwrap();

    let answer = stored_answer(&world, a.id).await;
    assert_eq!(answer.upvotes, vec![alice.user_id]);
    assert_eq!(answer.downvotes, vec![carol.user_id]);
    assert_consistent(&world, a.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_voters_are_all_counted() {
    let world = World::new();
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let a = answered(&world, &alice, &bob).await;

    let mut voters = Vec::new();
    for i in 0..12 {
        voters.push(world.user(&format!("voter{i}")).await);
    }
    let handles: Vec<_> = voters
        .iter()
        .enumerate()
        .map(|(i, voter)| {
            let votes = world.services.votes.clone();
            let voter = voter.clone();
            let choice = if i % 3 == 0 {
                VoteChoice::Downvote
            } else {
                VoteChoice::Upvote
            };
            tokio::spawn(async move { votes.vote(&voter, a.id, choice).await })
        })
        .collect();
    for result in futures_util::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    let answer = stored_answer(&world, a.id).await;
    assert_eq!(answer.upvotes.len(), 8);
    assert_eq!(answer.downvotes.len(), 4);
    assert_consistent(&world, a.id).await;
}

#[tokio::test]
async fn a_failed_voter_set_patch_rolls_the_record_back() {
    let (world, switch) = World::with_fault(Fault::Updates(Collection::Answers));
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let carol = world.user("carol").await;
    let a = answered(&world, &alice, &bob).await;
    world
        .services
        .votes
        .vote(&carol, a.id, VoteChoice::Upvote)
        .await
        .unwrap();
    arm(&switch);

    // cast: the fresh record is removed again
    let cast = world.services.votes.vote(&alice, a.id, VoteChoice::Upvote).await;
    assert!(matches!(cast, Err(AppError::Internal(_))));
    assert_consistent(&world, a.id).await;

    // replace: the record keeps its old direction
    let replace = world.services.votes.vote(&carol, a.id, VoteChoice::Downvote).await;
    assert!(matches!(replace, Err(AppError::Internal(_))));
    assert_consistent(&world, a.id).await;

    // remove: the deleted record is restored
    let remove = world.services.votes.vote(&carol, a.id, VoteChoice::NoVote).await;
    assert!(matches!(remove, Err(AppError::Internal(_))));
    assert_consistent(&world, a.id).await;

    let votes = votes_on(&world, a.id).await;
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].user_id, carol.user_id);
    assert_eq!(votes[0].vote_type, VoteType::Upvote);
    assert_eq!(stored_answer(&world, a.id).await.upvotes, vec![carol.user_id]);
}

#[tokio::test]
async fn votes_on_a_removed_answer_leave_no_record() {
    let world = World::new();
    let root = world.admin("root").await;
    let alice = world.user("alice").await;
    let bob = world.user("bob").await;
    let a = answered(&world, &alice, &bob).await;

    world
        .services
        .moderation
        .delete_answer(&root, a.id)
        .await
        .unwrap();
    let late = world.services.votes.vote(&alice, a.id, VoteChoice::Upvote).await;
    assert!(matches!(late, Err(AppError::NotFound { .. })));
    assert!(votes_on(&world, a.id).await.is_empty());
}

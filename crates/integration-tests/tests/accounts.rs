use std::sync::Arc;

use domains::{AppError, Collection, DocumentStore, Filter, MockTokenService};
use integration_tests::{World, PASSWORD};
use services::Registration;

fn registration(name: &str, email: &str, username: Option<&str>) -> Registration {
    Registration {
        name: name.into(),
        email: email.into(),
        username: username.map(Into::into),
        password: PASSWORD.into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_registrations_cannot_share_an_email() {
    let world = World::new();

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let users = world.services.users.clone();
            let input = registration(
                &format!("Racer {i}"),
                "same@example.com",
                Some(&format!("racer{i}")),
            );
            tokio::spawn(async move { users.register(input).await })
        })
        .collect();

    let mut registered = 0;
    for result in futures_util::future::join_all(attempts).await {
        match result.unwrap() {
            Ok(_) => registered += 1,
            Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected registration error: {other:?}"),
        }
    }
    assert_eq!(registered, 1);
    let stored = world
        .store
        .count(
            Collection::Users,
            &Filter::new().eq("email", "same@example.com"),
        )
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_registrations_cannot_share_a_username() {
    let world = World::new();

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let users = world.services.users.clone();
            let input = registration("Same", &format!("same{i}@example.com"), Some("same"));
            tokio::spawn(async move { users.register(input).await })
        })
        .collect();

    let results = futures_util::future::join_all(attempts).await;
    let registered = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert_eq!(registered, 1);
    let stored = world
        .store
        .count(Collection::Users, &Filter::new().eq("username", "same"))
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn registration_stores_nothing_when_no_token_can_be_issued() {
    let world = World::with_ports(|ports| {
        let mut tokens = MockTokenService::new();
        tokens
            .expect_issue()
            .returning(|_| Err(AppError::Internal("signing key unavailable".into())));
        ports.tokens = Arc::new(tokens);
    });

    let result = world
        .services
        .users
        .register(registration("Dana", "dana@example.com", None))
        .await;
    assert!(matches!(result, Err(AppError::Internal(_))));
    assert_eq!(
        world
            .store
            .count(Collection::Users, &Filter::new())
            .await
            .unwrap(),
        0
    );
    assert!(world.mailer.sent().is_empty());
}

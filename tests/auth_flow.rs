//! Challenge/response login, registration and session revocation through
//! the service.

mod common;

use common::{TestWallet, harness};
use voteauth::error::{AuthError, Error};
use voteauth::roles::Role;
use voteauth::service::UserState;

#[tokio::test]
async fn login_register_and_update() {
    let h = harness().await;
    let alice = TestWallet::dev(1);

    assert_eq!(h.service.user_state(None).await.unwrap(), UserState::Unverified);

    let token = h.login(&alice).await;
    assert_eq!(h.service.authenticate(&token).await.unwrap(), alice.address);
    assert_eq!(
        h.service.user_state(Some(&token)).await.unwrap(),
        UserState::Verified {
            wallet: alice.address.clone()
        }
    );

    // A fresh signature holder is void: enough to register, not to update.
    h.service
        .check_authorization(&token, Role::Void)
        .await
        .unwrap();
    assert!(matches!(
        h.service.check_authorization(&token, Role::User).await,
        Err(Error::Auth(AuthError::Forbidden { .. }))
    ));

    h.service
        .register_user(&alice.address, " alice@example.com ", "Alice")
        .await
        .unwrap();
    h.service
        .check_authorization(&token, Role::User)
        .await
        .unwrap();

    h.service
        .update_display_name(&alice.address, "Alice Liddell")
        .await
        .unwrap();
    match h.service.user_state(Some(&token)).await.unwrap() {
        UserState::Registered { user } => {
            assert_eq!(user.display_name, "Alice Liddell");
            assert_eq!(user.role, "user");
        }
        other => panic!("expected registered, got {other:?}"),
    }

    let info = h
        .service
        .user_info(&[alice.address.clone(), TestWallet::dev(2).address])
        .await
        .unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].wallet, alice.address);
}

#[tokio::test]
async fn challenge_is_single_use() {
    let h = harness().await;
    let alice = TestWallet::dev(1);

    let nonce = h.service.issue_challenge(&alice.address);
    let signature = alice.sign(&nonce);
    h.service
        .verify_challenge_and_issue_session(&alice.address, &signature)
        .await
        .unwrap();

    let replay = h
        .service
        .verify_challenge_and_issue_session(&alice.address, &signature)
        .await;
    assert!(matches!(
        replay,
        Err(Error::Auth(AuthError::ChallengeNotFound { .. }))
    ));
}

#[tokio::test]
async fn failed_verification_consumes_the_challenge() {
    let h = harness().await;
    let alice = TestWallet::dev(1);
    let mallory = TestWallet::dev(2);

    let nonce = h.service.issue_challenge(&alice.address);
    let forged = mallory.sign(&nonce);
    assert!(matches!(
        h.service
            .verify_challenge_and_issue_session(&alice.address, &forged)
            .await,
        Err(Error::Auth(AuthError::SignatureMismatch))
    ));

    // Alice's genuine signature over the old nonce is now useless.
    assert!(matches!(
        h.service
            .verify_challenge_and_issue_session(&alice.address, &alice.sign(&nonce))
            .await,
        Err(Error::Auth(AuthError::ChallengeNotFound { .. }))
    ));
}

#[tokio::test]
async fn reissued_challenge_replaces_the_previous_one() {
    let h = harness().await;
    let alice = TestWallet::dev(1);

    let first = h.service.issue_challenge(&alice.address);
    let second = h.service.issue_challenge(&alice.address);
    assert_ne!(first, second);

    assert!(matches!(
        h.service
            .verify_challenge_and_issue_session(&alice.address, &alice.sign(&first))
            .await,
        Err(Error::Auth(AuthError::SignatureMismatch))
    ));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let h = harness().await;
    let alice = TestWallet::dev(1);
    h.register(&alice, "alice").await;

    let err = h
        .service
        .register_user(&alice.address, "other@example.com", "Other")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let err = h
        .service
        .register_user(&TestWallet::dev(2).address, "not-an-email", "Bob")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn rotating_the_epoch_revokes_every_token() {
    let h = harness().await;
    let alice = TestWallet::dev(1);
    let bob = TestWallet::dev(2);
    let alice_token = h.login(&alice).await;
    let bob_token = h.login(&bob).await;

    h.service.rotate_session_epoch().await.unwrap();

    for token in [&alice_token, &bob_token] {
        assert!(matches!(
            h.service.authenticate(token).await,
            Err(Error::Auth(AuthError::EpochMismatch))
        ));
        assert_eq!(
            h.service.user_state(Some(token)).await.unwrap(),
            UserState::Unverified
        );
    }

    // New logins work under the new epoch.
    let fresh = h.login(&alice).await;
    assert_eq!(h.service.authenticate(&fresh).await.unwrap(), alice.address);
}

#[tokio::test]
async fn garbage_token_is_unauthenticated() {
    let h = harness().await;
    let err = h.service.authenticate("not.a.token").await.unwrap_err();
    assert_eq!(err.to_error_payload().code, "auth.unauthenticated");
}

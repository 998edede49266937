mod common;

use bytes::Bytes;
use common::Harness;
use serde_json::json;
use songbird::{
    bus::{BridgeError, subjects},
    models::user::{AuthReply, RegisterReply, User},
    services::{
        auth_service::{ALREADY_REGISTERED, AUTHENTICATED, BAD_CREDENTIALS, NOT_REGISTERED},
        users_service::{REGISTERED, hash_password},
    },
};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

fn remote_message(err: BridgeError) -> String {
    match err {
        BridgeError::Remote { message, .. } => message,
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn register_then_authenticate_reuses_the_token() {
    let h = Harness::start().await;
    let creds = json!({ "username": "alice", "password": "secret" });

    let registered: RegisterReply = h
        .ctx
        .bridge
        .call_json(subjects::AUTH_REGISTER, &creds, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(registered.status, REGISTERED);
    assert!(!registered.user_id.is_empty());

    let issued = h.ctx.sessions.get("alice").await.unwrap().unwrap();

    let first: AuthReply = h
        .ctx
        .bridge
        .call_json(subjects::AUTH_AUTHENTICATE, &creds, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(first.status, AUTHENTICATED);
    assert_eq!(first.token, issued.token);

    let second: AuthReply = h
        .ctx
        .bridge
        .call_json(subjects::AUTH_AUTHENTICATE, &creds, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(second.token, first.token);
}

#[tokio::test]
async fn duplicate_registration_is_refused() {
    let h = Harness::start().await;
    let creds = json!({ "username": "bob", "password": "pw" });
    let _: RegisterReply = h
        .ctx
        .bridge
        .call_json(subjects::AUTH_REGISTER, &creds, TIMEOUT)
        .await
        .unwrap();

    let err = h
        .ctx
        .bridge
        .call_json::<_, RegisterReply>(subjects::AUTH_REGISTER, &creds, TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(remote_message(err), ALREADY_REGISTERED);
}

#[tokio::test]
async fn authentication_failures_are_distinguished() {
    let h = Harness::start().await;
    let bridge = &h.ctx.bridge;

    let err = bridge
        .call_json::<_, AuthReply>(
            subjects::AUTH_AUTHENTICATE,
            &json!({ "username": "nobody", "password": "x" }),
            TIMEOUT,
        )
        .await
        .unwrap_err();
    assert_eq!(remote_message(err), NOT_REGISTERED);

    let _: RegisterReply = bridge
        .call_json(
            subjects::AUTH_REGISTER,
            &json!({ "username": "carol", "password": "right" }),
            TIMEOUT,
        )
        .await
        .unwrap();
    let err = bridge
        .call_json::<_, AuthReply>(
            subjects::AUTH_AUTHENTICATE,
            &json!({ "username": "carol", "password": "wrong" }),
            TIMEOUT,
        )
        .await
        .unwrap_err();
    assert_eq!(remote_message(err), BAD_CREDENTIALS);

    let reply = bridge
        .call(subjects::AUTH_AUTHENTICATE, Bytes::from_static(b"{oops"), TIMEOUT)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&reply).contains("Invalid data"));
}

#[tokio::test]
async fn users_get_answers_false_for_unknown_names() {
    let h = Harness::start().await;
    let bridge = &h.ctx.bridge;

    let reply = bridge
        .call(subjects::USERS_GET, Bytes::from_static(b"dave"), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(&reply[..], b"false");

    let _: RegisterReply = bridge
        .call_json(
            subjects::USERS_REGISTER,
            &json!({ "username": "dave", "password": "pw" }),
            TIMEOUT,
        )
        .await
        .unwrap();
    let user: User = bridge
        .call_decoded(subjects::USERS_GET, Bytes::from_static(b"dave"), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(user.username, "dave");
    assert_eq!(user.password, hash_password("pw"));
}

mod common;

use chrono::Duration;
use serde_json::json;

use common::{payload, Harness};
use entity_tokens::clock::Clock;
use entity_tokens::{Expiry, OwnerId, OwnerRef, TokenOptions};

#[tokio::test]
async fn test_find_token() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(&h.company, "INVITE_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    assert_eq!(token.driver(), "stateless");

    let found = h.service.find(token.secret()).await.unwrap().unwrap();
    assert_eq!(found.id(), token.id());
    assert_eq!(found, token);

    assert!(h.service.find("nonexistentToken").await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_token_by_type() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(&h.company, "INVITE_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    let found = h
        .service
        .query()
        .where_type("INVITE_TOKEN")
        .find(token.secret())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), token.id());

    let not_found = h
        .service
        .query()
        .where_type("INVALID_TYPE")
        .find(token.secret())
        .await
        .unwrap();
    assert!(not_found.is_none());
}

#[tokio::test]
async fn test_find_token_by_owner_type() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(&h.company, "INVITE_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    let found = h
        .service
        .query()
        .where_owner_type("Company")
        .find(token.secret())
        .await
        .unwrap();
    assert_eq!(found.unwrap().id(), token.id());

    let not_found = h
        .service
        .query()
        .where_owner_type("Project")
        .find(token.secret())
        .await
        .unwrap();
    assert!(not_found.is_none());
}

#[tokio::test]
async fn test_find_token_by_owner() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(&h.company, "INVITE_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    let found = h
        .service
        .query()
        .where_owner_of(&h.company)
        .find(token.secret())
        .await
        .unwrap();
    assert_eq!(found.unwrap().id(), token.id());

    let not_found = h
        .service
        .query()
        .where_owner_of(&h.project1)
        .find(token.secret())
        .await
        .unwrap();
    assert!(not_found.is_none());
}

#[tokio::test]
async fn test_find_token_by_payload() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(
            &h.company,
            "INVITE_TOKEN",
            TokenOptions::new().payload(payload(json!({"role": "admin"}))),
        )
        .await
        .unwrap();

    let found = h
        .service
        .query()
        .where_payload(payload(json!({"role": "admin"})))
        .find(token.secret())
        .await
        .unwrap();
    assert_eq!(found.unwrap().id(), token.id());

    let not_found = h
        .service
        .query()
        .where_payload(payload(json!({"role": "user"})))
        .find(token.secret())
        .await
        .unwrap();
    assert!(not_found.is_none());
}

#[tokio::test]
async fn test_find_token_by_multiple_criteria() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(
            &h.company,
            "INVITE_TOKEN",
            TokenOptions::new().payload(payload(json!({"role": "admin"}))),
        )
        .await
        .unwrap();

    let found = h
        .service
        .query()
        .where_owner_of(&h.company)
        .where_type("INVITE_TOKEN")
        .where_payload(payload(json!({"role": "admin"})))
        .find(token.secret())
        .await
        .unwrap();
    assert_eq!(found.unwrap().id(), token.id());
}

#[tokio::test]
async fn test_find_expired_token() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(
            &h.company,
            "INVITE_TOKEN",
            TokenOptions::new().expires(Duration::minutes(5)),
        )
        .await
        .unwrap();
    assert_eq!(token.expires_at(), Some(token.created_at() + Duration::minutes(5)));

    assert!(h.service.find(token.secret()).await.unwrap().is_some());

    h.clock.advance(Duration::hours(1));
    assert!(h.service.find(token.secret()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_absolute_expiry() {
    let h = Harness::stateless().await;
    let expires_at = h.clock.now() + Duration::seconds(90);
    let token = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new().expires(Expiry::At(expires_at)))
        .await
        .unwrap();

    h.clock.advance(Duration::seconds(89));
    assert!(h.service.find(token.secret()).await.unwrap().is_some());
    h.clock.advance(Duration::seconds(1));
    assert!(h.service.find(token.secret()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_all_tokens() {
    let h = Harness::stateless().await;
    let token1 = h
        .service
        .create_for(&h.company, "INVITE_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    let token2 = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    assert!(h.service.find(token1.secret()).await.unwrap().is_some());
    assert!(h.service.find(token2.secret()).await.unwrap().is_some());

    assert_eq!(h.blacklist_count().await, 0);
    h.service.force_delete_all().await.unwrap();
    assert_eq!(h.blacklist_count().await, 1);

    assert!(h.service.find(token1.secret()).await.unwrap().is_none());
    assert!(h.service.find(token2.secret()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_token_by_owner() {
    let h = Harness::stateless().await;
    let token1 = h
        .service
        .create_for(&h.project1, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    let token2 = h
        .service
        .create_for(&h.project2, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    assert_eq!(h.blacklist_count().await, 0);
    h.service
        .delete_tokens_of(&h.project1, None, None, None)
        .await
        .unwrap();
    assert_eq!(h.blacklist_count().await, 1);

    assert!(h.service.find(token1.secret()).await.unwrap().is_none());
    let found = h.service.find(token2.secret()).await.unwrap().unwrap();
    assert_eq!(found.id(), token2.id());
}

#[tokio::test]
async fn test_delete_token_by_owner_type() {
    let h = Harness::stateless().await;
    let token1 = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    let token2 = h
        .service
        .create_for(&h.project1, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    h.service
        .delete_where(None, Some("Company"), None, None, None)
        .await
        .unwrap();
    assert_eq!(h.blacklist_count().await, 1);

    assert!(h.service.find(token1.secret()).await.unwrap().is_none());
    assert_eq!(
        h.service.find(token2.secret()).await.unwrap().unwrap().id(),
        token2.id()
    );
}

#[tokio::test]
async fn test_delete_token_by_type() {
    let h = Harness::stateless().await;
    let token1 = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    let token2 = h
        .service
        .create_for(&h.company, "INVITE_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    h.service
        .delete_where(None, None, Some("ACCESS_TOKEN"), None, None)
        .await
        .unwrap();
    assert_eq!(h.blacklist_count().await, 1);

    assert!(h.service.find(token1.secret()).await.unwrap().is_none());
    assert_eq!(
        h.service.find(token2.secret()).await.unwrap().unwrap().id(),
        token2.id()
    );
}

#[tokio::test]
async fn test_delete_token_by_id() {
    let h = Harness::stateless().await;
    let token1 = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    let token2 = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    assert_ne!(token1.id(), token2.id());

    h.service
        .delete_where(None, None, None, Some(token1.id()), None)
        .await
        .unwrap();
    assert_eq!(h.blacklist_count().await, 1);

    assert!(h.service.find(token1.secret()).await.unwrap().is_none());
    assert_eq!(
        h.service.find(token2.secret()).await.unwrap().unwrap().id(),
        token2.id()
    );
}

#[tokio::test]
async fn test_delete_token_by_payload() {
    let h = Harness::stateless().await;
    let token1 = h
        .service
        .create_for(
            &h.company,
            "ACCESS_TOKEN",
            TokenOptions::new().payload(payload(json!({"role": "admin"}))),
        )
        .await
        .unwrap();
    let token2 = h
        .service
        .create_for(
            &h.company,
            "ACCESS_TOKEN",
            TokenOptions::new().payload(payload(json!({"role": "user"}))),
        )
        .await
        .unwrap();

    h.service
        .delete_tokens_of(&h.company, None, None, Some(payload(json!({"role": "admin"}))))
        .await
        .unwrap();
    assert_eq!(h.blacklist_count().await, 1);

    assert!(h.service.find(token1.secret()).await.unwrap().is_none());
    assert_eq!(
        h.service.find(token2.secret()).await.unwrap().unwrap().id(),
        token2.id()
    );
}

#[tokio::test]
async fn test_revocation_is_forward_only() {
    let h = Harness::stateless().await;
    let before = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    h.clock.advance(Duration::seconds(1));
    h.service.force_delete_all().await.unwrap();
    h.clock.advance(Duration::seconds(1));

    let after = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    assert!(h.service.find(before.secret()).await.unwrap().is_none());
    assert!(h.service.find(after.secret()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_tampered_token_not_found() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    let mut forged: Vec<char> = token.secret().chars().collect();
    let middle = forged.len() / 2;
    forged[middle] = if forged[middle] == 'A' { 'B' } else { 'A' };
    let forged: String = forged.into_iter().collect();

    assert!(h.service.find(&forged).await.unwrap().is_none());
}

#[tokio::test]
async fn test_string_owner_ids() {
    let h = Harness::stateless().await;
    let owner = OwnerRef::new("Company", "acme");
    let token = h
        .service
        .create(&owner, "INVITE_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    let found = h
        .service
        .query()
        .where_owner(owner.clone())
        .find(token.secret())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.owner(), owner);

    h.service
        .delete_where(Some(owner), None, None, None, None)
        .await
        .unwrap();
    assert!(h.service.find(token.secret()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_padded_secret_not_found() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();

    let padded = format!(" {} ", token.secret());
    assert!(h.service.find(&padded).await.unwrap().is_none());

    let found = h.service.find(token.secret()).await.unwrap().unwrap();
    assert_eq!(found.secret(), token.secret());
}

#[tokio::test]
async fn test_numeric_string_owner_matches_integer_owner() {
    let h = Harness::stateless().await;
    let token = h
        .service
        .create_for(&h.company, "ACCESS_TOKEN", TokenOptions::new())
        .await
        .unwrap();
    let as_string = OwnerRef {
        owner_type: "Company".into(),
        owner_id: OwnerId::Str("1".into()),
    };

    let found = h
        .service
        .query()
        .where_owner(as_string.clone())
        .find(token.secret())
        .await
        .unwrap();
    assert_eq!(found.unwrap().id(), token.id());

    h.service
        .delete_where(Some(as_string), None, None, None, None)
        .await
        .unwrap();
    assert!(h.service.find(token.secret()).await.unwrap().is_none());
}

#![allow(dead_code)]

use chrono::{Duration, Utc};
use devauth::store::{DeviceCodeStore, StoreError};
use devauth::DeviceCode;

pub fn record(device_code: &str, user_code: &str) -> DeviceCode {
    DeviceCode {
        device_code: device_code.to_string(),
        user_code: user_code.to_string(),
        verification_uri: "https://example.com/device".to_string(),
        expires_in: 600,
        created_at: Utc::now(),
        interval: 5,
        provider: "github".to_string(),
        state: "state-1".to_string(),
        approved: false,
        denied: false,
        access_token: String::new(),
        last_poll: None,
    }
}

pub fn aged(device_code: &str, user_code: &str, age_secs: i64) -> DeviceCode {
    DeviceCode {
        created_at: Utc::now() - Duration::seconds(age_secs),
        ..record(device_code, user_code)
    }
}

pub async fn save_then_get_by_either_key(store: &dyn DeviceCodeStore) {
    let code = record("device-roundtrip", "RTRT-0001");
    store.save(&code).await.expect("save");

    let by_device = store.get("device-roundtrip").await.expect("get");
    let by_user = store.get_by_user_code("RTRT-0001").await.expect("get by user code");
    assert_eq!(by_device, code);
    assert_eq!(by_user, code);
}

pub async fn missing_keys_report_distinct_errors(store: &dyn DeviceCodeStore) {
    assert!(matches!(store.get("nope").await, Err(StoreError::NotFound)));
    assert!(matches!(
        store.get_by_user_code("NOPE-NOPE").await,
        Err(StoreError::UserCodeNotFound)
    ));
    assert!(matches!(store.delete("nope").await, Err(StoreError::NotFound)));
    assert!(matches!(
        store.update(&record("nope", "NOPE-NOPE")).await,
        Err(StoreError::NotFound)
    ));
}

pub async fn duplicate_user_code_is_rejected(store: &dyn DeviceCodeStore) {
    store.save(&record("device-a", "DUPE-0001")).await.expect("first save");
    let err = store
        .save(&record("device-b", "DUPE-0001"))
        .await
        .expect_err("second save must fail");
    assert!(matches!(err, StoreError::AlreadyExists(_)));
    assert!(matches!(store.get("device-b").await, Err(StoreError::NotFound)));
    assert_eq!(
        store.get_by_user_code("DUPE-0001").await.expect("index intact").device_code,
        "device-a"
    );
}

pub async fn update_keeps_identity_fields(store: &dyn DeviceCodeStore) {
    let original = record("device-update", "UPDT-0001");
    store.save(&original).await.expect("save");

    let mut changed = original.clone();
    changed.approve("provider-token");
    changed.created_at = Utc::now() + Duration::hours(1);
    changed.user_code = "HIJK-LMNO".to_string();
    changed.last_poll = Some(Utc::now());
    store.update(&changed).await.expect("update");

    let stored = store.get("device-update").await.expect("get");
    assert!(stored.approved);
    assert_eq!(stored.access_token, "provider-token");
    assert_eq!(stored.last_poll, changed.last_poll);
    assert_eq!(stored.created_at, original.created_at);
    assert_eq!(stored.user_code, "UPDT-0001");
    assert!(store.get_by_user_code("UPDT-0001").await.is_ok());
}

pub async fn delete_removes_both_keys(store: &dyn DeviceCodeStore) {
    store.save(&record("device-delete", "DELE-0001")).await.expect("save");
    store.delete("device-delete").await.expect("delete");

    assert!(matches!(store.get("device-delete").await, Err(StoreError::NotFound)));
    assert!(matches!(
        store.get_by_user_code("DELE-0001").await,
        Err(StoreError::UserCodeNotFound)
    ));
    assert!(matches!(store.delete("device-delete").await, Err(StoreError::NotFound)));
}

pub async fn stale_records_are_invisible(store: &dyn DeviceCodeStore) {
    store.save(&aged("device-stale", "STAL-0001", 601)).await.expect("save");

    assert!(matches!(store.get("device-stale").await, Err(StoreError::NotFound)));
    assert!(store.get_by_user_code("STAL-0001").await.is_err());
    assert!(matches!(
        store.update(&record("device-stale", "STAL-0001")).await,
        Err(StoreError::NotFound)
    ));
}

pub async fn stale_user_code_can_be_reissued(store: &dyn DeviceCodeStore) {
    store.save(&aged("device-old", "REUS-0001", 601)).await.expect("save stale");
    store.save(&record("device-new", "REUS-0001")).await.expect("reuse user code");
    assert_eq!(
        store.get_by_user_code("REUS-0001").await.expect("new owner").device_code,
        "device-new"
    );

    assert!(matches!(store.delete("device-old").await, Err(StoreError::NotFound)));
    assert!(matches!(store.get("device-old").await, Err(StoreError::NotFound)));
    assert_eq!(
        store.get_by_user_code("REUS-0001").await.expect("index kept").device_code,
        "device-new"
    );
}

pub async fn update_never_reverts_a_decision(store: &dyn DeviceCodeStore) {
    let original = record("device-decided", "DCSN-0001");
    store.save(&original).await.expect("save");
    let mut approved = original.clone();
    approved.approve("provider-token");
    store.update(&approved).await.expect("approve");

    // A pending copy read before the approval only moves the poll time.
    let mut stale_copy = original.clone();
    stale_copy.last_poll = Some(Utc::now());
    store.update(&stale_copy).await.expect("pending copy");
    let stored = store.get("device-decided").await.expect("get");
    assert!(stored.approved);
    assert_eq!(stored.access_token, "provider-token");
    assert_eq!(stored.last_poll, stale_copy.last_poll);

    let mut denied = original.clone();
    denied.deny();
    assert!(matches!(store.update(&denied).await, Err(StoreError::Conflict)));
    assert!(!store.get("device-decided").await.expect("get").denied);
}

pub async fn record_poll_returns_current_record(store: &dyn DeviceCodeStore) {
    assert!(matches!(
        store.record_poll("nope", Utc::now()).await,
        Err(StoreError::NotFound)
    ));

    let original = record("device-poll", "POLL-0001");
    store.save(&original).await.expect("save");
    let mut denied = original.clone();
    denied.deny();
    store.update(&denied).await.expect("deny");

    let at = Utc::now();
    let polled = store.record_poll("device-poll", at).await.expect("poll");
    assert!(polled.denied);
    assert_eq!(polled.last_poll, Some(at));
    let stored = store.get("device-poll").await.expect("get");
    assert!(stored.denied);
    assert_eq!(stored.last_poll, Some(at));

    // An earlier stamp never moves the poll time backwards.
    store
        .record_poll("device-poll", at - Duration::seconds(30))
        .await
        .expect("late stamp");
    assert_eq!(store.get("device-poll").await.expect("get").last_poll, Some(at));
}

pub async fn run_all(store: &dyn DeviceCodeStore) {
    save_then_get_by_either_key(store).await;
    missing_keys_report_distinct_errors(store).await;
    duplicate_user_code_is_rejected(store).await;
    update_keeps_identity_fields(store).await;
    delete_removes_both_keys(store).await;
    stale_records_are_invisible(store).await;
    stale_user_code_can_be_reissued(store).await;
    update_never_reverts_a_decision(store).await;
    record_poll_returns_current_record(store).await;
}

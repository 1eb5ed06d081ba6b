//! Integration tests for the MongoDB delivery log backend.
//!
//! Requires a running MongoDB with `MONGODB_URL` set.
//! Run with:
//!
//! ```bash
//! MONGODB_URL="mongodb://localhost:27017" \
//!   cargo test -p courier-storage --test integration -- --ignored --nocapture
//! ```

use mongodb::bson::{Bson, doc};
use tracing::Span;

use courier_common::config::DatabaseConfig;
use courier_common::db::MongoDb;
use courier_common::types::{EmailLog, EmailMessage};
use courier_storage::{DeliveryLogger, MongoLogger};

async fn connect() -> MongoDb {
    let config = DatabaseConfig {
        url: std::env::var("MONGODB_URL").expect("MONGODB_URL must be set"),
        name: "courier_test".to_string(),
        timeout_secs: 5,
    };
    MongoDb::connect(&config).await.unwrap()
}

fn sample_log() -> EmailLog {
    let email = EmailMessage {
        to: vec!["a@x.com".to_string()],
        subject: "Integration".to_string(),
        body_html: None,
        body_text: Some("hi".to_string()),
        from: None,
    };
    EmailLog::attempt(&email, "mailhog").failed("network down")
}

#[tokio::test]
#[ignore]
async fn test_store_inserts_one_document() {
    let mongodb = connect().await;
    let collection = mongodb.collection("email_logs_it");
    collection.delete_many(doc! {}).await.unwrap();

    let logger = MongoLogger::new(collection.clone(), Span::none());
    let log = sample_log();
    logger.store(&log).await.unwrap();

    let stored = collection
        .find_one(doc! { "_id": log.id.to_string() })
        .await
        .unwrap()
        .expect("document inserted");
    assert_eq!(stored.get_str("status").unwrap(), "failed");
    assert_eq!(stored.get_str("error_msg").unwrap(), "network down");
    assert!(matches!(
        stored.get("attempts"),
        Some(Bson::Int32(1)) | Some(Bson::Int64(1))
    ));

    logger.close().await;
    mongodb.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn test_duplicate_id_is_storage_error() {
    let mongodb = connect().await;
    let collection = mongodb.collection("email_logs_it_dup");
    collection.delete_many(doc! {}).await.unwrap();

    let logger = MongoLogger::new(collection, Span::none());
    let log = sample_log();
    logger.store(&log).await.unwrap();
    assert!(logger.store(&log).await.is_err());

    mongodb.disconnect().await;
}

//! Concurrent ingestion and matching against on-disk databases.

use crate::test_utils::{fast_protocol, wait_for, OfflineService, TempDatabase, TestDevice, T0};
use coepi_core::{Identifier, IdentifierScheme, ManualClock, ObservedIdentifier, PublishedKey};
use coepi_crypto::{generate_rotating_key, IdentifierEngine};
use coepi_store::IdentifierStore;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_producers_one_ingestion_loop() {
    let clock = Arc::new(ManualClock::new(T0));
    let mut device = TestDevice::new(&fast_protocol(), clock, Arc::new(OfflineService));
    let observations = device.take_observations();
    let ingestion = device.coordinator.spawn_ingestion(observations);

    let mut producers = Vec::new();
    for producer in 0..8u8 {
        let radio = Arc::clone(&device.radio);
        producers.push(tokio::spawn(async move {
            for i in 0..250u64 {
                let mut bytes = vec![producer; 16];
                bytes[8..].copy_from_slice(&i.to_be_bytes());
                radio.receive(Identifier::new(bytes), T0 - i).unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let identifiers = Arc::clone(&device.stores.identifiers);
    assert!(wait_for(|| identifiers.count().unwrap() == 2_000).await);
    ingestion.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_matching_while_ingesting() {
    let config = fast_protocol();
    let clock = Arc::new(ManualClock::new(T0));
    let mut device = TestDevice::new(&config, clock, Arc::new(OfflineService));
    let observations = device.take_observations();
    let ingestion = device.coordinator.spawn_ingestion(observations);

    let engine = IdentifierEngine::new(&config);
    let sick = generate_rotating_key(IdentifierScheme::Blake3Mac, 0).unwrap();
    let published = PublishedKey::from_key(&sick, T0);

    let radio = Arc::clone(&device.radio);
    let contacts = (0..100u64)
        .map(|i| {
            let at = T0 - i * config.identifier_lifetime_secs;
            (engine.derive(&sick, at).unwrap(), at)
        })
        .collect::<Vec<_>>();
    let producer = tokio::spawn(async move {
        for (n, (identifier, at)) in contacts.into_iter().enumerate() {
            radio.receive(identifier, at).unwrap();
            for _ in 0..9 {
                let noise = Identifier::new(uuid::Uuid::new_v4().as_bytes().to_vec());
                radio.receive(noise, T0 - n as u64).unwrap();
            }
            tokio::task::yield_now().await;
        }
    });

    let matcher = device.coordinator.matcher().clone();
    let key = published.clone();
    let reader = tokio::task::spawn_blocking(move || {
        let mut last = 0;
        for _ in 0..20 {
            let matched = matcher.match_key(&key, T0).unwrap().matched_identifiers.len();
            assert!(matched >= last);
            assert!(matched <= 100);
            last = matched;
        }
    });

    producer.await.unwrap();
    reader.await.unwrap();

    let identifiers = Arc::clone(&device.stores.identifiers);
    assert!(wait_for(|| identifiers.count().unwrap() == 1_000).await);
    ingestion.stop().await;

    let result = device.coordinator.matcher().match_key(&published, T0).unwrap();
    assert_eq!(result.matched_identifiers.len(), 100);
}

#[test]
fn test_two_connections_share_one_file() {
    let storage = TempDatabase::new();
    let first = storage.db.identifier_store();
    let second = storage.reopen().identifier_store();

    let writers: Vec<_> = [first, second]
        .into_iter()
        .enumerate()
        .map(|(n, store)| {
            std::thread::spawn(move || {
                for i in 0..300u64 {
                    let identifier = Identifier::new(vec![n as u8; 16]);
                    store
                        .insert(&ObservedIdentifier::new(identifier, T0 + i))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(storage.reopen().identifier_store().count().unwrap(), 600);
    assert!(storage.path().exists());
}

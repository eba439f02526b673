use anyhow::Result;
use chrono::Utc;
use drug_event_etl::config::StoreConfig;
use drug_event_etl::domain::{Drug, Patient, Reaction, Report, Sex};
use drug_event_etl::storage::{open_store, PutOutcome, StoreLease};
use tempfile::tempdir;

fn report(id: &str) -> Report {
    Report {
        report_id: id.to_string(),
        received_date: Some("2021-07-04T00:00:00".to_string()),
        patient: Patient {
            age: Some(45),
            age_unit: Some("801".to_string()),
            sex: Sex::Male,
            weight: Some(82.5),
        },
        drugs: vec![
            Drug {
                name: "LIPITOR".to_string(),
                active_ingredients: vec!["ATORVASTATIN CALCIUM".to_string()],
                dosage_form: Some("TABLET".to_string()),
                start_date: Some("2021-01-01T00:00:00".to_string()),
                end_date: None,
            },
            Drug {
                name: "Unknown".to_string(),
                active_ingredients: vec![],
                dosage_form: None,
                start_date: None,
                end_date: None,
            },
        ],
        reactions: vec![Reaction {
            term: "Myalgia".to_string(),
            outcome: Some("2".to_string()),
        }],
        source: "openfda".to_string(),
        processed_at: Utc::now(),
    }
}

fn file_store_config(dir: &std::path::Path) -> StoreConfig {
    StoreConfig {
        store_uri: format!("sqlite://{}", dir.display()),
        store_db: "eim_platform".to_string(),
        store_collection: "reports".to_string(),
    }
}

#[tokio::test]
async fn test_insert_duplicate_and_count() -> Result<()> {
    let dir = tempdir()?;
    let sink = open_store(&file_store_config(dir.path()))?;
    let lease = StoreLease::acquire(sink.as_ref()).await?;

    assert_eq!(lease.count().await?, 0);
    assert_eq!(lease.put(&report("US9")).await?, PutOutcome::Inserted);
    assert_eq!(lease.count().await?, 1);

    let mut changed = report("US9");
    changed.source = "replay".to_string();
    assert_eq!(lease.put(&changed).await?, PutOutcome::Duplicate);
    assert_eq!(lease.count().await?, 1);
    assert_eq!(lease.get("US9").await?.unwrap().source, "openfda");
    Ok(())
}

#[tokio::test]
async fn test_round_trip_preserves_nested_fields() -> Result<()> {
    let dir = tempdir()?;
    let sink = open_store(&file_store_config(dir.path()))?;
    let lease = StoreLease::acquire(sink.as_ref()).await?;

    let original = report("RT-7");
    lease.put(&original).await?;
    let stored = lease.get("RT-7").await?.expect("stored report");

    assert_eq!(stored, original);
    assert_eq!(lease.get("missing").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_blank_id_rejected() -> Result<()> {
    let sink = open_store(&StoreConfig {
        store_uri: "sqlite::memory:".to_string(),
        ..StoreConfig::default()
    })?;
    let lease = StoreLease::acquire(sink.as_ref()).await?;

    assert!(matches!(
        lease.put(&report("   ")).await?,
        PutOutcome::Rejected(_)
    ));
    assert_eq!(lease.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_delete_list_and_persistence_across_leases() -> Result<()> {
    let dir = tempdir()?;
    let config = file_store_config(dir.path());

    {
        let sink = open_store(&config)?;
        let lease = StoreLease::acquire(sink.as_ref()).await?;
        for id in ["L1", "L2", "L3", "L4"] {
            lease.put(&report(id)).await?;
        }
        assert!(lease.delete("L2").await?);
        assert!(!lease.delete("L2").await?);
    }

    let sink = open_store(&config)?;
    let lease = StoreLease::acquire(sink.as_ref()).await?;
    let ids: Vec<_> = lease
        .list(10)
        .await?
        .into_iter()
        .map(|r| r.report_id)
        .collect();
    assert_eq!(ids, vec!["L1", "L3", "L4"]);
    assert_eq!(lease.list(2).await?.len(), 2);

    // Index survives reopening: the old id is still unique
    assert_eq!(lease.put(&report("L1")).await?, PutOutcome::Duplicate);
    assert_eq!(lease.put(&report("L2")).await?, PutOutcome::Inserted);
    Ok(())
}

#[tokio::test]
async fn test_unopenable_location_is_store_unavailable() -> Result<()> {
    let dir = tempdir()?;
    // A regular file where the database directory should be
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x")?;

    let sink = open_store(&file_store_config(&blocker))?;
    let err = StoreLease::acquire(sink.as_ref()).await.err().expect("open fails");
    assert!(err.is_fatal());
    assert!(!sink.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_racing_connections_settle_on_one_insert() -> Result<()> {
    let dir = tempdir()?;
    let config = file_store_config(dir.path());

    let first = open_store(&config)?;
    let second = open_store(&config)?;
    let first_lease = StoreLease::acquire(first.as_ref()).await?;
    let second_lease = StoreLease::acquire(second.as_ref()).await?;

    let contested = report("RACE-1");
    let (a, b) = tokio::join!(first_lease.put(&contested), second_lease.put(&contested));
    let mut outcomes = vec![a?, b?];
    outcomes.sort_by_key(|o| matches!(o, PutOutcome::Duplicate));

    assert_eq!(outcomes, vec![PutOutcome::Inserted, PutOutcome::Duplicate]);
    assert_eq!(first_lease.count().await?, 1);
    assert_eq!(second_lease.count().await?, 1);
    Ok(())
}

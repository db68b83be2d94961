//! Exercises job tracking against a real Postgres instance. Requires
//! `NOETIC_TEST_DATABASE_URL`; skipped otherwise.

use noetic_config::DatabaseConfig;
use noetic_dispatch::{Database, JobTracker};

async fn test_db() -> Option<Database> {
    let url = std::env::var("NOETIC_TEST_DATABASE_URL").ok()?;
    let cfg = DatabaseConfig { connection_string: url, lease_ttl_secs: 30 };
    let db = Database::connect(&cfg).expect("connect");
    db.run_migrations().await.expect("migrate");
    Some(db)
}

#[tokio::test]
async fn job_progresses_from_running_to_completed() {
    let Some(db) = test_db().await else {
        eprintln!("skipping: NOETIC_TEST_DATABASE_URL not set");
        return;
    };

    let jobs = JobTracker::new(&db);
    let job_id = jobs.create_job("what is the weather on mars").await.unwrap();

    let record = jobs.get_job(job_id).await.unwrap();
    assert_eq!(record.status, "running");

    jobs.update_job_progress(job_id, "delegating").await.unwrap();
    assert_eq!(jobs.get_job(job_id).await.unwrap().status, "delegating");

    jobs.complete_job(job_id, true).await.unwrap();
    assert_eq!(jobs.get_job(job_id).await.unwrap().status, "completed");
}

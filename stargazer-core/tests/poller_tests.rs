use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use stargazer_core::{
    repo_list, AnnouncedStore, DeliveryError, Destination, GithubClient, MetricSnapshot,
    MilestoneTracker, Notification, Notifier, Poller, RepoOutcome, StaticDirectory, Thresholds,
    TrackedRepo,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recording {
    received: Mutex<Vec<(String, u64)>>,
}

impl Recording {
    fn take(&self) -> Vec<(String, u64)> {
        std::mem::take(&mut *self.received.lock().unwrap())
    }
}

#[async_trait]
impl Destination for Recording {
    fn id(&self) -> String {
        "recording".to_owned()
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.received
            .lock()
            .unwrap()
            .push((notification.repo.to_string(), notification.threshold));
        Ok(())
    }
}

async fn mount_repo(server: &MockServer, repo: &str, stars: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{repo}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stargazers_count": stars,
            "forks_count": 4,
            "subscribers_count": 2
        })))
        .mount(server)
        .await;
}

async fn mount_failure(server: &MockServer, repo: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{repo}")))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

fn build_poller(
    server: &MockServer,
    repos: &[&str],
    announced: AnnouncedStore,
    recording: Arc<Recording>,
) -> Poller {
    let source = GithubClient::new(Client::new(), Url::parse(&server.uri()).unwrap());
    let tracker = MilestoneTracker::new(Thresholds::new(vec![10, 25, 50, 100]).unwrap(), announced);
    let directory = StaticDirectory::new(vec![recording as Arc<dyn Destination>]);
    Poller::new(
        repo_list(repos.iter().copied()).unwrap(),
        Arc::new(source),
        tracker,
        Notifier::new(Arc::new(directory)),
    )
}

#[tokio::test]
async fn failing_repository_does_not_block_the_rest_of_the_tick() {
    let server = MockServer::start().await;
    mount_failure(&server, "org/broken").await;
    mount_repo(&server, "org/alpha", 60).await;

    let recording = Arc::new(Recording::default());
    let mut poller = build_poller(
        &server,
        &["org/broken", "org/alpha"],
        AnnouncedStore::in_memory(),
        recording.clone(),
    );

    let report = poller.poll_once().await;

    assert_eq!(report.updated(), 1);
    let failed: Vec<_> = report.failed().map(|(repo, _)| repo.to_string()).collect();
    assert_eq!(failed, vec!["org/broken".to_owned()]);

    let alpha = TrackedRepo::new("org/alpha").unwrap();
    let broken = TrackedRepo::new("org/broken").unwrap();
    let stats = poller.stats();
    assert_eq!(
        stats.get(&alpha).await,
        Some(MetricSnapshot {
            stars: 60,
            forks: 4,
            watchers: 2
        })
    );
    assert_eq!(stats.get(&broken).await, None);
    assert_eq!(stats.stars_label(&broken).await, "?");

    assert_eq!(
        recording.take(),
        vec![
            ("org/alpha".to_owned(), 10),
            ("org/alpha".to_owned(), 25),
            ("org/alpha".to_owned(), 50)
        ]
    );
}

#[tokio::test]
async fn milestones_are_announced_once_across_ticks() {
    let server = MockServer::start().await;
    mount_repo(&server, "org/alpha", 15).await;

    let recording = Arc::new(Recording::default());
    let mut poller = build_poller(
        &server,
        &["org/alpha"],
        AnnouncedStore::in_memory(),
        recording.clone(),
    );

    poller.poll_once().await;
    assert_eq!(recording.take(), vec![("org/alpha".to_owned(), 10)]);

    poller.poll_once().await;
    assert!(recording.take().is_empty());

    server.reset().await;
    mount_repo(&server, "org/alpha", 30).await;
    let report = poller.poll_once().await;
    assert_eq!(recording.take(), vec![("org/alpha".to_owned(), 25)]);
    match &report.repos[0].outcome {
        RepoOutcome::Updated {
            previous, current, ..
        } => {
            assert_eq!(previous.map(|s| s.stars), Some(15));
            assert_eq!(current.stars, 30);
        }
        RepoOutcome::Failed(err) => panic!("unexpected failure: {err}"),
    }
}

#[tokio::test]
async fn failed_fetch_keeps_previous_snapshot() {
    let server = MockServer::start().await;
    mount_repo(&server, "org/alpha", 42).await;

    let recording = Arc::new(Recording::default());
    let mut poller = build_poller(
        &server,
        &["org/alpha"],
        AnnouncedStore::in_memory(),
        recording.clone(),
    );
    let alpha = TrackedRepo::new("org/alpha").unwrap();

    poller.poll_once().await;
    assert_eq!(poller.stats().get(&alpha).await.map(|s| s.stars), Some(42));

    server.reset().await;
    mount_failure(&server, "org/alpha").await;
    let report = poller.poll_once().await;

    assert_eq!(report.failed().count(), 1);
    assert_eq!(poller.stats().get(&alpha).await.map(|s| s.stars), Some(42));
}

#[tokio::test]
async fn shared_announced_store_suppresses_repeats_after_cache_loss() {
    let server = MockServer::start().await;
    mount_repo(&server, "org/alpha", 120).await;

    let announced = AnnouncedStore::in_memory();
    let recording = Arc::new(Recording::default());

    let mut first = build_poller(&server, &["org/alpha"], announced.clone(), recording.clone());
    first.poll_once().await;
    assert_eq!(recording.take().len(), 4);

    // a fresh poller starts with an empty cache but the same announced set
    let mut second = build_poller(&server, &["org/alpha"], announced, recording.clone());
    let report = second.poll_once().await;

    assert!(report.announced().is_empty());
    assert!(recording.take().is_empty());
}

#[tokio::test]
async fn totals_aggregate_known_repositories() {
    let server = MockServer::start().await;
    mount_repo(&server, "org/alpha", 5).await;
    mount_repo(&server, "org/beta", 7).await;
    mount_failure(&server, "org/gamma").await;

    let recording = Arc::new(Recording::default());
    let mut poller = build_poller(
        &server,
        &["org/alpha", "org/beta", "org/gamma"],
        AnnouncedStore::in_memory(),
        recording,
    );
    poller.poll_once().await;

    let totals = poller.stats().totals(poller.repos()).await;
    assert_eq!(totals.stars, 12);
    assert_eq!(totals.forks, 8);
    assert_eq!(totals.watchers, 4);
    assert_eq!(totals.known, 2);

    let all = poller.stats().all().await;
    let ids: Vec<_> = all.iter().map(|(repo, _)| repo.to_string()).collect();
    assert_eq!(ids, vec!["org/alpha", "org/beta"]);
}

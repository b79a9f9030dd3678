use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::repo::TrackedRepo;
use crate::stats::MetricSnapshot;

/// Payload sent to every destination when a milestone is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub repo: TrackedRepo,
    pub threshold: u64,
    pub stars: u64,
    pub repo_url: String,
    pub title: String,
    pub description: String,
    pub reached_at: DateTime<Utc>,
}

impl Notification {
    pub fn milestone(repo: &TrackedRepo, threshold: u64, snapshot: &MetricSnapshot) -> Self {
        Self {
            repo: repo.clone(),
            threshold,
            stars: snapshot.stars,
            repo_url: repo.html_url(),
            title: "Milestone Reached!".to_owned(),
            description: format!("**{}** just hit **{} stars**!", repo.name(), threshold),
            reached_at: Utc::now(),
        }
    }
}

/// A sink that can receive a rendered notification.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Human readable identifier used in logs and delivery reports.
    fn id(&self) -> String;

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Source of the destinations that are live right now.
#[async_trait]
pub trait DestinationDirectory: Send + Sync {
    async fn destinations(&self) -> Result<Vec<Box<dyn Destination>>, DeliveryError>;
}

/// Fixed set of destinations, shared between deliveries.
#[derive(Clone, Default)]
pub struct StaticDirectory {
    destinations: Vec<Arc<dyn Destination>>,
}

impl StaticDirectory {
    pub fn new(destinations: Vec<Arc<dyn Destination>>) -> Self {
        Self { destinations }
    }
}

struct SharedDestination(Arc<dyn Destination>);

#[async_trait]
impl Destination for SharedDestination {
    fn id(&self) -> String {
        self.0.id()
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.0.send(notification).await
    }
}

#[async_trait]
impl DestinationDirectory for StaticDirectory {
    async fn destinations(&self) -> Result<Vec<Box<dyn Destination>>, DeliveryError> {
        Ok(self
            .destinations
            .iter()
            .map(|d| Box::new(SharedDestination(d.clone())) as Box<dyn Destination>)
            .collect())
    }
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub destination: String,
    pub error: DeliveryError,
}

/// What happened to one milestone notification.
#[derive(Debug)]
pub struct DeliveryReport {
    pub notification: Notification,
    pub delivered: Vec<String>,
    pub failures: Vec<DeliveryFailure>,
    /// Set when the destinations could not be enumerated at all.
    pub discovery_error: Option<DeliveryError>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failures.len()
    }
}

/// Fans a milestone out to every destination, isolating failures.
#[derive(Clone)]
pub struct Notifier {
    directory: Arc<dyn DestinationDirectory>,
}

impl Notifier {
    pub fn new(directory: Arc<dyn DestinationDirectory>) -> Self {
        Self { directory }
    }

    /// Never fails. Every destination gets one attempt and individual
    /// failures end up in the returned report.
    pub async fn deliver(
        &self,
        repo: &TrackedRepo,
        threshold: u64,
        snapshot: &MetricSnapshot,
    ) -> DeliveryReport {
        let notification = Notification::milestone(repo, threshold, snapshot);
        let mut report = DeliveryReport {
            notification,
            delivered: Vec::new(),
            failures: Vec::new(),
            discovery_error: None,
        };

        let destinations = match self.directory.destinations().await {
            Ok(destinations) => destinations,
            Err(err) => {
                warn!(
                    repo = %repo,
                    threshold,
                    error = %err,
                    "failed to enumerate destinations"
                );
                report.discovery_error = Some(err);
                return report;
            }
        };

        for destination in destinations {
            let id = destination.id();
            match destination.send(&report.notification).await {
                Ok(()) => {
                    debug!(destination = %id, repo = %repo, threshold, "milestone delivered");
                    report.delivered.push(id);
                }
                Err(error) => {
                    warn!(
                        destination = %id,
                        repo = %repo,
                        threshold,
                        %error,
                        "milestone delivery failed"
                    );
                    report.failures.push(DeliveryFailure {
                        destination: id,
                        error,
                    });
                }
            }
        }

        report
    }
}

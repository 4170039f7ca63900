use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, error::Error, fmt::Display};
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use upwatch::{Service, ServiceSummary, Status, StatusEvent};

/// The event store. Owns all services and their histories; everything else
/// talks to it through a `StateActorHandle`, so no locking is needed.
struct StateActor {
    receiver: mpsc::UnboundedReceiver<Message>,
    services: BTreeMap<String, Service>,
}

enum Message {
    CreateService {
        name: String,
        description: String,
        respond_to: oneshot::Sender<Result<ServiceSummary, StoreError>>,
    },
    AppendEvent {
        name: String,
        status: Status,
        time: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<StatusEvent, StoreError>>,
    },
    GetEventsInRange {
        name: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<Vec<StatusEvent>, StoreError>>,
    },
    GetLatestEvent {
        name: String,
        respond_to: oneshot::Sender<Result<Option<StatusEvent>, StoreError>>,
    },
    GetHistory {
        name: String,
        respond_to: oneshot::Sender<Result<Service, StoreError>>,
    },
    ListServices {
        respond_to: oneshot::Sender<Vec<ServiceSummary>>,
    },
}

impl StateActor {
    fn new(receiver: mpsc::UnboundedReceiver<Message>, services: BTreeMap<String, Service>) -> Self {
        Self { receiver, services }
    }

    fn service(&self, name: &str) -> Result<&Service, StoreError> {
        self.services.get(name).ok_or(StoreError::NotFound)
    }

    fn create_service(
        &mut self,
        name: String,
        description: String,
    ) -> Result<ServiceSummary, StoreError> {
        if self.services.contains_key(&name) {
            return Err(StoreError::Conflict);
        }
        info!("Registered service {name}");
        let summary = ServiceSummary {
            name: name.clone(),
            description: description.clone(),
            current_status: Status::Working,
        };
        self.services.insert(name, Service::new(description));
        Ok(summary)
    }

    fn append_event(
        &mut self,
        name: &str,
        status: Status,
        time: DateTime<Utc>,
    ) -> Result<StatusEvent, StoreError> {
        let service = self.services.get_mut(name).ok_or(StoreError::NotFound)?;
        let event = StatusEvent { status, time };
        service.events.push(event);
        Ok(event)
    }

    /// Resolves every service's current status in one pass, so listing does
    /// not pay one actor round-trip per service.
    fn list_services(&self) -> Vec<ServiceSummary> {
        self.services
            .iter()
            .map(|(name, service)| ServiceSummary {
                name: name.clone(),
                description: service.description.clone(),
                current_status: service.current_status(),
            })
            .collect()
    }

    fn handle_message(&mut self, msg: Message) {
        // Errors when sending can happen e.g. if the `select!` macro is used
        // to cancel waiting for the response. We can safely ignore these.
        match msg {
            Message::CreateService {
                name,
                description,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_service(name, description));
            }
            Message::AppendEvent {
                name,
                status,
                time,
                respond_to,
            } => {
                let _ = respond_to.send(self.append_event(&name, status, time));
            }
            Message::GetEventsInRange {
                name,
                start,
                end,
                respond_to,
            } => {
                let result = self.service(&name).map(|s| s.events_in_range(start, end));
                let _ = respond_to.send(result);
            }
            Message::GetLatestEvent { name, respond_to } => {
                let result = self.service(&name).map(Service::latest_event);
                let _ = respond_to.send(result);
            }
            Message::GetHistory { name, respond_to } => {
                let result = self.service(&name).map(|s| {
                    let mut service = s.clone();
                    service.events.sort_by_key(|e| e.time);
                    service
                });
                let _ = respond_to.send(result);
            }
            Message::ListServices { respond_to } => {
                let _ = respond_to.send(self.list_services());
            }
        }
    }

    async fn run(&mut self) {
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg);
        }
    }
}

#[derive(Clone)]
pub struct StateActorHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl StateActorHandle {
    pub fn new(services: BTreeMap<String, Service>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut actor = StateActor::new(receiver, services);
        tokio::spawn(async move { actor.run().await });

        Self { sender }
    }

    async fn request<T>(
        &self,
        make_msg: impl FnOnce(oneshot::Sender<T>) -> Message,
    ) -> T {
        let (send, recv) = oneshot::channel();
        // Ignore send errors. If this send fails, so does the
        // recv.await below. There's no reason to check for the
        // same failure twice.
        let _ = self.sender.send(make_msg(send));
        recv.await.expect("Actor task has been killed")
    }

    pub async fn create_service(
        &self,
        name: String,
        description: String,
    ) -> Result<ServiceSummary, StoreError> {
        self.request(|respond_to| Message::CreateService {
            name,
            description,
            respond_to,
        })
        .await
    }

    pub async fn append_event(
        &self,
        name: String,
        status: Status,
        time: DateTime<Utc>,
    ) -> Result<StatusEvent, StoreError> {
        self.request(|respond_to| Message::AppendEvent {
            name,
            status,
            time,
            respond_to,
        })
        .await
    }

    pub async fn events_in_range(
        &self,
        name: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StatusEvent>, StoreError> {
        self.request(|respond_to| Message::GetEventsInRange {
            name,
            start,
            end,
            respond_to,
        })
        .await
    }

    pub async fn latest_event(&self, name: String) -> Result<Option<StatusEvent>, StoreError> {
        self.request(|respond_to| Message::GetLatestEvent { name, respond_to })
            .await
    }

    pub async fn history(&self, name: String) -> Result<Service, StoreError> {
        self.request(|respond_to| Message::GetHistory { name, respond_to })
            .await
    }

    pub async fn list_services(&self) -> Vec<ServiceSummary> {
        self.request(|respond_to| Message::ListServices { respond_to })
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Conflict,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Service not found"),
            Self::Conflict => write!(f, "Service already exists"),
        }
    }
}

impl Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn handle() -> StateActorHandle {
        StateActorHandle::new(BTreeMap::new())
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let handle = handle();
        handle
            .create_service("db".to_string(), "primary".to_string())
            .await
            .unwrap();
        let err = handle
            .create_service("db".to_string(), "again".to_string())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict);
    }

    #[tokio::test]
    async fn append_to_unknown_service_fails() {
        let handle = handle();
        let err = handle
            .append_event("ghost".to_string(), Status::Working, at(0))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn range_query_filters_and_sorts() {
        let handle = handle();
        handle
            .create_service("db".to_string(), "primary".to_string())
            .await
            .unwrap();
        for (status, secs) in [
            (Status::Working, 500),
            (Status::NotWorking, 100),
            (Status::Unstable, 9000),
        ] {
            handle
                .append_event("db".to_string(), status, at(secs))
                .await
                .unwrap();
        }

        let events = handle
            .events_in_range("db".to_string(), at(0), at(1000))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, Status::NotWorking);
        assert_eq!(events[1].status, Status::Working);
    }

    #[tokio::test]
    async fn listing_resolves_current_statuses_in_bulk() {
        let handle = handle();
        handle
            .create_service("db".to_string(), "primary".to_string())
            .await
            .unwrap();
        handle
            .create_service("cache".to_string(), "redis".to_string())
            .await
            .unwrap();
        handle
            .append_event("db".to_string(), Status::NotWorking, at(10))
            .await
            .unwrap();

        let summaries = handle.list_services().await;
        assert_eq!(summaries.len(), 2);
        // BTreeMap keeps names sorted.
        assert_eq!(summaries[0].name, "cache");
        assert_eq!(summaries[0].current_status, Status::Working);
        assert_eq!(summaries[1].name, "db");
        assert_eq!(summaries[1].current_status, Status::NotWorking);
    }

    #[tokio::test]
    async fn latest_event_is_none_before_first_update() {
        let handle = handle();
        handle
            .create_service("db".to_string(), "primary".to_string())
            .await
            .unwrap();
        assert_eq!(handle.latest_event("db".to_string()).await.unwrap(), None);
        assert_eq!(
            handle.latest_event("ghost".to_string()).await.unwrap_err(),
            StoreError::NotFound
        );
    }
}

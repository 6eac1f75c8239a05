//! Per-endpoint notification request state (RQNT / NTFY)

use std::fmt;
use std::net::SocketAddr;

use rvoip_mgcp_core::{EndpointId, EventAction, ObservedEvent, RequestedEvent, SignalRequest};

/// Where a notification goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// `N:` value, `[name@]host[:port]`
    Entity(String),
    /// Source address of the call agent that sent the request
    Address(SocketAddr),
}

impl fmt::Display for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationTarget::Entity(entity) => f.write_str(entity),
            NotificationTarget::Address(addr) => write!(f, "{}", addr),
        }
    }
}

/// An NTFY to be delivered to a call agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub endpoint: EndpointId,
    pub target: NotificationTarget,
    /// `X:` of the RQNT being answered
    pub request_id: String,
    pub observed: Vec<ObservedEvent>,
}

/// Delivers notifications produced by endpoints
pub trait NotificationSink: Send + Sync {
    fn submit(&self, notification: Notification);
}

/// Parameters of an accepted RQNT
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationRequest {
    pub request_id: String,
    pub notified_entity: Option<String>,
    pub events: Vec<RequestedEvent>,
    pub signals: Vec<SignalRequest>,
}

/// Notification state as reported by AUEP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationSnapshot {
    pub request_id: Option<String>,
    pub notified_entity: Option<String>,
    pub requested_events: Vec<RequestedEvent>,
    pub signals: Vec<SignalRequest>,
    pub observed: Vec<ObservedEvent>,
}

/// What to do with an observed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventOutcome {
    Ignored,
    Accumulated,
    Notify {
        request_id: String,
        observed: Vec<ObservedEvent>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct NotificationState {
    request_id: Option<String>,
    notified_entity: Option<String>,
    call_agent: Option<SocketAddr>,
    requested: Vec<RequestedEvent>,
    signals: Vec<SignalRequest>,
    observed: Vec<ObservedEvent>,
}

fn connection_matches(requested: Option<&str>, observed: Option<&str>) -> bool {
    match (requested, observed) {
        (None, _) | (Some("$"), _) | (Some("*"), _) => true,
        (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
        (Some(_), None) => false,
    }
}

fn event_matches(requested: &RequestedEvent, observed: &ObservedEvent) -> bool {
    let wanted = &requested.event;
    let seen = &observed.event;
    let package_ok = wanted.package.is_none() || wanted.package_name() == seen.package_name();
    package_ok
        && wanted.name.eq_ignore_ascii_case(&seen.name)
        && connection_matches(wanted.connection.as_deref(), seen.connection.as_deref())
}

impl NotificationState {
    /// Replace the active request; accumulated events are discarded
    pub fn apply(&mut self, request: NotificationRequest) {
        self.request_id = Some(request.request_id);
        if request.notified_entity.is_some() {
            self.notified_entity = request.notified_entity;
        }
        self.requested = request.events;
        self.signals = request.signals;
        self.observed.clear();
    }

    pub fn set_notified_entity(&mut self, entity: String) {
        self.notified_entity = Some(entity);
    }

    pub fn remember_call_agent(&mut self, source: SocketAddr) {
        self.call_agent = Some(source);
    }

    pub fn signals_finished(&mut self) {
        self.signals.clear();
    }

    /// Target for the next notification, falling back to `default` then to
    /// the last call agent seen
    pub fn target(&self, default: Option<&str>) -> Option<NotificationTarget> {
        self.notified_entity
            .as_deref()
            .or(default)
            .map(|entity| NotificationTarget::Entity(entity.to_string()))
            .or(self.call_agent.map(NotificationTarget::Address))
    }

    /// Match an event against the requested events
    ///
    /// A notification clears the requested events; detection resumes with the
    /// next RQNT.
    pub fn observe(&mut self, event: ObservedEvent) -> EventOutcome {
        let Some(request_id) = self.request_id.clone() else {
            return EventOutcome::Ignored;
        };
        let Some(requested) = self.requested.iter().find(|r| event_matches(r, &event)) else {
            return EventOutcome::Ignored;
        };

        if requested.wants_notification() {
            self.observed.push(event);
            let observed = std::mem::take(&mut self.observed);
            self.requested.clear();
            EventOutcome::Notify { request_id, observed }
        } else if requested.actions.contains(&EventAction::Accumulate) {
            self.observed.push(event);
            EventOutcome::Accumulated
        } else {
            EventOutcome::Ignored
        }
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            request_id: self.request_id.clone(),
            notified_entity: self.notified_entity.clone(),
            requested_events: self.requested.clone(),
            signals: self.signals.clone(),
            observed: self.observed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(events: &str) -> NotificationRequest {
        NotificationRequest {
            request_id: "0123".to_string(),
            notified_entity: None,
            events: RequestedEvent::parse_list(events).unwrap(),
            signals: Vec::new(),
        }
    }

    #[test]
    fn test_no_request_no_notification() {
        let mut state = NotificationState::default();
        let outcome = state.observe(ObservedEvent::new("AU/oc".parse().unwrap()));
        assert_eq!(outcome, EventOutcome::Ignored);
    }

    #[test]
    fn test_notify_flushes_accumulated_events() {
        let mut state = NotificationState::default();
        state.apply(request("D/5(A), AU/oc(N)"));
        assert_eq!(
            state.observe(ObservedEvent::new("d/5".parse().unwrap())),
            EventOutcome::Accumulated
        );
        match state.observe(ObservedEvent::with_parameters("AU/oc".parse().unwrap(), "rc=100")) {
            EventOutcome::Notify { request_id, observed } => {
                assert_eq!(request_id, "0123");
                assert_eq!(observed.len(), 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(state.snapshot().requested_events.is_empty());
        assert!(state.snapshot().observed.is_empty());
    }

    #[test]
    fn test_connection_scoped_matching() {
        let mut state = NotificationState::default();
        state.apply(request("R/rto@1A(N)"));
        let other = ObservedEvent::new("R/rto@2B".parse().unwrap());
        assert_eq!(state.observe(other), EventOutcome::Ignored);
        let ours = ObservedEvent::new("R/rto@1a".parse().unwrap());
        assert!(matches!(state.observe(ours), EventOutcome::Notify { .. }));
    }

    #[test]
    fn test_target_fallbacks() {
        let mut state = NotificationState::default();
        assert_eq!(state.target(None), None);

        let source: SocketAddr = "192.168.1.10:2727".parse().unwrap();
        state.remember_call_agent(source);
        assert_eq!(state.target(None), Some(NotificationTarget::Address(source)));
        assert_eq!(
            state.target(Some("ca@example.net")),
            Some(NotificationTarget::Entity("ca@example.net".to_string()))
        );

        let mut req = request("AU/oc(N)");
        req.notified_entity = Some("agent@10.0.0.1:2727".to_string());
        state.apply(req);
        assert_eq!(
            state.target(Some("ca@example.net")),
            Some(NotificationTarget::Entity("agent@10.0.0.1:2727".to_string()))
        );
    }
}

//! How an endpoint combines the media of its connections

use rvoip_mgcp_core::ConnectionMode;
use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionId, ConnectionKind};

/// Media flowing from one connection of an endpoint to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRoute {
    pub from: ConnectionId,
    pub to: ConnectionId,
}

/// What the topology needs to know about a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionView {
    pub id: ConnectionId,
    pub kind: ConnectionKind,
    pub mode: ConnectionMode,
}

/// Media combination strategy of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaTopology {
    /// Forwards only between network-facing and locally bridged connections
    Splitter,
    /// Every connection hears every other connection
    Mixer,
}

impl MediaTopology {
    /// Routes for the given connections
    ///
    /// Media received on a connection that can receive is delivered to every
    /// other eligible connection that can send. Loopback connections get
    /// their own media back.
    pub fn routes(&self, connections: &[ConnectionView]) -> Vec<MediaRoute> {
        let mut routes = Vec::new();
        for source in connections {
            if source.mode == ConnectionMode::Loopback {
                routes.push(MediaRoute {
                    from: source.id.clone(),
                    to: source.id.clone(),
                });
                continue;
            }
            if !source.mode.can_receive() {
                continue;
            }
            for sink in connections {
                if sink.id == source.id || !sink.mode.can_send() {
                    continue;
                }
                if *self == MediaTopology::Splitter && sink.kind == source.kind {
                    continue;
                }
                routes.push(MediaRoute {
                    from: source.id.clone(),
                    to: sink.id.clone(),
                });
            }
        }
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: &str, kind: ConnectionKind, mode: ConnectionMode) -> ConnectionView {
        ConnectionView {
            id: ConnectionId::new(id),
            kind,
            mode,
        }
    }

    #[test]
    fn test_splitter_only_crosses_sides() {
        let connections = vec![
            view("1", ConnectionKind::Remote, ConnectionMode::SendRecv),
            view("2", ConnectionKind::Remote, ConnectionMode::SendRecv),
            view("3", ConnectionKind::Local, ConnectionMode::SendRecv),
        ];
        let routes = MediaTopology::Splitter.routes(&connections);
        assert_eq!(routes.len(), 4);
        assert!(routes.iter().all(|r| r.from.as_str() == "3" || r.to.as_str() == "3"));
    }

    #[test]
    fn test_mixer_respects_direction() {
        let connections = vec![
            view("A", ConnectionKind::Remote, ConnectionMode::SendRecv),
            view("B", ConnectionKind::Remote, ConnectionMode::RecvOnly),
            view("C", ConnectionKind::Remote, ConnectionMode::Inactive),
        ];
        let routes = MediaTopology::Mixer.routes(&connections);
        assert_eq!(
            routes,
            vec![MediaRoute {
                from: ConnectionId::new("B"),
                to: ConnectionId::new("A"),
            }]
        );
    }

    #[test]
    fn test_loopback_returns_media() {
        let connections = vec![view("7", ConnectionKind::Remote, ConnectionMode::Loopback)];
        let routes = MediaTopology::Mixer.routes(&connections);
        assert_eq!(routes[0].from, routes[0].to);
    }
}

//! The event envelope: the unit of traffic between agents.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{AgentId, Error, Result};

/// Routing direction of a published envelope.
///
/// `Down` is observed by descendants only, `Up` by ancestors only, and
/// `Both` by both — but never by siblings. When a descendant re-emits a
/// `Both` envelope it is converted to `Down`-only on the downward leg to
/// avoid reflecting it back upward; symmetrically an ancestor converts it
/// to `Up`-only.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Observed by descendants only.
    Down,
    /// Observed by ancestors only.
    Up,
    /// Observed by both descendants and ancestors, never siblings.
    Both,
}

impl Direction {
    /// Returns the direction a descendant must use when re-emitting this
    /// envelope further down the hierarchy, applying the loop-safety
    /// conversion rule for `Both`.
    #[must_use]
    pub fn on_downward_reflection(self) -> Self {
        match self {
            Self::Both => Self::Down,
            other => other,
        }
    }

    /// Returns the direction an ancestor must use when re-emitting this
    /// envelope further up the hierarchy, applying the loop-safety
    /// conversion rule for `Both`.
    #[must_use]
    pub fn on_upward_reflection(self) -> Self {
        match self {
            Self::Both => Self::Up,
            other => other,
        }
    }
}

/// Ordered list of agent ids an envelope has already traversed.
///
/// Used both for self-loop prevention (an agent never handles an envelope
/// already bearing its own id, unless a matching handler declares
/// `allow_self = true`) and to recover the envelope's originator.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PublisherChain(Vec<AgentId>);

impl PublisherChain {
    /// Creates a chain starting at `origin`.
    #[must_use]
    pub fn starting_at(origin: AgentId) -> Self {
        Self(vec![origin])
    }

    /// Returns the originator, i.e. the first agent to publish this
    /// envelope, if any agent has published it yet.
    #[must_use]
    pub fn originator(&self) -> Option<AgentId> {
        self.0.first().copied()
    }

    /// Returns whether `id` already appears in the chain.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.0.contains(&id)
    }

    /// Returns a new chain with `id` appended, as happens when an agent
    /// forwards an envelope further along the hierarchy.
    #[must_use]
    pub fn appended(&self, id: AgentId) -> Self {
        let mut chain = self.0.clone();
        chain.push(id);
        Self(chain)
    }

    /// Returns the chain as a slice of agent ids, oldest first.
    #[must_use]
    pub fn as_slice(&self) -> &[AgentId] {
        &self.0
    }
}

/// The unit of traffic carried between agents.
///
/// `payload` is kept as an opaque [`serde_json::Value`] at this layer so the
/// envelope itself stays untyped; callers reconstruct a concrete payload
/// type via [`EventEnvelope::payload_as`]. The `event_type` tag drives
/// handler-registry lookup without requiring reflection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    id: String,
    event_type: String,
    payload: Value,
    publisher_chain: PublisherChain,
    direction: Direction,
    timestamp: SystemTime,
    correlation_id: Option<String>,
}

impl EventEnvelope {
    /// Builds a fresh envelope with a newly allocated id and a publisher
    /// chain starting at `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvelope`] if `event_type` is empty.
    pub fn new(
        origin: AgentId,
        event_type: impl Into<String>,
        payload: Value,
        direction: Direction,
    ) -> Result<Self> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(Error::InvalidEnvelope {
                reason: "event type tag cannot be empty".into(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            payload,
            publisher_chain: PublisherChain::starting_at(origin),
            direction,
            timestamp: SystemTime::now(),
            correlation_id: None,
        })
    }

    /// Attaches a caller-supplied correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns the envelope's unique id, used for deduplication.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the discriminating event type tag.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Returns the raw JSON payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deserializes the payload into a concrete type.
    ///
    /// # Errors
    ///
    /// Propagates any [`serde_json::Error`] from deserializing the stored
    /// payload into `T`.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }

    /// Returns the publisher chain.
    #[must_use]
    pub fn publisher_chain(&self) -> &PublisherChain {
        &self.publisher_chain
    }

    /// Returns the originator of this envelope, the first agent to
    /// publish it.
    #[must_use]
    pub fn originator(&self) -> Option<AgentId> {
        self.publisher_chain.originator()
    }

    /// Returns the routing direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the timestamp the envelope was constructed at.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns the optional correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns whether `id` already appears in the publisher chain, i.e.
    /// whether `id` has already handled or forwarded this envelope.
    #[must_use]
    pub fn already_traversed(&self, id: AgentId) -> bool {
        self.publisher_chain.contains(id)
    }

    /// Produces a copy of this envelope with `direction` replaced and the
    /// publisher chain left untouched, used when a subscription delivers
    /// an envelope onward without the receiving agent having forwarded it
    /// yet (e.g. the `Both` → `Down` flip on delivery to a child stream).
    #[must_use]
    pub fn with_direction(&self, direction: Direction) -> Self {
        Self {
            direction,
            ..self.clone()
        }
    }

    /// Produces a copy of this envelope with `id` appended to the
    /// publisher chain and `direction` replaced, as happens when an agent
    /// forwards the envelope further along the hierarchy.
    #[must_use]
    pub fn forwarded_by(&self, id: AgentId, direction: Direction) -> Self {
        Self {
            id: self.id.clone(),
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            publisher_chain: self.publisher_chain.appended(id),
            direction,
            timestamp: self.timestamp,
            correlation_id: self.correlation_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_envelope_starts_publisher_chain_at_origin() {
        let origin = AgentId::random();
        let envelope =
            EventEnvelope::new(origin, "ping", json!({"n": 1}), Direction::Down).unwrap();
        assert_eq!(envelope.originator(), Some(origin));
        assert!(envelope.already_traversed(origin));
        assert!(!envelope.correlation_id().is_some());
    }

    #[test]
    fn empty_event_type_is_rejected() {
        let origin = AgentId::random();
        let err = EventEnvelope::new(origin, "   ", json!(null), Direction::Up)
            .expect_err("blank event type should fail");
        assert!(matches!(err, Error::InvalidEnvelope { .. }));
    }

    #[test]
    fn forwarding_appends_to_chain_and_preserves_id() {
        let origin = AgentId::random();
        let child = AgentId::random();
        let envelope =
            EventEnvelope::new(origin, "ping", json!(null), Direction::Down).unwrap();
        let forwarded = envelope.forwarded_by(child, Direction::Down);

        assert_eq!(forwarded.id(), envelope.id());
        assert!(forwarded.already_traversed(origin));
        assert!(forwarded.already_traversed(child));
        assert_eq!(forwarded.originator(), Some(origin));
    }

    #[test]
    fn both_direction_converts_on_reflection() {
        assert_eq!(Direction::Both.on_downward_reflection(), Direction::Down);
        assert_eq!(Direction::Both.on_upward_reflection(), Direction::Up);
        assert_eq!(Direction::Down.on_downward_reflection(), Direction::Down);
        assert_eq!(Direction::Up.on_upward_reflection(), Direction::Up);
    }

    #[test]
    fn with_direction_leaves_chain_untouched() {
        let origin = AgentId::random();
        let envelope = EventEnvelope::new(origin, "ping", json!(null), Direction::Both).unwrap();
        let flipped = envelope.with_direction(Direction::Down);

        assert_eq!(flipped.direction(), Direction::Down);
        assert_eq!(flipped.id(), envelope.id());
        assert_eq!(flipped.publisher_chain().as_slice(), envelope.publisher_chain().as_slice());
    }

    #[test]
    fn payload_round_trips_through_json() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Increment {
            amount: i64,
        }

        let origin = AgentId::random();
        let envelope = EventEnvelope::new(
            origin,
            "increment",
            serde_json::to_value(Increment { amount: 5 }).unwrap(),
            Direction::Down,
        )
        .unwrap();

        let decoded: Increment = envelope.payload_as().unwrap();
        assert_eq!(decoded, Increment { amount: 5 });
    }
}

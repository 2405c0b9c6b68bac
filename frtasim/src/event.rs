//! Event types and priority queue for discrete event simulation.

use std::cmp::Ordering;
use std::net::Ipv4Addr;

use frta::{TimerEvent, Timestamp};

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Partition the network into isolated groups.
    Partition { groups: Vec<Vec<Ipv4Addr>> },
    /// Heal all partitions (restore full connectivity).
    HealPartition,
    /// Disable a specific link.
    DisableLink { a: Ipv4Addr, b: Ipv4Addr },
    /// Enable a specific link.
    EnableLink { a: Ipv4Addr, b: Ipv4Addr },
    /// Set loss rate on a link.
    SetLossRate { a: Ipv4Addr, b: Ipv4Addr, rate: f64 },
    /// Take a route-cache snapshot for metrics.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// Deliver a control datagram to a node.
    ControlDelivery {
        to: Ipv4Addr,
        data: Vec<u8>,
        from: Ipv4Addr,
    },
    /// Fire a protocol timer at a node.
    Timer { node: Ipv4Addr, event: TimerEvent },
    /// Application at `from` emits a datagram toward `dest`.
    AppSend { from: Ipv4Addr, dest: Ipv4Addr },
    /// An application datagram arrives at `to`, still headed for `dest`.
    AppDelivery {
        to: Ipv4Addr,
        dest: Ipv4Addr,
        from: Ipv4Addr,
        hops: u32,
    },
    /// Execute a scenario action.
    Action(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic FIFO ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: SimEvent,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: SimEvent) -> Self {
        Self { time, seq, event }
    }
}

// Ordering is by (time, seq) only; the payload does not participate.
// Reversed because BinaryHeap is a max-heap and we need the earliest event.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer_event(node_last: u8) -> SimEvent {
        SimEvent::Timer {
            node: Ipv4Addr::new(10, 1, 1, node_last),
            event: TimerEvent::CacheSweep,
        }
    }

    #[test]
    fn test_event_ordering() {
        let e1 = ScheduledEvent::new(
            Timestamp::from_secs(10),
            SequenceNumber::new(1),
            timer_event(1),
        );
        let e2 = ScheduledEvent::new(
            Timestamp::from_secs(5),
            SequenceNumber::new(2),
            timer_event(1),
        );

        // e2 has earlier time, so it should be "greater" in min-heap terms.
        assert!(e2 > e1);
    }

    #[test]
    fn test_same_time_sequence_ordering() {
        let e1 = ScheduledEvent::new(
            Timestamp::from_secs(10),
            SequenceNumber::new(1),
            timer_event(1),
        );
        let e2 = ScheduledEvent::new(
            Timestamp::from_secs(10),
            SequenceNumber::new(2),
            timer_event(2),
        );

        // Same time: lower sequence is processed first (FIFO).
        assert!(e1 > e2);
    }

    #[test]
    fn test_heap_pops_in_time_order() {
        let mut heap = std::collections::BinaryHeap::new();
        heap.push(ScheduledEvent::new(
            Timestamp::from_secs(3),
            SequenceNumber::new(0),
            timer_event(1),
        ));
        heap.push(ScheduledEvent::new(
            Timestamp::from_secs(1),
            SequenceNumber::new(1),
            timer_event(2),
        ));
        heap.push(ScheduledEvent::new(
            Timestamp::from_secs(2),
            SequenceNumber::new(2),
            timer_event(3),
        ));

        let times: Vec<u64> = std::iter::from_fn(|| heap.pop())
            .map(|e| e.time.as_secs())
            .collect();
        assert_eq!(times, vec![1, 2, 3]);
    }
}

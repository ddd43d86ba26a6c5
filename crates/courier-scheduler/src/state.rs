//! Shared scheduler state: pending set, in-flight ids and the channel table.
//!
//! Every mutation (enqueue, claim, cancel, directory refresh, requeue) goes
//! through one `tokio::sync::Mutex`, so a job can never be claimed twice and
//! refreshes never lose scheduler-owned counters.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use courier_core::types::{ChannelCredential, DirectoryEntry, Job, JobState, MessageId};
use tokio::sync::Mutex;

pub type SharedState = Arc<Mutex<SchedulerState>>;

/// One sending identity as the scheduler sees it.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub credential: String,
    /// Refreshed on every directory poll.
    pub connected: bool,
    /// Sends since the last cooldown.
    pub sent_since_reset: u32,
    /// A job is claimed or being sent on this channel.
    pub busy: bool,
    /// The worker found nothing to claim and is parked.
    pub waiting: bool,
    /// A worker task currently owns this channel.
    pub worker_active: bool,
}

impl Channel {
    fn new(name: &str, credential: &str) -> Self {
        Self {
            name: name.to_string(),
            credential: credential.to_string(),
            connected: true,
            sent_since_reset: 0,
            busy: false,
            waiting: false,
            worker_active: false,
        }
    }

    fn is_available(&self) -> bool {
        self.connected && !self.busy
    }

    fn rank(&self) -> (u32, &str) {
        (self.sent_since_reset, self.name.as_str())
    }
}

/// Queue polling bookkeeping, written only by the synchronizer.
#[derive(Debug, Clone)]
pub struct PollState {
    pub current_interval: Duration,
    /// Ids the Queue Source listed on its last successful fetch.
    pub remote_valid_ids: HashSet<MessageId>,
}

/// A job handed to a channel, together with the credential to send it with.
#[derive(Debug, Clone)]
pub struct Claim {
    pub job: Job,
    pub channel: ChannelCredential,
}

/// Where an id that is not in the pending set currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InFlight {
    /// Claimed by or sending on the named channel.
    Channel(String),
    /// Waiting out a retry backoff.
    Backoff,
}

#[derive(Debug)]
pub struct SchedulerState {
    pending: VecDeque<Job>,
    pending_ids: HashSet<MessageId>,
    in_flight: HashMap<MessageId, InFlight>,
    /// Ids that failed for good in this process. Never enqueued again;
    /// delivered ids are kept out by the ledger instead.
    settled: HashSet<MessageId>,
    channels: BTreeMap<String, Channel>,
    pub poll: PollState,
}

impl SchedulerState {
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            pending_ids: HashSet::new(),
            in_flight: HashMap::new(),
            settled: HashSet::new(),
            channels: BTreeMap::new(),
            poll: PollState {
                current_interval: initial_interval,
                remote_valid_ids: HashSet::new(),
            },
        }
    }

    pub fn shared(initial_interval: Duration) -> SharedState {
        Arc::new(Mutex::new(Self::new(initial_interval)))
    }

    // ─── Pending set ──────────────────────────────────────────

    /// Whether the id is pending, claimed, sending, in backoff or settled.
    pub fn is_known(&self, id: MessageId) -> bool {
        self.pending_ids.contains(&id)
            || self.in_flight.contains_key(&id)
            || self.settled.contains(&id)
    }

    /// Add a new job. Returns false if the id is already tracked.
    pub fn enqueue(&mut self, job: Job) -> bool {
        if self.is_known(job.id) {
            return false;
        }
        self.pending_ids.insert(job.id);
        self.pending.push_back(job);
        true
    }

    /// Drop pending jobs the source no longer lists. In-flight jobs are left
    /// alone and finish normally.
    pub fn cancel_missing(&mut self, listed: &HashSet<MessageId>) -> Vec<MessageId> {
        let mut canceled = Vec::new();
        self.pending.retain(|job| {
            if listed.contains(&job.id) {
                true
            } else {
                canceled.push(job.id);
                false
            }
        });
        for id in &canceled {
            self.pending_ids.remove(id);
        }
        canceled
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_ids(&self) -> Vec<MessageId> {
        self.pending.iter().map(|j| j.id).collect()
    }

    // ─── Claiming ─────────────────────────────────────────────

    /// Claim the oldest pending job for `channel_name`.
    ///
    /// A channel defers to another parked, available channel that has sent
    /// fewer messages (ties broken by name), which spreads load toward the
    /// least-used channel. Returns `None` when nothing is claimable; the
    /// channel is then marked as waiting.
    pub fn claim(&mut self, channel_name: &str) -> Option<Claim> {
        let rank = match self.channels.get(channel_name) {
            Some(ch) if ch.is_available() => (ch.sent_since_reset, ch.name.clone()),
            _ => return None,
        };

        let outranked = self.channels.values().any(|other| {
            other.name != channel_name
                && other.is_available()
                && other.waiting
                && other.worker_active
                && other.rank() < (rank.0, rank.1.as_str())
        });

        let job = if outranked { None } else { self.pending.pop_front() };

        let ch = self.channels.get_mut(channel_name)?;
        let Some(mut job) = job else {
            ch.waiting = true;
            return None;
        };

        self.pending_ids.remove(&job.id);
        job.advance(JobState::Claimed);
        ch.busy = true;
        ch.waiting = false;
        self.in_flight
            .insert(job.id, InFlight::Channel(channel_name.to_string()));

        Some(Claim {
            job,
            channel: ChannelCredential {
                name: ch.name.clone(),
                credential: ch.credential.clone(),
            },
        })
    }

    /// Which channel currently holds `id`, if any.
    pub fn holder_of(&self, id: MessageId) -> Option<&str> {
        match self.in_flight.get(&id) {
            Some(InFlight::Channel(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// A job reached a terminal state or was dropped after claim.
    pub fn finish(&mut self, id: MessageId, outcome: JobState) {
        self.in_flight.remove(&id);
        if matches!(outcome, JobState::FailedPermanent | JobState::FailedExhausted) {
            self.settled.insert(id);
        }
    }

    /// The job left its channel and is waiting out a retry backoff.
    pub fn mark_backoff(&mut self, id: MessageId) {
        self.in_flight.insert(id, InFlight::Backoff);
    }

    /// Put a job back after its backoff. Jobs the source stopped listing in
    /// the meantime are dropped as canceled; returns whether it was requeued.
    pub fn requeue(&mut self, mut job: Job) -> bool {
        self.in_flight.remove(&job.id);
        if !self.poll.remote_valid_ids.contains(&job.id) {
            return false;
        }
        if self.pending_ids.contains(&job.id) {
            return false;
        }
        job.advance(JobState::Pending);
        self.pending_ids.insert(job.id);
        self.pending.push_back(job);
        true
    }

    // ─── Channel table ────────────────────────────────────────

    /// Replace the connected set with the directory's open entries.
    ///
    /// Counters and busy flags survive. Channels missing from `entries` are
    /// marked disconnected. Returns the channels that need a new worker.
    pub fn apply_directory(&mut self, entries: &[DirectoryEntry], open_status: &str) -> Vec<String> {
        for ch in self.channels.values_mut() {
            ch.connected = false;
        }

        let mut spawn = Vec::new();
        for entry in entries.iter().filter(|e| e.connection_status == open_status) {
            let ch = self
                .channels
                .entry(entry.name.clone())
                .or_insert_with(|| Channel::new(&entry.name, &entry.credential));
            ch.credential = entry.credential.clone();
            ch.connected = true;
            if !ch.worker_active {
                ch.worker_active = true;
                spawn.push(ch.name.clone());
            }
        }
        spawn
    }

    /// Directory unavailable: nothing may be claimed this cycle.
    pub fn disconnect_all(&mut self) {
        for ch in self.channels.values_mut() {
            ch.connected = false;
        }
    }

    /// Called by a worker before each claim. When the channel is gone and
    /// idle, the worker gives up ownership and should exit.
    pub fn retire_if_disconnected(&mut self, channel_name: &str) -> bool {
        match self.channels.get_mut(channel_name) {
            Some(ch) if ch.connected => false,
            Some(ch) => {
                if ch.busy {
                    return false;
                }
                ch.worker_active = false;
                ch.waiting = false;
                true
            }
            None => true,
        }
    }

    pub fn record_success(&mut self, channel_name: &str) {
        if let Some(ch) = self.channels.get_mut(channel_name) {
            ch.sent_since_reset += 1;
        }
    }

    pub fn reset_counter(&mut self, channel_name: &str) {
        if let Some(ch) = self.channels.get_mut(channel_name) {
            ch.sent_since_reset = 0;
        }
    }

    /// The channel finished its current job (including pacing).
    pub fn release(&mut self, channel_name: &str) {
        if let Some(ch) = self.channels.get_mut(channel_name) {
            ch.busy = false;
        }
    }

    /// Clean up after a crashed worker: free the channel and forget the ids it
    /// held so the next sync can observe them again.
    pub fn recover_channel(&mut self, channel_name: &str) -> Vec<MessageId> {
        if let Some(ch) = self.channels.get_mut(channel_name) {
            ch.busy = false;
            ch.waiting = false;
            ch.worker_active = false;
        }
        let held: Vec<MessageId> = self
            .in_flight
            .iter()
            .filter(|(_, holder)| matches!(holder, InFlight::Channel(n) if n == channel_name))
            .map(|(id, _)| *id)
            .collect();
        for id in &held {
            self.in_flight.remove(id);
        }
        held
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn connected_names(&self) -> Vec<String> {
        self.channels
            .values()
            .filter(|c| c.connected)
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, status: &str) -> DirectoryEntry {
        DirectoryEntry {
            name: name.into(),
            credential: format!("{name}-token"),
            connection_status: status.into(),
        }
    }

    fn state_with(channels: &[&str]) -> SchedulerState {
        let mut st = SchedulerState::new(Duration::from_secs(3));
        let entries: Vec<_> = channels.iter().map(|n| entry(n, "open")).collect();
        st.apply_directory(&entries, "open");
        st
    }

    #[test]
    fn test_enqueue_rejects_duplicates() {
        let mut st = state_with(&[]);
        assert!(st.enqueue(Job::new(1, "555", "hi")));
        assert!(!st.enqueue(Job::new(1, "555", "hi again")));
        assert_eq!(st.pending_len(), 1);
    }

    #[test]
    fn test_settled_ids_are_not_enqueued_again() {
        let mut st = state_with(&["a"]);
        st.enqueue(Job::new(1, "555", "hi"));
        st.enqueue(Job::new(2, "555", "hi"));
        st.claim("a").unwrap();
        st.finish(1, JobState::FailedExhausted);
        st.release("a");
        st.claim("a").unwrap();
        st.finish(2, JobState::FailedPermanent);
        assert_eq!(st.in_flight_len(), 0);
        assert!(!st.enqueue(Job::new(1, "555", "hi")));
        assert!(!st.enqueue(Job::new(2, "555", "hi")));
    }

    #[test]
    fn test_sent_ids_are_left_to_the_ledger() {
        let mut st = state_with(&["a"]);
        st.enqueue(Job::new(1, "555", "hi"));
        st.claim("a").unwrap();
        st.finish(1, JobState::Sent);
        assert_eq!(st.in_flight_len(), 0);
        assert!(!st.is_known(1));
    }

    #[test]
    fn test_claim_marks_busy_and_tracks_holder() {
        let mut st = state_with(&["a"]);
        st.enqueue(Job::new(1, "555", "hi"));
        let claim = st.claim("a").unwrap();
        assert_eq!(claim.job.state, JobState::Claimed);
        assert_eq!(claim.channel.credential, "a-token");
        assert!(st.channel("a").unwrap().busy);
        assert_eq!(st.holder_of(1), Some("a"));
        assert!(st.is_known(1));
        // busy channel cannot claim again
        st.enqueue(Job::new(2, "555", "second"));
        assert!(st.claim("a").is_none());
    }

    #[test]
    fn test_at_most_one_claim_per_job() {
        let mut st = state_with(&["a", "b"]);
        st.enqueue(Job::new(1, "555", "hi"));
        let first = st.claim("a");
        let second = st.claim("b");
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn test_claim_defers_to_less_used_waiting_channel() {
        let mut st = state_with(&["a", "b"]);
        // a has sent more than b, and b is parked waiting for work
        st.record_success("a");
        assert!(st.claim("b").is_none());
        assert!(st.channel("b").unwrap().waiting);

        st.enqueue(Job::new(1, "555", "hi"));
        assert!(st.claim("a").is_none());
        let claim = st.claim("b").unwrap();
        assert_eq!(claim.job.id, 1);
    }

    #[test]
    fn test_cancel_missing_only_touches_pending() {
        let mut st = state_with(&["a"]);
        st.enqueue(Job::new(1, "555", "claimed"));
        st.enqueue(Job::new(2, "555", "pending"));
        st.enqueue(Job::new(3, "555", "kept"));
        let _claim = st.claim("a").unwrap();

        let listed: HashSet<MessageId> = [3].into_iter().collect();
        let canceled = st.cancel_missing(&listed);
        assert_eq!(canceled, vec![2]);
        assert_eq!(st.pending_ids(), vec![3]);
        assert_eq!(st.holder_of(1), Some("a"));
    }

    #[test]
    fn test_requeue_drops_jobs_no_longer_listed() {
        let mut st = state_with(&["a"]);
        st.poll.remote_valid_ids = [1].into_iter().collect();
        st.enqueue(Job::new(1, "555", "hi"));
        let claim = st.claim("a").unwrap();
        st.mark_backoff(1);

        let mut job = claim.job;
        job.advance(JobState::Sending);
        job.advance(JobState::FailedRetryable);

        st.poll.remote_valid_ids.clear();
        assert!(!st.requeue(job.clone()));
        assert!(!st.is_known(1));

        st.poll.remote_valid_ids.insert(1);
        assert!(st.requeue(job));
        assert_eq!(st.pending_ids(), vec![1]);
    }

    #[test]
    fn test_directory_refresh_preserves_counters() {
        let mut st = state_with(&["a"]);
        st.record_success("a");
        st.record_success("a");
        let spawn = st.apply_directory(&[entry("a", "open"), entry("b", "open")], "open");
        assert_eq!(spawn, vec!["b".to_string()]);
        assert_eq!(st.channel("a").unwrap().sent_since_reset, 2);

        st.apply_directory(&[entry("b", "open"), entry("a", "close")], "open");
        assert!(!st.channel("a").unwrap().connected);
        assert_eq!(st.channel("a").unwrap().sent_since_reset, 2);
        assert_eq!(st.connected_names(), vec!["b".to_string()]);
    }

    #[test]
    fn test_disconnected_busy_channel_keeps_worker() {
        let mut st = state_with(&["a"]);
        st.enqueue(Job::new(1, "555", "hi"));
        let _claim = st.claim("a").unwrap();
        st.disconnect_all();
        assert!(!st.retire_if_disconnected("a"));
        st.finish(1, JobState::Sent);
        st.release("a");
        assert!(st.retire_if_disconnected("a"));
        assert!(!st.channel("a").unwrap().worker_active);

        // reconnect spawns a fresh worker
        let spawn = st.apply_directory(&[entry("a", "open")], "open");
        assert_eq!(spawn, vec!["a".to_string()]);
    }

    #[test]
    fn test_recover_channel_forgets_held_ids() {
        let mut st = state_with(&["a"]);
        st.enqueue(Job::new(9, "555", "hi"));
        let _claim = st.claim("a").unwrap();
        let dropped = st.recover_channel("a");
        assert_eq!(dropped, vec![9]);
        assert!(!st.is_known(9));
        assert!(!st.channel("a").unwrap().busy);
    }
}

//! Ackable-set selection.
//!
//! A new message acknowledges the freshest messages of every other peer it
//! knows about, giving a bounded frontier of "things I had seen" instead of
//! full causal history.

use shared_types::{ChannelId, Round, Signature, StoredMessage};

/// What the message being committed looks like, for filtering candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckFilter {
    /// Round of the `Input` being committed. Inputs of the same round are
    /// never acknowledged.
    pub round: Option<Round>,
    /// Only candidates from this channel qualify.
    pub channel: Option<ChannelId>,
}

impl AckFilter {
    pub fn accepts(&self, candidate: &StoredMessage) -> bool {
        let message = &candidate.message;
        if let (Some(round), Some(candidate_round)) = (self.round, message.input_round()) {
            if round == candidate_round {
                return false;
            }
        }
        match &self.channel {
            Some(channel) => message.channel() == *channel,
            None => true,
        }
    }
}

/// Pick acks from each peer's recent messages (highest height first),
/// keeping at most `per_peer` of them.
pub fn select_ackable<'a, I>(recent_by_peer: I, filter: &AckFilter, per_peer: usize) -> Vec<Signature>
where
    I: IntoIterator<Item = &'a [StoredMessage]>,
{
    recent_by_peer
        .into_iter()
        .flat_map(|recent| {
            recent
                .iter()
                .take(per_peer)
                .filter(|candidate| filter.accepts(candidate))
                .map(|candidate| candidate.message.sig)
        })
        .collect()
}
